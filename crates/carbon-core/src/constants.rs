//! Shared constants for the carbon computation engine
//!
//! Coefficient sources: Cloud Carbon Footprint methodology for the
//! power ratios, the Tannu/Nair HotCarbon'22 paper for storage embodied
//! coefficients, and Our World in Data (2024) for grid carbon
//! intensities.

/// Teads curve control points: CPU utilization in percent on the x axis,
/// TDP ratio on the y axis.
pub const TEADS_CURVE_X: &[f64] = &[0.0, 10.0, 50.0, 100.0];
pub const TEADS_CURVE_Y: &[f64] = &[0.12, 0.32, 0.75, 1.02];

/// Azure per-core electricity draw bounds in watts (CCF).
pub const CPU_MIN_WATTS_PER_CORE_AZURE: f64 = 0.78;
pub const CPU_MAX_WATTS_PER_CORE_AZURE: f64 = 3.76;

/// Average watts per requested core, used as the thermal-design-power
/// stand-in for pods where no physical processor is known.
pub const CPU_AVG_WATTS_PER_CORE_AZURE: f64 =
    (CPU_MIN_WATTS_PER_CORE_AZURE + CPU_MAX_WATTS_PER_CORE_AZURE) / 2.0;

/// Memory power draw in kW per GB requested (CCF).
pub const MEMORY_KW_PER_GB: f64 = 0.000392;

/// Network transfer energy in kWh per GB.
pub const NETWORK_KWH_PER_GB: f64 = 0.001;

/// Amortized manufacturing emissions for a server, in gCO2e.
pub const DEVICE_LIFETIME_EMISSIONS_G: f64 = 1_672_000.0;

/// Expected device lifespan in seconds (~4 years).
pub const DEVICE_LIFESPAN_SECONDS: f64 = 126_230_400.0;

/// Total cores assumed on the underlying node when attributing embodied
/// emissions to a pod's reserved cores.
pub const POD_HOST_TOTAL_CORES: f64 = 66.0;

/// European average grid intensity for 2024, the fallback for
/// unrecognized regions, in gCO2 per kWh.
pub const CARBON_INTENSITY_EUROPE: f64 = 281.0;

/// Facility overhead multipliers per cloud provider.
pub const PUE_AZURE: f64 = 1.185;
pub const PUE_AWS: f64 = 1.135;
pub const PUE_GCP: f64 = 1.1;

/// Chunk sizes per profile, tuned to evaluator invocation overhead.
pub const VM_CHUNK_SIZE: usize = 430;
pub const STORAGE_CHUNK_SIZE: usize = 10_000;

/// Bounded worker pool size for chunk-level parallelism.
pub const MAX_CHUNK_WORKERS: usize = 5;

//! Node catalog for the carbon model graph

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEVICE_LIFESPAN_SECONDS, DEVICE_LIFETIME_EMISSIONS_G, MEMORY_KW_PER_GB, NETWORK_KWH_PER_GB,
    TEADS_CURVE_X, TEADS_CURVE_Y,
};

/// The closed set of computation units. Profiles select a static subset
/// and evaluate it in roster order; when two nodes emit the same output
/// key the later one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// CPU utilization percent to TDP ratio, piecewise linear.
    TeadsCurve,
    /// TDP ratio times thermal design power, in kW.
    PCpu,
    /// Like `PCpu` but scaled by reserved cores, for pods where the TDP
    /// input is an average watts-per-core figure.
    PCores,
    PMem,
    PStorage,
    PVmStorage,
    ECpu,
    EMem,
    ENet,
    EStorage,
    EVmStorage,
    /// Sum of component energies.
    SciE,
    /// Facility overhead multiplier.
    SciEPue,
    /// Operational carbon from energy and grid intensity.
    SciO,
    /// Embodied carbon attributed to reserved cores over the duration.
    SciMCpu,
    /// Compute embodied plus storage embodied.
    SciM,
    /// Total carbon: operational plus embodied.
    Sci,
    MStorage,
    MVmStorage,
    /// Instance-type hardware lookup.
    CloudMetadata,
}

/// How a node's output is derived from its inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Formula {
    /// Piecewise-linear interpolation of the single input over fixed
    /// control points.
    Interpolate {
        xs: &'static [f64],
        ys: &'static [f64],
    },
    /// Product of all inputs, scaled.
    Product { scale: f64 },
    /// Single input times a fixed coefficient.
    Coefficient { factor: f64 },
    /// Sum of inputs; a missing term reads as zero.
    Sum,
    /// (data-in + data-out) times the per-GB transfer energy.
    NetworkEnergy { kwh_per_gb: f64 },
    /// Lifetime emissions amortized over the device lifespan and scaled
    /// by the reserved share of cores.
    EmbodiedShare {
        lifetime_g: f64,
        lifespan_seconds: f64,
    },
    /// Instance-type table lookup emitting several outputs at once.
    InstanceLookup,
}

/// Declarative description of one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec {
    pub key: &'static str,
    pub inputs: &'static [&'static str],
    pub output: &'static str,
    pub formula: Formula,
}

impl NodeKind {
    pub const fn spec(self) -> NodeSpec {
        match self {
            NodeKind::TeadsCurve => NodeSpec {
                key: "teads-curve",
                inputs: &["cpu/utilization"],
                output: "tdp-ratio",
                formula: Formula::Interpolate {
                    xs: TEADS_CURVE_X,
                    ys: TEADS_CURVE_Y,
                },
            },
            NodeKind::PCpu => NodeSpec {
                key: "p-cpu",
                inputs: &["tdp-ratio", "cpu/thermal-design-power"],
                output: "cpu/power",
                formula: Formula::Product { scale: 1.0 / 1000.0 },
            },
            NodeKind::PCores => NodeSpec {
                key: "p-cores",
                inputs: &["tdp-ratio", "cpu/thermal-design-power", "resources-reserved"],
                output: "cpu/power",
                formula: Formula::Product { scale: 1.0 / 1000.0 },
            },
            NodeKind::PMem => NodeSpec {
                key: "p-mem",
                inputs: &["memory/requested"],
                output: "memory/power",
                formula: Formula::Coefficient {
                    factor: MEMORY_KW_PER_GB,
                },
            },
            NodeKind::PStorage => NodeSpec {
                key: "p-storage",
                inputs: &["storage/requested", "power/coefficient"],
                output: "storage/power",
                formula: Formula::Product { scale: 1.0 },
            },
            NodeKind::PVmStorage => NodeSpec {
                key: "p-vm-storage",
                inputs: &["storage/requested"],
                output: "storage/power",
                // VM billing rows carry no disk technology, use the
                // average of the SSD and HDD coefficients.
                formula: Formula::Coefficient { factor: 9.25e-7 },
            },
            NodeKind::ECpu => NodeSpec {
                key: "e-cpu",
                inputs: &["cpu/power", "duration"],
                output: "cpu/energy",
                formula: Formula::Product { scale: 1.0 / 3600.0 },
            },
            NodeKind::EMem => NodeSpec {
                key: "e-mem",
                inputs: &["memory/power", "duration"],
                output: "memory/energy",
                formula: Formula::Product { scale: 1.0 / 3600.0 },
            },
            NodeKind::ENet => NodeSpec {
                key: "e-net",
                inputs: &["network/data-in", "network/data-out"],
                output: "network/energy",
                formula: Formula::NetworkEnergy {
                    kwh_per_gb: NETWORK_KWH_PER_GB,
                },
            },
            NodeKind::EStorage => NodeSpec {
                key: "e-storage",
                inputs: &["storage/power", "duration/seconds"],
                output: "energy",
                formula: Formula::Product { scale: 1.0 / 3600.0 },
            },
            NodeKind::EVmStorage => NodeSpec {
                key: "e-vm-storage",
                inputs: &["storage/power", "duration"],
                output: "storage/energy",
                formula: Formula::Product { scale: 1.0 / 3600.0 },
            },
            NodeKind::SciE => NodeSpec {
                key: "sci-e",
                inputs: &["cpu/energy", "memory/energy", "storage/energy"],
                output: "energy",
                formula: Formula::Sum,
            },
            NodeKind::SciEPue => NodeSpec {
                key: "sci-e-pue",
                inputs: &["energy", "pue"],
                output: "energy",
                formula: Formula::Product { scale: 1.0 },
            },
            NodeKind::SciO => NodeSpec {
                key: "sci-o",
                inputs: &["energy", "grid/carbon-intensity"],
                output: "carbon-operational",
                formula: Formula::Product { scale: 1.0 },
            },
            NodeKind::SciMCpu => NodeSpec {
                key: "sci-m-cpu",
                inputs: &["duration", "resources-reserved", "resources-total"],
                output: "carbon-embodied",
                formula: Formula::EmbodiedShare {
                    lifetime_g: DEVICE_LIFETIME_EMISSIONS_G,
                    lifespan_seconds: DEVICE_LIFESPAN_SECONDS,
                },
            },
            NodeKind::SciM => NodeSpec {
                key: "sci-m",
                inputs: &["carbon-embodied", "storage-embodied"],
                output: "carbon-embodied",
                formula: Formula::Sum,
            },
            NodeKind::Sci => NodeSpec {
                key: "sci",
                inputs: &["carbon-operational", "carbon-embodied"],
                output: "carbon",
                formula: Formula::Sum,
            },
            NodeKind::MStorage => NodeSpec {
                key: "m-storage",
                inputs: &[
                    "storage/requested",
                    "storage/embodied-coefficient",
                    "duration/seconds",
                ],
                output: "carbon-embodied",
                formula: Formula::Product {
                    scale: 1.0 / DEVICE_LIFESPAN_SECONDS,
                },
            },
            NodeKind::MVmStorage => NodeSpec {
                key: "m-vm-storage",
                inputs: &["storage/requested", "storage/embodied-coefficient", "duration"],
                output: "storage-embodied",
                formula: Formula::Product {
                    scale: 1.0 / DEVICE_LIFESPAN_SECONDS,
                },
            },
            NodeKind::CloudMetadata => NodeSpec {
                key: "cloud-metadata",
                inputs: &["cloud/instance-type"],
                output: "cpu/thermal-design-power",
                formula: Formula::InstanceLookup,
            },
        }
    }

    pub const fn key(self) -> &'static str {
        self.spec().key
    }
}

/// Linear interpolation over sorted control points; values outside the
/// range clamp to the edge ordinates, matching numpy's `interp`.
pub fn piecewise_linear(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return 0.0;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let upper = xs.partition_point(|&cx| cx < x);
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

//! Typed resource records for carbon calculations
//!
//! Every resource owns per-time-point observation arrays plus scalar
//! totals. A populated array always has the same length as
//! `time_points`; an array of length zero means "not yet computed".
//! Resources are built once from telemetry or billing data, mutated in
//! place by the pipeline, then serialized; no mutation afterwards.

use serde::{Deserialize, Serialize};

/// Fields shared by every resource type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub energy_consumed: Vec<f64>,
    #[serde(default)]
    pub carbon_operational: Vec<f64>,
    #[serde(default)]
    pub carbon_embodied: Vec<f64>,
    #[serde(default)]
    pub carbon_emitted: Vec<f64>,
    /// Opaque time labels: grid timestamps for pods and applications,
    /// billing row timestamps for VMs and storage.
    #[serde(default)]
    pub time_points: Vec<String>,
    #[serde(default)]
    pub total_energy_consumed: f64,
    #[serde(default)]
    pub total_carbon_operational: f64,
    #[serde(default)]
    pub total_carbon_embodied: f64,
    #[serde(default)]
    pub total_carbon_emitted: f64,
}

impl Resource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Compute-specific observation arrays and scalars shared by pods,
/// applications and virtual machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeMetrics {
    #[serde(default)]
    pub cpu_energy: Vec<f64>,
    #[serde(default)]
    pub memory_energy: Vec<f64>,
    #[serde(default)]
    pub cpu_power: Vec<f64>,
    /// Requested cores for pods, vCPU count for VMs.
    #[serde(default)]
    pub requested_cpu: Vec<f64>,
    /// Utilization as a fraction 0-1, not percent.
    #[serde(default)]
    pub cpu_util: Vec<f64>,
    #[serde(default)]
    pub storage_capacity: Vec<f64>,
    #[serde(default)]
    pub network_io: Vec<f64>,
    /// Requested memory in bytes.
    #[serde(default)]
    pub requested_memory: Vec<f64>,
    #[serde(default)]
    pub total_cpu_energy: f64,
    #[serde(default)]
    pub total_memory_energy: f64,
    /// Grid intensity in gCO2/kWh, constant across time for a resource.
    #[serde(default)]
    pub carbon_intensity: f64,
    #[serde(default = "default_pue")]
    pub pue: f64,
}

fn default_pue() -> f64 {
    1.0
}

impl Default for ComputeMetrics {
    fn default() -> Self {
        Self {
            cpu_energy: Vec::new(),
            memory_energy: Vec::new(),
            cpu_power: Vec::new(),
            requested_cpu: Vec::new(),
            cpu_util: Vec::new(),
            storage_capacity: Vec::new(),
            network_io: Vec::new(),
            requested_memory: Vec::new(),
            total_cpu_energy: 0.0,
            total_memory_energy: 0.0,
            carbon_intensity: 0.0,
            pue: default_pue(),
        }
    }
}

/// Storage observation arrays shared by virtual machines and storage
/// resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageMetrics {
    #[serde(default)]
    pub storage_energy: Vec<f64>,
    #[serde(default)]
    pub total_storage_energy: f64,
    #[serde(default)]
    pub storage_embodied: Vec<f64>,
    #[serde(default)]
    pub total_storage_embodied: f64,
}

/// A Kubernetes pod observed over the sampling grid. Belongs to exactly
/// one app, one paas (cluster) and one namespace; the triple is its
/// grouping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    #[serde(flatten)]
    pub base: Resource,
    #[serde(flatten)]
    pub compute: ComputeMetrics,
    pub app: String,
    pub paas: String,
    pub namespace: String,
}

/// A group of pods sharing an `app` (or, for cluster grouping, a
/// `paas`) key, with elementwise-aggregated hardware series. Always
/// owns at least one pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    #[serde(flatten)]
    pub base: Resource,
    #[serde(flatten)]
    pub compute: ComputeMetrics,
    pub pods: Vec<Pod>,
}

/// A billed virtual machine observed across one or more billing rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    #[serde(flatten)]
    pub base: Resource,
    #[serde(flatten)]
    pub compute: ComputeMetrics,
    #[serde(flatten)]
    pub storage: StorageMetrics,
    /// Cloud instance type, e.g. "Standard_D4s_v3"; drives the hardware
    /// catalog lookup.
    #[serde(default)]
    pub vm_size: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    /// Disk size in GB per time point.
    #[serde(default)]
    pub storage_size: Vec<f64>,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self {
            base: Resource::default(),
            compute: ComputeMetrics::default(),
            storage: StorageMetrics::default(),
            vm_size: None,
            region: None,
            instance: None,
            environment: None,
            partition: None,
            service: None,
            component: None,
            subscription: None,
            storage_size: Vec::new(),
        }
    }
}

/// Disk technology behind a billed storage line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "HDD")]
    Hdd,
    Unknown,
}

impl StorageType {
    /// Power draw in kW per GB stored (CCF storage methodology).
    pub fn power_coefficient(self) -> f64 {
        match self {
            StorageType::Ssd => 1.2e-6,
            StorageType::Hdd => 6.5e-7,
            StorageType::Unknown => 9.25e-7,
        }
    }

    /// Manufacturing emissions in gCO2e per GB.
    pub fn embodied_coefficient(self) -> f64 {
        match self {
            StorageType::Ssd => 160.0,
            StorageType::Hdd => 20.0,
            StorageType::Unknown => 90.0,
        }
    }
}

/// Redundancy scheme of a storage account or managed disk. The factor
/// is the number of physical copies the scheme maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationType {
    Lrs,
    Zrs,
    Grs,
    RaGrs,
    Gzrs,
    RaGzrs,
}

impl ReplicationType {
    pub fn factor(self) -> f64 {
        match self {
            ReplicationType::Lrs | ReplicationType::Zrs => 3.0,
            ReplicationType::Grs
            | ReplicationType::RaGrs
            | ReplicationType::Gzrs
            | ReplicationType::RaGzrs => 6.0,
        }
    }

    /// Parses replication tokens as they appear in billing meter names.
    /// Unrecognized schemes map to a factor of 1 via `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_uppercase().replace('-', "_").as_str() {
            "LRS" => Some(ReplicationType::Lrs),
            "ZRS" => Some(ReplicationType::Zrs),
            "GRS" => Some(ReplicationType::Grs),
            "RA_GRS" | "RAGRS" => Some(ReplicationType::RaGrs),
            "GZRS" => Some(ReplicationType::Gzrs),
            "RA_GZRS" | "RAGZRS" => Some(ReplicationType::RaGzrs),
            _ => None,
        }
    }
}

/// A billed storage device (managed disk, page blob...). One resource
/// represents one billing line; `duration_seconds` is the billing
/// duration that single observation covers, not the spacing of
/// `time_points`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageResource {
    #[serde(flatten)]
    pub base: Resource,
    #[serde(flatten)]
    pub storage: StorageMetrics,
    pub storage_type: StorageType,
    pub replication_type: Option<ReplicationType>,
    pub size_gb: f64,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub carbon_intensity: f64,
    #[serde(default = "default_duration")]
    pub duration_seconds: u64,
}

fn default_duration() -> u64 {
    86_400
}

impl StorageResource {
    /// Size scaled by the replication copy count. The replication
    /// factor multiplies effective size before any power or embodied
    /// computation; unrecognized schemes count as a single copy.
    pub fn effective_size_gb(&self) -> f64 {
        let factor = self.replication_type.map(ReplicationType::factor).unwrap_or(1.0);
        self.size_gb * factor
    }
}

/// Write access to the metric blocks of a resource, used when mapping
/// evaluator output back onto typed records. Types without a compute or
/// storage block return `None` and the corresponding metrics are
/// skipped.
pub trait MetricSink {
    fn base_mut(&mut self) -> &mut Resource;
    fn compute_mut(&mut self) -> Option<&mut ComputeMetrics> {
        None
    }
    fn storage_mut(&mut self) -> Option<&mut StorageMetrics> {
        None
    }
}

impl MetricSink for Pod {
    fn base_mut(&mut self) -> &mut Resource {
        &mut self.base
    }
    fn compute_mut(&mut self) -> Option<&mut ComputeMetrics> {
        Some(&mut self.compute)
    }
}

impl MetricSink for Application {
    fn base_mut(&mut self) -> &mut Resource {
        &mut self.base
    }
    fn compute_mut(&mut self) -> Option<&mut ComputeMetrics> {
        Some(&mut self.compute)
    }
}

impl MetricSink for VirtualMachine {
    fn base_mut(&mut self) -> &mut Resource {
        &mut self.base
    }
    fn compute_mut(&mut self) -> Option<&mut ComputeMetrics> {
        Some(&mut self.compute)
    }
    fn storage_mut(&mut self) -> Option<&mut StorageMetrics> {
        Some(&mut self.storage)
    }
}

impl MetricSink for StorageResource {
    fn base_mut(&mut self) -> &mut Resource {
        &mut self.base
    }
    fn storage_mut(&mut self) -> Option<&mut StorageMetrics> {
        Some(&mut self.storage)
    }
}

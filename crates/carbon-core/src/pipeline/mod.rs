//! Computation pipelines
//!
//! A pipeline assembles manifests for one resource shape, hands them to
//! the evaluator, and maps the reported metrics back onto the typed
//! records. Three profiles exist: applications built from pod
//! telemetry, billed virtual machines, and billed storage devices.

mod app;
mod storage;
mod vm;

pub use app::{AppOutput, AppPipeline, PodBreakdown};
pub use storage::StoragePipeline;
pub use vm::VmPipeline;

use crate::evaluate::ResourceReport;
use crate::models::MetricSink;

/// Output values are rounded to four decimals before landing in a
/// record; everything else about them is kept verbatim.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Copies the known evaluator metrics onto a resource's metric blocks.
/// Metrics absent from the report leave the corresponding fields
/// untouched, and metrics targeting a block the resource does not have
/// are skipped.
pub(crate) fn apply_report<T: MetricSink>(report: &ResourceReport, sink: &mut T) {
    let series = |metric: &str| -> Option<Vec<f64>> {
        if !report.outputs.iter().any(|record| record.contains_key(metric)) {
            return None;
        }
        Some(
            report
                .outputs
                .iter()
                .map(|record| round4(record.get(metric).copied().unwrap_or(0.0)))
                .collect(),
        )
    };
    let total = |metric: &str| report.aggregated.get(metric).copied().map(round4);

    {
        let base = sink.base_mut();
        if let Some(values) = series("carbon") {
            base.carbon_emitted = values;
        }
        if let Some(value) = total("carbon") {
            base.total_carbon_emitted = value;
        }
        if let Some(values) = series("energy") {
            base.energy_consumed = values;
        }
        if let Some(value) = total("energy") {
            base.total_energy_consumed = value;
        }
        if let Some(values) = series("carbon-operational") {
            base.carbon_operational = values;
        }
        if let Some(value) = total("carbon-operational") {
            base.total_carbon_operational = value;
        }
        if let Some(values) = series("carbon-embodied") {
            base.carbon_embodied = values;
        }
        if let Some(value) = total("carbon-embodied") {
            base.total_carbon_embodied = value;
        }
    }

    if let Some(compute) = sink.compute_mut() {
        if let Some(values) = series("cpu/energy") {
            compute.cpu_energy = values;
        }
        if let Some(value) = total("cpu/energy") {
            compute.total_cpu_energy = value;
        }
        if let Some(values) = series("cpu/power") {
            compute.cpu_power = values;
        }
        if let Some(values) = series("resources-reserved") {
            compute.requested_cpu = values;
        }
        if let Some(values) = series("memory/energy") {
            compute.memory_energy = values;
        }
        if let Some(value) = total("memory/energy") {
            compute.total_memory_energy = value;
        }
    }

    if let Some(storage) = sink.storage_mut() {
        if let Some(values) = series("storage/energy") {
            storage.storage_energy = values;
        }
        if let Some(value) = total("storage/energy") {
            storage.total_storage_energy = value;
        }
        if let Some(values) = series("storage-embodied") {
            storage.storage_embodied = values;
        }
        if let Some(value) = total("storage-embodied") {
            storage.total_storage_embodied = value;
        }
    }
}

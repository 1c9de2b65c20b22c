//! In-process reference evaluator
//!
//! Evaluates the node roster record by record in roster order, keeping
//! a scope of named values per time index. Outputs land back in the
//! scope, so downstream nodes see them and later nodes overwrite
//! earlier ones emitting the same key. Aggregation sums each metric
//! over time; grouped children roll up to their parent elementwise.

use std::collections::BTreeMap;

use crate::catalog::InstanceCatalog;
use crate::error::{Error, Result};
use crate::graph::{piecewise_linear, Formula};
use crate::manifest::{InputRecord, InputValue, Manifest, ResourceEntry};

use super::{EvaluationReport, Evaluator, ExecutionStatus, ResourceReport};

/// Reference implementation of the evaluator contract.
#[derive(Debug, Clone, Default)]
pub struct ReferenceEvaluator {
    catalog: InstanceCatalog,
}

impl ReferenceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an evaluator resolving `cloud-metadata` lookups against
    /// the given catalog. Only needed for rosters containing that node.
    pub fn with_catalog(catalog: InstanceCatalog) -> Self {
        Self { catalog }
    }

    fn evaluate_series(
        &self,
        manifest: &Manifest,
        resource_id: &str,
        records: &[InputRecord],
    ) -> Result<ResourceReport> {
        let mut outputs = Vec::with_capacity(records.len());
        for (time_index, record) in records.iter().enumerate() {
            let scope = self.evaluate_record(manifest, resource_id, time_index, record)?;
            outputs.push(scope);
        }
        Ok(finish_report(outputs))
    }

    fn evaluate_record(
        &self,
        manifest: &Manifest,
        resource_id: &str,
        time_index: usize,
        record: &InputRecord,
    ) -> Result<BTreeMap<String, f64>> {
        let mut scope: BTreeMap<String, f64> = BTreeMap::new();
        let mut text: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in manifest.defaults.iter().chain(record.iter()) {
            match value {
                InputValue::Number(n) => {
                    scope.insert(key.clone(), *n);
                }
                InputValue::Text(t) => {
                    text.insert(key.clone(), t.clone());
                }
            }
        }
        // The shared sampling period backs the `duration` input unless
        // a record carries its own.
        scope
            .entry("duration".to_string())
            .or_insert(manifest.duration as f64);

        let missing = |input: &str| Error::ComputationInput {
            resource_id: resource_id.to_string(),
            input: input.to_string(),
            time_index,
        };

        for node in &manifest.nodes {
            let spec = node.spec();
            match spec.formula {
                Formula::Interpolate { xs, ys } => {
                    let x = *scope.get(spec.inputs[0]).ok_or_else(|| missing(spec.inputs[0]))?;
                    scope.insert(spec.output.to_string(), piecewise_linear(x, xs, ys));
                }
                Formula::Product { scale } => {
                    let mut product = scale;
                    for input in spec.inputs {
                        product *= *scope.get(*input).ok_or_else(|| missing(input))?;
                    }
                    scope.insert(spec.output.to_string(), product);
                }
                Formula::Coefficient { factor } => {
                    let value =
                        *scope.get(spec.inputs[0]).ok_or_else(|| missing(spec.inputs[0]))?;
                    scope.insert(spec.output.to_string(), value * factor);
                }
                Formula::Sum => {
                    // Missing terms read as zero: the pod roster has no
                    // storage/energy, the VM roster no network terms.
                    let total: f64 = spec
                        .inputs
                        .iter()
                        .filter_map(|input| scope.get(*input))
                        .sum();
                    scope.insert(spec.output.to_string(), total);
                }
                Formula::NetworkEnergy { kwh_per_gb } => {
                    let data_in = scope.get(spec.inputs[0]).copied().unwrap_or(0.0);
                    let data_out = scope.get(spec.inputs[1]).copied().unwrap_or(0.0);
                    scope.insert(spec.output.to_string(), (data_in + data_out) * kwh_per_gb);
                }
                Formula::EmbodiedShare {
                    lifetime_g,
                    lifespan_seconds,
                } => {
                    let duration = *scope.get("duration").ok_or_else(|| missing("duration"))?;
                    // The cloud-metadata node emits vcpu figures under
                    // its own names; fall back to them when no explicit
                    // reservation was filled.
                    let reserved = scope
                        .get("resources-reserved")
                        .or_else(|| scope.get("vcpus-allocated"))
                        .copied()
                        .ok_or_else(|| missing("resources-reserved"))?;
                    let total = scope
                        .get("resources-total")
                        .or_else(|| scope.get("vcpus-total"))
                        .copied()
                        .ok_or_else(|| missing("resources-total"))?;
                    let share = if total > 0.0 { reserved / total } else { 0.0 };
                    scope.insert(
                        spec.output.to_string(),
                        lifetime_g * duration / lifespan_seconds * share,
                    );
                }
                Formula::InstanceLookup => {
                    let instance = text
                        .get(spec.inputs[0])
                        .ok_or_else(|| missing(spec.inputs[0]))?;
                    let hw = self.catalog.lookup(instance)?;
                    scope.insert("cpu/thermal-design-power".to_string(), hw.cpu_tdp);
                    scope.insert("vcpus-total".to_string(), hw.vcpus_total);
                    scope.insert("vcpus-allocated".to_string(), hw.vcpus_allocated);
                    scope.insert("memory/requested".to_string(), hw.memory_gb);
                }
            }
        }
        Ok(scope)
    }
}

/// Sums each metric across time into the aggregated map.
fn finish_report(outputs: Vec<BTreeMap<String, f64>>) -> ResourceReport {
    let mut aggregated: BTreeMap<String, f64> = BTreeMap::new();
    for record in &outputs {
        for (metric, value) in record {
            *aggregated.entry(metric.clone()).or_insert(0.0) += value;
        }
    }
    ResourceReport {
        aggregated,
        outputs,
        children: BTreeMap::new(),
    }
}

/// Rolls child reports up to a parent: elementwise sums per time index
/// and summed aggregates.
fn rollup(children: BTreeMap<String, ResourceReport>) -> ResourceReport {
    let len = children.values().map(|c| c.outputs.len()).max().unwrap_or(0);
    let mut outputs: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); len];
    let mut aggregated: BTreeMap<String, f64> = BTreeMap::new();
    for child in children.values() {
        for (metric, value) in &child.aggregated {
            *aggregated.entry(metric.clone()).or_insert(0.0) += value;
        }
        for (time_index, record) in child.outputs.iter().enumerate() {
            for (metric, value) in record {
                *outputs[time_index].entry(metric.clone()).or_insert(0.0) += value;
            }
        }
    }
    ResourceReport {
        aggregated,
        outputs,
        children,
    }
}

impl Evaluator for ReferenceEvaluator {
    fn evaluate(&self, manifest: &Manifest) -> Result<EvaluationReport> {
        let mut tree = BTreeMap::new();
        for (resource_id, entry) in &manifest.resources {
            let report = match entry {
                ResourceEntry::Series(records) => {
                    self.evaluate_series(manifest, resource_id, records)?
                }
                ResourceEntry::Group(children) => {
                    let mut child_reports = BTreeMap::new();
                    for (child_id, records) in children {
                        child_reports.insert(
                            child_id.clone(),
                            self.evaluate_series(manifest, child_id, records)?,
                        );
                    }
                    rollup(child_reports)
                }
            };
            tree.insert(resource_id.clone(), report);
        }
        tracing::debug!(
            manifest_id = manifest.manifest_id,
            resources = tree.len(),
            "reference evaluation completed"
        );
        Ok(EvaluationReport {
            status: ExecutionStatus::Success,
            tree,
        })
    }
}

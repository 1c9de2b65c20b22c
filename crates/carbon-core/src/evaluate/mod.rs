//! Evaluator boundary
//!
//! The pipeline treats evaluation as a black-box call: given a manifest
//! it returns, per resource id, an aggregated scalar per metric and an
//! output record per time index. The trait is injectable so tests and
//! the daemon can run the in-process reference implementation while a
//! deployment may substitute an out-of-process engine.

mod reference;

pub use reference::ReferenceEvaluator;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Computed metrics for one resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceReport {
    /// Metric name to aggregated scalar over all time indices.
    #[serde(default)]
    pub aggregated: BTreeMap<String, f64>,
    /// Metric name to value, one record per time index.
    #[serde(default)]
    pub outputs: Vec<BTreeMap<String, f64>>,
    /// Per-child reports for grouped entries (application to pods).
    #[serde(default)]
    pub children: BTreeMap<String, ResourceReport>,
}

/// Result of one evaluator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub status: ExecutionStatus,
    /// Resource id to report.
    pub tree: BTreeMap<String, ResourceReport>,
}

/// Synchronous, chunk-scoped evaluation capability.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, manifest: &Manifest) -> Result<EvaluationReport>;
}

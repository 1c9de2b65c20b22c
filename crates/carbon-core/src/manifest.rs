//! Declarative evaluation manifests
//!
//! A manifest bundles everything the evaluator needs for one chunk: the
//! node roster of the profile, a merged input record per resource per
//! time index, profile-level default inputs, and the duration metadata.
//! Manifests and reports are serializable so an out-of-process
//! evaluator can materialize them as files keyed by the manifest id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::NodeKind;

/// A single input value. Most inputs are numeric; the instance-type
/// query and timestamps are text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Number(f64),
    Text(String),
}

impl InputValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            InputValue::Number(n) => Some(*n),
            InputValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            InputValue::Text(t) => Some(t),
            InputValue::Number(_) => None,
        }
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Number(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

/// Merged node inputs for one resource at one time index. Later fills
/// for the same key overwrite earlier ones, so the order in which a
/// profile applies its fill functions is significant.
pub type InputRecord = BTreeMap<String, InputValue>;

/// How per-time-point rows relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Rows form a shared time series sampled at the manifest duration.
    Both,
    /// Each row is an independent observation carrying its own
    /// duration (storage billing lines).
    Horizontal,
}

/// Input rows for one resource: either a flat series, or a group of
/// child series (application to pods).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceEntry {
    Series(Vec<InputRecord>),
    Group(BTreeMap<String, Vec<InputRecord>>),
}

/// One evaluator invocation's worth of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Distinct per chunk, so concurrently materialized manifest/result
    /// file pairs never collide.
    pub manifest_id: usize,
    pub nodes: Vec<NodeKind>,
    pub aggregation: AggregationMode,
    /// Sampling period in seconds for time-series profiles; rows of
    /// horizontal manifests override this per record.
    pub duration: u64,
    /// Inputs applied under every record (the record wins on conflict).
    #[serde(default)]
    pub defaults: InputRecord,
    pub resources: BTreeMap<String, ResourceEntry>,
}

impl Manifest {
    pub fn new(manifest_id: usize, nodes: Vec<NodeKind>, aggregation: AggregationMode, duration: u64) -> Self {
        Self {
            manifest_id,
            nodes,
            aggregation,
            duration,
            defaults: InputRecord::new(),
            resources: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_value_roundtrip() {
        let record: InputRecord = [
            ("cpu/utilization".to_string(), InputValue::from(42.5)),
            ("cloud/instance-type".to_string(), InputValue::from("Standard_D4s_v3")),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&record).unwrap();
        let back: InputRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back["cpu/utilization"].as_number(), Some(42.5));
        assert_eq!(back["cloud/instance-type"].as_text(), Some("Standard_D4s_v3"));
    }

    #[test]
    fn test_manifest_serializes_node_keys() {
        let manifest = Manifest::new(
            7,
            vec![NodeKind::TeadsCurve, NodeKind::SciEPue],
            AggregationMode::Both,
            1800,
        );
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"teads-curve\""));
        assert!(json.contains("\"sci-e-pue\""));
        assert!(json.contains("\"manifest_id\":7"));
    }
}

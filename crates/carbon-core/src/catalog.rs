//! Cloud instance-type hardware catalog
//!
//! External collaborator table keyed by instance type string, resolving
//! the physical characteristics the cloud-metadata node emits: CPU
//! thermal design power, total and allocated core counts, and available
//! memory.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Hardware characteristics of one instance type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceSpec {
    pub cpu_tdp: f64,
    pub vcpus_total: f64,
    pub vcpus_allocated: f64,
    pub memory_gb: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogRow {
    #[serde(rename = "instance-class")]
    instance_class: String,
    #[serde(rename = "cpu-tdp")]
    cpu_tdp: f64,
    #[serde(rename = "cpu-cores-available")]
    vcpus_total: f64,
    #[serde(rename = "cpu-cores-utilized")]
    vcpus_allocated: f64,
    #[serde(rename = "memory-available")]
    memory_gb: f64,
}

/// Instance-type lookup table, typically loaded from the vendored
/// instances CSV.
#[derive(Debug, Clone, Default)]
pub struct InstanceCatalog {
    entries: HashMap<String, InstanceSpec>,
}

impl InstanceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the catalog from a CSV file with `instance-class`,
    /// `cpu-tdp`, `cpu-cores-available`, `cpu-cores-utilized` and
    /// `memory-available` columns.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|e| {
            Error::Configuration(format!("cannot open instance catalog {}: {e}", path.display()))
        })?;
        let mut entries = HashMap::new();
        for row in reader.deserialize::<CatalogRow>() {
            let row = row.map_err(|e| {
                Error::Configuration(format!("malformed instance catalog row: {e}"))
            })?;
            entries.insert(
                row.instance_class,
                InstanceSpec {
                    cpu_tdp: row.cpu_tdp,
                    vcpus_total: row.vcpus_total,
                    vcpus_allocated: row.vcpus_allocated,
                    memory_gb: row.memory_gb,
                },
            );
        }
        tracing::debug!(instances = entries.len(), "instance catalog loaded");
        Ok(Self { entries })
    }

    pub fn insert(&mut self, instance_class: impl Into<String>, spec: InstanceSpec) {
        self.entries.insert(instance_class.into(), spec);
    }

    /// Missing instance types are a configuration error of the catalog,
    /// not a per-time-point computation failure.
    pub fn lookup(&self, instance_class: &str) -> Result<&InstanceSpec> {
        self.entries.get(instance_class).ok_or_else(|| {
            Error::Configuration(format!("unknown instance type `{instance_class}`"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

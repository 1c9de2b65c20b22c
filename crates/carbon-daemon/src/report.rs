//! Emission report output
//!
//! Reports are plain JSON arrays of the evaluated resources, written
//! under the configured output directory with a date-stamped name.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use carbon_core::models::{StorageResource, VirtualMachine};

fn write_json<T: Serialize>(dir: &Path, stem: &str, payload: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create report directory {}", dir.display()))?;
    let path = dir.join(format!("{stem}_{}.json", Utc::now().format("%Y-%m-%d")));
    let file = fs::File::create(&path)
        .with_context(|| format!("cannot create report file {}", path.display()))?;
    serde_json::to_writer_pretty(file, payload)
        .with_context(|| format!("cannot serialize report {}", path.display()))?;
    Ok(path)
}

pub fn write_vm_report(dir: impl AsRef<Path>, vms: &[VirtualMachine]) -> Result<PathBuf> {
    let path = write_json(dir.as_ref(), "vm_emissions", &vms)?;
    let total_carbon: f64 = vms.iter().map(|vm| vm.base.total_carbon_emitted).sum();
    tracing::info!(
        path = %path.display(),
        vms = vms.len(),
        total_carbon_g = total_carbon,
        "VM emission report written"
    );
    Ok(path)
}

pub fn write_storage_report(
    dir: impl AsRef<Path>,
    resources: &[StorageResource],
) -> Result<PathBuf> {
    let path = write_json(dir.as_ref(), "storage_emissions", &resources)?;
    let total_carbon: f64 = resources.iter().map(|r| r.base.total_carbon_emitted).sum();
    tracing::info!(
        path = %path.display(),
        disks = resources.len(),
        total_carbon_g = total_carbon,
        "storage emission report written"
    );
    Ok(path)
}

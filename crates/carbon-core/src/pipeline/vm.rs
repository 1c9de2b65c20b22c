//! Virtual-machine profile
//!
//! Billed VMs are evaluated in fixed-size chunks on the bounded worker
//! pool. Each VM resolves its hardware through the cloud-metadata node,
//! so the evaluator must carry an instance catalog.

use std::sync::Arc;

use crate::chunk::ChunkExecutor;
use crate::constants::VM_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::evaluate::{Evaluator, ExecutionStatus};
use crate::graph::NodeKind;
use crate::manifest::{AggregationMode, InputRecord, InputValue, Manifest, ResourceEntry};
use crate::models::{StorageType, VirtualMachine};

use super::apply_report;

const ROSTER: &[NodeKind] = &[
    NodeKind::CloudMetadata,
    NodeKind::TeadsCurve,
    NodeKind::PCpu,
    NodeKind::ECpu,
    NodeKind::PMem,
    NodeKind::EMem,
    NodeKind::PVmStorage,
    NodeKind::EVmStorage,
    NodeKind::SciE,
    NodeKind::SciEPue,
    NodeKind::SciO,
    NodeKind::SciMCpu,
    NodeKind::MVmStorage,
    NodeKind::SciM,
    NodeKind::Sci,
];

pub struct VmPipeline {
    duration: u64,
    evaluator: Arc<dyn Evaluator>,
    executor: ChunkExecutor,
}

impl VmPipeline {
    pub fn new(duration: u64, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            duration,
            evaluator,
            executor: ChunkExecutor::new(VM_CHUNK_SIZE),
        }
    }

    pub fn with_chunk_size(duration: u64, evaluator: Arc<dyn Evaluator>, chunk_size: usize) -> Self {
        Self {
            duration,
            evaluator,
            executor: ChunkExecutor::new(chunk_size),
        }
    }

    /// Evaluates the fleet chunk by chunk; the returned VMs keep the
    /// incoming order.
    pub async fn run(&self, vms: Vec<VirtualMachine>) -> Result<Vec<VirtualMachine>> {
        tracing::info!(vms = vms.len(), "evaluating virtual machine fleet");
        let evaluator = Arc::clone(&self.evaluator);
        let duration = self.duration;
        self.executor
            .run(vms, move |chunk, manifest_id| {
                evaluate_chunk(&*evaluator, duration, chunk, manifest_id)
            })
            .await
    }
}

fn evaluate_chunk(
    evaluator: &dyn Evaluator,
    duration: u64,
    mut vms: Vec<VirtualMachine>,
    manifest_id: usize,
) -> Result<Vec<VirtualMachine>> {
    let mut manifest = Manifest::new(manifest_id, ROSTER.to_vec(), AggregationMode::Both, duration);
    // Billing rows never say what technology backs a VM disk; the
    // embodied coefficient for an unknown device applies fleet-wide.
    manifest.defaults.insert(
        "storage/embodied-coefficient".to_string(),
        InputValue::from(StorageType::Unknown.embodied_coefficient()),
    );
    for vm in &vms {
        manifest
            .resources
            .insert(vm.base.id.clone(), ResourceEntry::Series(vm_records(vm)));
    }

    let report = evaluator.evaluate(&manifest)?;
    if report.status != ExecutionStatus::Success {
        return Err(Error::EvaluatorFailure { manifest_id });
    }
    for vm in &mut vms {
        let vm_report = report.tree.get(&vm.base.id).ok_or_else(|| {
            Error::Configuration(format!("no report for vm `{}`", vm.base.id))
        })?;
        apply_report(vm_report, vm);
    }
    Ok(vms)
}

fn vm_records(vm: &VirtualMachine) -> Vec<InputRecord> {
    (0..vm.base.time_points.len())
        .map(|i| {
            let mut record = InputRecord::new();
            record.insert(
                "timestamp".to_string(),
                InputValue::from(vm.base.time_points[i].clone()),
            );
            record.insert(
                "cpu/utilization".to_string(),
                InputValue::from((vm.compute.cpu_util[i] * 100.0).min(100.0)),
            );
            record.insert(
                "grid/carbon-intensity".to_string(),
                InputValue::from(vm.compute.carbon_intensity),
            );
            record.insert("pue".to_string(), InputValue::from(vm.compute.pue));
            if let Some(size) = &vm.vm_size {
                record.insert("cloud/instance-type".to_string(), InputValue::from(size.clone()));
            }
            record.insert(
                "storage/requested".to_string(),
                InputValue::from(vm.storage_size.get(i).copied().unwrap_or(0.0)),
            );
            record
        })
        .collect()
}

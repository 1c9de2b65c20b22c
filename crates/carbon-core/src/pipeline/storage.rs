//! Storage profile
//!
//! Billed storage devices are independent observations: each record
//! carries its own billing duration, so the manifest is horizontal and
//! chunks are much larger than for VMs. Replication is already folded
//! into the effective size before any coefficient applies.

use std::sync::Arc;

use crate::chunk::ChunkExecutor;
use crate::constants::STORAGE_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::evaluate::{Evaluator, ExecutionStatus};
use crate::graph::NodeKind;
use crate::manifest::{AggregationMode, InputRecord, InputValue, Manifest, ResourceEntry};
use crate::models::{StorageResource, StorageType};

use super::apply_report;

const ROSTER: &[NodeKind] = &[
    NodeKind::PStorage,
    NodeKind::EStorage,
    NodeKind::MStorage,
    NodeKind::SciO,
    NodeKind::Sci,
];

/// Timestamp stamped on devices whose billing export carried none.
const FALLBACK_TIMESTAMP: &str = "2025-01-01";

pub struct StoragePipeline {
    evaluator: Arc<dyn Evaluator>,
    executor: ChunkExecutor,
}

impl StoragePipeline {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            executor: ChunkExecutor::new(STORAGE_CHUNK_SIZE),
        }
    }

    pub fn with_chunk_size(evaluator: Arc<dyn Evaluator>, chunk_size: usize) -> Self {
        Self {
            evaluator,
            executor: ChunkExecutor::new(chunk_size),
        }
    }

    /// Evaluates the storage inventory chunk by chunk, preserving the
    /// incoming order.
    pub async fn run(&self, resources: Vec<StorageResource>) -> Result<Vec<StorageResource>> {
        log_inventory(&resources);
        let evaluator = Arc::clone(&self.evaluator);
        let resources = self
            .executor
            .run(resources, move |chunk, manifest_id| {
                evaluate_chunk(&*evaluator, chunk, manifest_id)
            })
            .await?;
        log_top_emitters(&resources);
        Ok(resources)
    }
}

fn evaluate_chunk(
    evaluator: &dyn Evaluator,
    mut resources: Vec<StorageResource>,
    manifest_id: usize,
) -> Result<Vec<StorageResource>> {
    let mut manifest = Manifest::new(
        manifest_id,
        ROSTER.to_vec(),
        AggregationMode::Horizontal,
        86_400,
    );
    for resource in &resources {
        manifest.resources.insert(
            resource.base.id.clone(),
            ResourceEntry::Series(storage_records(resource)),
        );
    }

    let report = evaluator.evaluate(&manifest)?;
    if report.status != ExecutionStatus::Success {
        return Err(Error::EvaluatorFailure { manifest_id });
    }
    for resource in &mut resources {
        let resource_report = report.tree.get(&resource.base.id).ok_or_else(|| {
            Error::Configuration(format!("no report for storage `{}`", resource.base.id))
        })?;
        apply_report(resource_report, resource);
        if resource.base.time_points.is_empty() {
            resource.base.time_points = vec![FALLBACK_TIMESTAMP.to_string()];
        }
    }
    Ok(resources)
}

fn storage_records(resource: &StorageResource) -> Vec<InputRecord> {
    let timestamps: Vec<String> = if resource.base.time_points.is_empty() {
        vec![FALLBACK_TIMESTAMP.to_string()]
    } else {
        resource.base.time_points.clone()
    };
    timestamps
        .into_iter()
        .map(|timestamp| {
            let mut record = InputRecord::new();
            record.insert("timestamp".to_string(), InputValue::from(timestamp));
            record.insert(
                "storage/requested".to_string(),
                InputValue::from(resource.effective_size_gb()),
            );
            record.insert(
                "power/coefficient".to_string(),
                InputValue::from(resource.storage_type.power_coefficient()),
            );
            record.insert(
                "storage/embodied-coefficient".to_string(),
                InputValue::from(resource.storage_type.embodied_coefficient()),
            );
            record.insert(
                "duration/seconds".to_string(),
                InputValue::from(resource.duration_seconds as f64),
            );
            record.insert(
                "grid/carbon-intensity".to_string(),
                InputValue::from(resource.carbon_intensity),
            );
            record
        })
        .collect()
}

fn log_inventory(resources: &[StorageResource]) {
    let total_gb: f64 = resources.iter().map(|r| r.size_gb).sum();
    let count_of = |kind: StorageType| resources.iter().filter(|r| r.storage_type == kind).count();
    tracing::info!(
        resources = resources.len(),
        total_gb,
        ssd = count_of(StorageType::Ssd),
        hdd = count_of(StorageType::Hdd),
        unknown = count_of(StorageType::Unknown),
        "evaluating storage inventory"
    );
}

fn log_top_emitters(resources: &[StorageResource]) {
    let mut ranked: Vec<&StorageResource> = resources.iter().collect();
    ranked.sort_by(|a, b| {
        b.base
            .total_carbon_emitted
            .partial_cmp(&a.base.total_carbon_emitted)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for resource in ranked.iter().take(5) {
        tracing::debug!(
            id = %resource.base.id,
            carbon_g = resource.base.total_carbon_emitted,
            size_gb = resource.size_gb,
            "top storage emitter"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{EvaluationReport, ReferenceEvaluator};
    use crate::models::{ReplicationType, Resource, StorageMetrics};

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(&self, _manifest: &Manifest) -> Result<EvaluationReport> {
            Ok(EvaluationReport {
                status: ExecutionStatus::Failed,
                tree: std::collections::BTreeMap::new(),
            })
        }
    }

    fn disk(id: &str, replication: Option<ReplicationType>) -> StorageResource {
        StorageResource {
            base: Resource::new(id),
            storage: StorageMetrics::default(),
            storage_type: StorageType::Ssd,
            replication_type: replication,
            size_gb: 128.0,
            region: Some("germanywestcentral".to_string()),
            subscription: None,
            resource_group: None,
            carbon_intensity: 100.0,
            duration_seconds: 86_400,
        }
    }

    fn pipeline() -> StoragePipeline {
        StoragePipeline::new(Arc::new(ReferenceEvaluator::new()))
    }

    #[tokio::test]
    async fn test_ssd_disk_daily_footprint() {
        let disks = pipeline().run(vec![disk("d1", Some(ReplicationType::Lrs))]).await.unwrap();
        let disk = &disks[0];
        // 128 GB in 3 local copies at 1.2e-6 kW/GB over a day.
        assert_eq!(disk.base.energy_consumed, vec![0.0111]);
        assert_eq!(disk.base.total_carbon_operational, 1.1059);
        // Embodied: 384 GB * 160 g/GB amortized over the lifespan.
        assert!((disk.base.total_carbon_embodied - 42.0534).abs() < 1e-3);
        let split = disk.base.total_carbon_operational + disk.base.total_carbon_embodied;
        assert!((disk.base.total_carbon_emitted - split).abs() < 1e-3);
        assert_eq!(disk.base.time_points, vec!["2025-01-01".to_string()]);
    }

    #[tokio::test]
    async fn test_geo_replication_doubles_local_footprint() {
        let disks = pipeline()
            .run(vec![
                disk("lrs", Some(ReplicationType::Lrs)),
                disk("grs", Some(ReplicationType::Grs)),
            ])
            .await
            .unwrap();
        let lrs = disks[0].base.total_energy_consumed;
        let grs = disks[1].base.total_energy_consumed;
        assert!((grs - 2.0 * lrs).abs() < 2e-4);
        assert!(
            (disks[1].base.total_carbon_embodied - 2.0 * disks[0].base.total_carbon_embodied)
                .abs()
                < 1e-3
        );
    }

    #[tokio::test]
    async fn test_unrecognized_replication_counts_one_copy() {
        let disks = pipeline()
            .run(vec![disk("single", None), disk("local", Some(ReplicationType::Lrs))])
            .await
            .unwrap();
        let ratio = disks[1].base.total_energy_consumed / disks[0].base.total_energy_consumed;
        assert!((ratio - 3.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_inventory_order_survives_chunking() {
        let inventory: Vec<StorageResource> =
            (0..25).map(|i| disk(&format!("d{i}"), Some(ReplicationType::Lrs))).collect();
        let pipeline = StoragePipeline::with_chunk_size(Arc::new(ReferenceEvaluator::new()), 4);
        let inventory = pipeline.run(inventory).await.unwrap();
        for (i, resource) in inventory.iter().enumerate() {
            assert_eq!(resource.base.id, format!("d{i}"));
            assert!(resource.base.total_carbon_emitted > 0.0);
        }
    }

    #[tokio::test]
    async fn test_failed_evaluation_status_is_fatal() {
        let pipeline = StoragePipeline::new(Arc::new(FailingEvaluator));
        let err = pipeline.run(vec![disk("d1", Some(ReplicationType::Lrs))]).await.unwrap_err();
        assert!(matches!(err, Error::EvaluatorFailure { manifest_id: 0 }));
    }

    #[tokio::test]
    async fn test_existing_timestamps_are_kept() {
        let mut labelled = disk("d1", Some(ReplicationType::Lrs));
        labelled.base.time_points = vec!["2024-05-01".to_string(), "2024-05-02".to_string()];
        let disks = pipeline().run(vec![labelled]).await.unwrap();
        assert_eq!(disks[0].base.energy_consumed.len(), 2);
        assert_eq!(disks[0].base.time_points[0], "2024-05-01");
    }
}

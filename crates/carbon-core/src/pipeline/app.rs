//! Application profile
//!
//! Turns aligned pod telemetry into per-application (or per-cluster)
//! carbon figures. Applications are submitted as grouped resources, so
//! the evaluator reports each pod individually and rolls the group up
//! to the application.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::constants::{CPU_AVG_WATTS_PER_CORE_AZURE, POD_HOST_TOTAL_CORES};
use crate::error::{Error, Result};
use crate::evaluate::{Evaluator, ExecutionStatus};
use crate::graph::NodeKind;
use crate::manifest::{AggregationMode, InputRecord, InputValue, Manifest, ResourceEntry};
use crate::models::{Application, Pod};

use super::{apply_report, round4};

/// Pods grouped for reporting: paas, then app, then namespace.
pub type PodBreakdown = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Pod>>>>;

#[derive(Debug)]
pub enum AppOutput {
    Applications(Vec<Application>),
    Pods(PodBreakdown),
}

const ROSTER: &[NodeKind] = &[
    NodeKind::TeadsCurve,
    NodeKind::PCores,
    NodeKind::ECpu,
    NodeKind::PMem,
    NodeKind::EMem,
    NodeKind::ENet,
    NodeKind::SciE,
    NodeKind::SciEPue,
    NodeKind::SciO,
    NodeKind::SciMCpu,
    NodeKind::Sci,
];

pub struct AppPipeline {
    /// Sampling period of the telemetry grid, in seconds.
    duration: u64,
    evaluator: Arc<dyn Evaluator>,
}

impl AppPipeline {
    pub fn new(duration: u64, evaluator: Arc<dyn Evaluator>) -> Self {
        Self { duration, evaluator }
    }

    /// Evaluates all applications in one manifest and maps the metrics
    /// back onto them. With `breakdown` the result is regrouped into
    /// the per-pod reporting shape instead.
    pub async fn run(&self, mut apps: Vec<Application>, breakdown: bool) -> Result<AppOutput> {
        let manifest = self.build_manifest(&apps);
        tracing::info!(
            applications = apps.len(),
            pods = apps.iter().map(|a| a.pods.len()).sum::<usize>(),
            "evaluating application manifest"
        );
        let report = self.evaluator.evaluate(&manifest)?;
        if report.status != ExecutionStatus::Success {
            return Err(Error::EvaluatorFailure {
                manifest_id: manifest.manifest_id,
            });
        }

        for app in &mut apps {
            let app_report = report.tree.get(&app.base.id).ok_or_else(|| {
                Error::Configuration(format!("no report for application `{}`", app.base.id))
            })?;
            apply_report(app_report, app);
            for pod in &mut app.pods {
                let pod_report = app_report.children.get(&pod.base.id).ok_or_else(|| {
                    Error::Configuration(format!("no report for pod `{}`", pod.base.id))
                })?;
                apply_report(pod_report, pod);
            }
        }

        if breakdown {
            Ok(AppOutput::Pods(regroup_pods(apps)))
        } else {
            Ok(AppOutput::Applications(apps))
        }
    }

    fn build_manifest(&self, apps: &[Application]) -> Manifest {
        let mut manifest =
            Manifest::new(0, ROSTER.to_vec(), AggregationMode::Both, self.duration);
        // No physical processor is known for a pod; an average
        // watts-per-core figure stands in for the TDP and p-cores
        // scales it by the reserved cores.
        manifest.defaults.insert(
            "cpu/thermal-design-power".to_string(),
            InputValue::from(CPU_AVG_WATTS_PER_CORE_AZURE),
        );
        for app in apps {
            let children: BTreeMap<String, Vec<InputRecord>> = app
                .pods
                .iter()
                .map(|pod| (pod.base.id.clone(), pod_records(pod)))
                .collect();
            manifest
                .resources
                .insert(app.base.id.clone(), ResourceEntry::Group(children));
        }
        manifest
    }
}

fn pod_records(pod: &Pod) -> Vec<InputRecord> {
    (0..pod.base.time_points.len())
        .map(|i| {
            let mut record = InputRecord::new();
            record.insert(
                "timestamp".to_string(),
                InputValue::from(pod.base.time_points[i].clone()),
            );
            // Utilization arrives as a 0-1 fraction; the teads curve
            // wants percent, capped at 100.
            record.insert(
                "cpu/utilization".to_string(),
                InputValue::from((pod.compute.cpu_util[i] * 100.0).min(100.0)),
            );
            record.insert(
                "grid/carbon-intensity".to_string(),
                InputValue::from(pod.compute.carbon_intensity),
            );
            record.insert("pue".to_string(), InputValue::from(pod.compute.pue));
            record.insert(
                "resources-reserved".to_string(),
                InputValue::from(pod.compute.requested_cpu[i]),
            );
            record.insert(
                "resources-total".to_string(),
                InputValue::from(POD_HOST_TOTAL_CORES),
            );
            record.insert(
                "memory/requested".to_string(),
                InputValue::from(pod.compute.requested_memory[i] / 1e9),
            );
            record.insert(
                "network/data-in".to_string(),
                InputValue::from(pod.compute.network_io.get(i).copied().unwrap_or(0.0)),
            );
            record.insert("network/data-out".to_string(), InputValue::from(0.0));
            record
        })
        .collect()
}

/// Regroups evaluated pods into the reporting hierarchy, with the raw
/// utilization fractions rounded for presentation.
fn regroup_pods(apps: Vec<Application>) -> PodBreakdown {
    let mut breakdown = PodBreakdown::new();
    for app in apps {
        for mut pod in app.pods {
            pod.compute.cpu_util = pod.compute.cpu_util.iter().copied().map(round4).collect();
            breakdown
                .entry(pod.paas.clone())
                .or_default()
                .entry(pod.app.clone())
                .or_default()
                .entry(pod.namespace.clone())
                .or_default()
                .push(pod);
        }
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::{EvaluationReport, ReferenceEvaluator};
    use crate::models::{ComputeMetrics, Resource};

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(&self, _manifest: &Manifest) -> Result<EvaluationReport> {
            Ok(EvaluationReport {
                status: ExecutionStatus::Failed,
                tree: std::collections::BTreeMap::new(),
            })
        }
    }

    fn pod(id: &str, app: &str, paas: &str, namespace: &str) -> Pod {
        Pod {
            base: Resource {
                id: id.to_string(),
                name: Some(id.to_string()),
                time_points: vec![
                    "2024-05-01 12:00:00".to_string(),
                    "2024-05-01 12:30:00".to_string(),
                ],
                ..Default::default()
            },
            compute: ComputeMetrics {
                cpu_util: vec![0.5, 0.5],
                requested_cpu: vec![2.0, 2.0],
                requested_memory: vec![4e9, 4e9],
                network_io: vec![0.5, 0.5],
                carbon_intensity: 100.0,
                pue: 1.185,
                ..Default::default()
            },
            app: app.to_string(),
            paas: paas.to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn application(id: &str, name: &str, pods: Vec<Pod>) -> Application {
        Application {
            base: Resource {
                id: id.to_string(),
                name: Some(name.to_string()),
                time_points: pods[0].base.time_points.clone(),
                ..Default::default()
            },
            compute: ComputeMetrics {
                carbon_intensity: pods[0].compute.carbon_intensity,
                pue: pods[0].compute.pue,
                ..Default::default()
            },
            pods,
        }
    }

    fn pipeline() -> AppPipeline {
        AppPipeline::new(1800, Arc::new(ReferenceEvaluator::new()))
    }

    #[tokio::test]
    async fn test_single_pod_application_metrics() {
        let apps = vec![application("0", "shop", vec![pod("pod-a", "shop", "gwc1", "ns")])];
        let result = pipeline().run(apps, false).await.unwrap();
        let apps = match result {
            AppOutput::Applications(apps) => apps,
            other => panic!("unexpected output {other:?}"),
        };
        let app = &apps[0];

        // 2.27 W/core at 50% utilization reserves 2 cores for 1800 s:
        // 0.75 * 2.27 * 2 / 1000 kW * 0.5 h = 0.0017 kWh per point.
        assert_eq!(app.compute.cpu_energy, vec![0.0017, 0.0017]);
        // 4 GB at 0.000392 kW/GB over half an hour.
        assert_eq!(app.compute.memory_energy, vec![0.0008, 0.0008]);
        assert!(app.base.total_energy_consumed > 0.0);
        assert_eq!(app.base.carbon_emitted.len(), 2);
        // Total carbon splits exactly into operational and embodied.
        let split = app.base.total_carbon_operational + app.base.total_carbon_embodied;
        assert!((app.base.total_carbon_emitted - split).abs() < 1e-3);
        // The single pod carries the same figures as its application.
        let pod = &app.pods[0];
        assert_eq!(pod.compute.cpu_energy, app.compute.cpu_energy);
    }

    #[tokio::test]
    async fn test_application_sums_its_pods() {
        let apps = vec![application(
            "0",
            "shop",
            vec![pod("pod-a", "shop", "gwc1", "ns"), pod("pod-b", "shop", "gwc1", "ns")],
        )];
        let result = pipeline().run(apps, false).await.unwrap();
        let apps = match result {
            AppOutput::Applications(apps) => apps,
            other => panic!("unexpected output {other:?}"),
        };
        let app = &apps[0];
        let pod_total: f64 = app.pods.iter().map(|p| p.base.total_carbon_emitted).sum();
        assert!((app.base.total_carbon_emitted - pod_total).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_pod_breakdown_shape() {
        let apps = vec![
            application("0", "shop", vec![pod("pod-a", "shop", "gwc1", "front")]),
            application("1", "billing", vec![pod("pod-b", "billing", "fc1", "back")]),
        ];
        let result = pipeline().run(apps, true).await.unwrap();
        let pods = match result {
            AppOutput::Pods(pods) => pods,
            other => panic!("unexpected output {other:?}"),
        };
        assert_eq!(pods.len(), 2);
        let front = &pods["gwc1"]["shop"]["front"];
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].base.id, "pod-a");
        assert_eq!(front[0].compute.cpu_util, vec![0.5, 0.5]);
        assert!(front[0].base.total_carbon_emitted > 0.0);
    }

    #[tokio::test]
    async fn test_failed_evaluation_status_is_fatal() {
        let pipeline = AppPipeline::new(1800, Arc::new(FailingEvaluator));
        let apps = vec![application("0", "shop", vec![pod("pod-a", "shop", "gwc1", "ns")])];
        let err = pipeline.run(apps, false).await.unwrap_err();
        assert!(matches!(err, Error::EvaluatorFailure { manifest_id: 0 }));
    }

    #[tokio::test]
    async fn test_utilization_capped_at_hundred_percent() {
        let mut overloaded = pod("pod-a", "shop", "gwc1", "ns");
        overloaded.compute.cpu_util = vec![1.5, 1.5];
        let apps = vec![application("0", "shop", vec![overloaded])];
        let result = pipeline().run(apps, false).await.unwrap();
        let apps = match result {
            AppOutput::Applications(apps) => apps,
            other => panic!("unexpected output {other:?}"),
        };
        // Capped at the top of the curve: 1.02 * 2.27 * 2 / 1000 * 0.5.
        assert_eq!(apps[0].compute.cpu_energy, vec![0.0023, 0.0023]);
    }
}

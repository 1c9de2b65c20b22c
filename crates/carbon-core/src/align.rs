//! Telemetry alignment and pod aggregation
//!
//! Raw pod telemetry arrives per metric with possibly-missing or
//! irregular timestamps. The aligner resamples each series onto the
//! caller's uniform grid, drops pods that did not report every required
//! metric, and aggregates the survivors into application- or
//! cluster-level resources.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::constants::PUE_AZURE;
use crate::error::{Error, Result};
use crate::graph::piecewise_linear;
use crate::intensity;
use crate::models::{Application, ComputeMetrics, Pod, Resource};

/// Which aggregated hardware metric a raw series feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionKind {
    CpuUtil,
    RequestedCores,
    RequestedBytes,
    StorageCapacity,
}

/// Grouping key for pod aggregation. Chosen by the caller: group by
/// app when an application filter was supplied, by paas otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Application,
    Cluster,
}

/// One raw series for one pod and one metric.
#[derive(Debug, Clone)]
pub struct PodSeries {
    pub uid: String,
    pub pod_name: String,
    pub app: String,
    pub paas: String,
    pub namespace: String,
    /// Raw sample timestamps as epoch seconds.
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

/// Uniform timestamp grid `start, start+step, ..., <= end`.
pub fn sampling_grid(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
) -> Vec<DateTime<Utc>> {
    let mut grid = Vec::new();
    let mut current = start;
    while current <= end {
        grid.push(current);
        current += step;
    }
    grid
}

/// Resamples raw observations onto the desired grid by linear
/// interpolation, clamped at both ends. Grid timestamps are shifted by
/// one hour before matching: the telemetry store reports UTC+1-shifted
/// epoch seconds. The shift is a documented quirk of the source, not
/// negotiable.
pub fn interpolate_series(
    grid: &[DateTime<Utc>],
    raw_timestamps: &[f64],
    raw_values: &[f64],
) -> Result<Vec<f64>> {
    if grid.is_empty() {
        return Err(Error::Alignment("empty desired grid".to_string()));
    }
    if raw_timestamps.len() < 2 || raw_timestamps.len() != raw_values.len() {
        return Err(Error::Alignment(format!(
            "need at least 2 raw points to interpolate, got {}",
            raw_timestamps.len()
        )));
    }
    Ok(grid
        .iter()
        .map(|t| {
            let shifted = (*t + Duration::hours(1)).timestamp() as f64;
            piecewise_linear(shifted, raw_timestamps, raw_values)
        })
        .collect())
}

/// Accumulates raw series into typed pods aligned on one grid.
#[derive(Debug)]
pub struct TelemetryAligner {
    grid: Vec<DateTime<Utc>>,
    time_labels: Vec<String>,
    pods: BTreeMap<String, Pod>,
    order: Vec<String>,
}

impl TelemetryAligner {
    pub fn new(grid: Vec<DateTime<Utc>>) -> Self {
        let time_labels = grid
            .iter()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .collect();
        Self {
            grid,
            time_labels,
            pods: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds one metric series for one pod, aligning it to the grid when
    /// the raw series is shorter than the grid. A pod record is created
    /// on first sight, with its grid intensity resolved from the paas
    /// and the facility overhead set to the Azure value.
    pub fn ingest(&mut self, kind: ConsumptionKind, series: PodSeries) -> Result<()> {
        if !self.pods.contains_key(&series.uid) {
            self.order.push(series.uid.clone());
            let pod = Pod {
                base: Resource {
                    id: series.uid.clone(),
                    name: Some(series.pod_name.clone()),
                    time_points: self.time_labels.clone(),
                    ..Default::default()
                },
                compute: ComputeMetrics {
                    carbon_intensity: intensity::intensity_for_paas(&series.paas),
                    pue: PUE_AZURE,
                    ..Default::default()
                },
                app: series.app.clone(),
                paas: series.paas.clone(),
                namespace: series.namespace.clone(),
            };
            self.pods.insert(series.uid.clone(), pod);
        }

        let values = if series.timestamps.len() < self.grid.len() {
            interpolate_series(&self.grid, &series.timestamps, &series.values)?
        } else {
            // Already at (or above) grid resolution; keep the reported
            // values and trim to the grid length to hold the
            // series-length invariant.
            let mut values = series.values;
            values.truncate(self.grid.len());
            values
        };

        let pod = self.pods.get_mut(&series.uid).expect("pod inserted above");
        match kind {
            ConsumptionKind::CpuUtil => pod.compute.cpu_util = values,
            ConsumptionKind::RequestedCores => pod.compute.requested_cpu = values,
            ConsumptionKind::RequestedBytes => pod.compute.requested_memory = values,
            ConsumptionKind::StorageCapacity => pod.compute.storage_capacity = values,
        }
        Ok(())
    }

    /// Filters and groups the accumulated pods. Pods missing any of
    /// cpu_util, requested_cpu or requested_memory are dropped entirely
    /// (never zero-filled); an empty survivor set is a no-data
    /// condition, distinct from a computation failure.
    pub fn finish(self, group_by: GroupBy) -> Result<Vec<Application>> {
        let mut pods = self.pods;
        let complete: Vec<Pod> = self
            .order
            .iter()
            .filter_map(|uid| pods.remove(uid))
            .filter(|pod| {
                !pod.compute.requested_cpu.is_empty()
                    && !pod.compute.requested_memory.is_empty()
                    && !pod.compute.cpu_util.is_empty()
            })
            .collect();

        if complete.is_empty() {
            return Err(Error::NoData(
                "no pods found after filtering telemetry data".to_string(),
            ));
        }
        tracing::info!(pods = complete.len(), "pods remaining after filtering");

        let mut groups: Vec<(String, Vec<Pod>)> = Vec::new();
        for pod in complete {
            let key = match group_by {
                GroupBy::Application => pod.app.clone(),
                GroupBy::Cluster => pod.paas.clone(),
            };
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(pod),
                None => groups.push((key, vec![pod])),
            }
        }

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(idx, (key, members))| aggregate_group(idx, key, members, &self.time_labels))
            .collect())
    }
}

/// Builds one Application from its member pods: requested cpu/memory
/// are elementwise sums, utilization is the elementwise mean.
fn aggregate_group(
    idx: usize,
    key: String,
    pods: Vec<Pod>,
    time_labels: &[String],
) -> Application {
    let requested_cpu = elementwise_sum(pods.iter().map(|p| p.compute.requested_cpu.as_slice()));
    let requested_memory =
        elementwise_sum(pods.iter().map(|p| p.compute.requested_memory.as_slice()));
    let mut cpu_util = elementwise_sum(pods.iter().map(|p| p.compute.cpu_util.as_slice()));
    let count = pods.len() as f64;
    for value in &mut cpu_util {
        *value /= count;
    }
    let carbon_intensity = pods[0].compute.carbon_intensity;
    let pue = pods[0].compute.pue;

    Application {
        base: Resource {
            id: idx.to_string(),
            name: Some(key),
            time_points: time_labels.to_vec(),
            ..Default::default()
        },
        compute: ComputeMetrics {
            requested_cpu,
            requested_memory,
            cpu_util,
            carbon_intensity,
            pue,
            ..Default::default()
        },
        pods,
    }
}

fn elementwise_sum<'a>(series: impl Iterator<Item = &'a [f64]>) -> Vec<f64> {
    let mut total: Vec<f64> = Vec::new();
    for values in series {
        if total.is_empty() {
            total = values.to_vec();
        } else {
            for (slot, value) in total.iter_mut().zip(values) {
                *slot += value;
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grid3() -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        sampling_grid(start, start + Duration::hours(2), Duration::hours(1))
    }

    fn series(uid: &str, app: &str, paas: &str, ts: Vec<f64>, values: Vec<f64>) -> PodSeries {
        PodSeries {
            uid: uid.to_string(),
            pod_name: format!("{uid}-name"),
            app: app.to_string(),
            paas: paas.to_string(),
            namespace: "default".to_string(),
            timestamps: ts,
            values,
        }
    }

    fn full_ts(grid: &[DateTime<Utc>]) -> Vec<f64> {
        grid.iter()
            .map(|t| (*t + Duration::hours(1)).timestamp() as f64)
            .collect()
    }

    #[test]
    fn test_sampling_grid_is_inclusive() {
        let grid = grid3();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[2] - grid[0], Duration::hours(2));
    }

    #[test]
    fn test_interpolation_boundary() {
        // Raw samples at t0+1h and t2+1h line up with the shifted grid
        // endpoints, so the middle point is the midpoint value.
        let grid = grid3();
        let t0 = (grid[0] + Duration::hours(1)).timestamp() as f64;
        let t2 = (grid[2] + Duration::hours(1)).timestamp() as f64;
        let values = interpolate_series(&grid, &[t0, t2], &[1.0, 3.0]).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_interpolation_needs_two_points() {
        let grid = grid3();
        let err = interpolate_series(&grid, &[1.0], &[5.0]).unwrap_err();
        assert!(matches!(err, Error::Alignment(_)));
        let err = interpolate_series(&[], &[1.0, 2.0], &[5.0, 6.0]).unwrap_err();
        assert!(matches!(err, Error::Alignment(_)));
    }

    #[test]
    fn test_pod_missing_one_metric_is_dropped() {
        let grid = grid3();
        let ts = full_ts(&grid);
        let mut aligner = TelemetryAligner::new(grid);
        // pod-a has all three metrics, pod-b never reports memory.
        for (kind, values) in [
            (ConsumptionKind::CpuUtil, vec![0.3, 0.3, 0.3]),
            (ConsumptionKind::RequestedCores, vec![2.0, 2.0, 2.0]),
            (ConsumptionKind::RequestedBytes, vec![1e9, 1e9, 1e9]),
        ] {
            aligner
                .ingest(kind, series("pod-a", "shop", "gwc1", ts.clone(), values))
                .unwrap();
        }
        for (kind, values) in [
            (ConsumptionKind::CpuUtil, vec![0.6, 0.6, 0.6]),
            (ConsumptionKind::RequestedCores, vec![1.0, 1.0, 1.0]),
        ] {
            aligner
                .ingest(kind, series("pod-b", "shop", "gwc1", ts.clone(), values))
                .unwrap();
        }

        let apps = aligner.finish(GroupBy::Application).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].pods.len(), 1);
        assert_eq!(apps[0].pods[0].base.id, "pod-a");
    }

    #[test]
    fn test_all_pods_dropped_is_no_data() {
        let grid = grid3();
        let ts = full_ts(&grid);
        let mut aligner = TelemetryAligner::new(grid);
        aligner
            .ingest(
                ConsumptionKind::CpuUtil,
                series("pod-a", "shop", "gwc1", ts, vec![0.3, 0.3, 0.3]),
            )
            .unwrap();
        let err = aligner.finish(GroupBy::Application).unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
    }

    #[test]
    fn test_cluster_grouping_sums_and_means_per_paas() {
        let grid = grid3();
        let ts = full_ts(&grid);
        let mut aligner = TelemetryAligner::new(grid);
        let pods = [
            ("pod-1", "gwc1", 50.0, 0.3),
            ("pod-2", "gwc1", 50.0, 0.4),
            ("pod-3", "fc1", 0.0, 0.6),
        ];
        for (uid, paas, cores, util) in pods {
            aligner
                .ingest(
                    ConsumptionKind::CpuUtil,
                    series(uid, "shop", paas, ts.clone(), vec![util; 3]),
                )
                .unwrap();
            aligner
                .ingest(
                    ConsumptionKind::RequestedCores,
                    series(uid, "shop", paas, ts.clone(), vec![cores; 3]),
                )
                .unwrap();
            aligner
                .ingest(
                    ConsumptionKind::RequestedBytes,
                    series(uid, "shop", paas, ts.clone(), vec![1e9; 3]),
                )
                .unwrap();
        }

        let clusters = aligner.finish(GroupBy::Cluster).unwrap();
        assert_eq!(clusters.len(), 2);
        let gwc = clusters.iter().find(|c| c.base.name.as_deref() == Some("gwc1")).unwrap();
        // Pods sharing a paas average only among themselves.
        assert_eq!(gwc.compute.requested_cpu[0], 100.0);
        assert!((gwc.compute.cpu_util[0] - 0.35).abs() < 1e-12);
        let fc = clusters.iter().find(|c| c.base.name.as_deref() == Some("fc1")).unwrap();
        assert_eq!(fc.compute.requested_cpu[0], 0.0);
        assert!((fc.compute.cpu_util[0] - 0.6).abs() < 1e-12);
        // Carbon intensity comes from the paas zone code.
        assert_eq!(fc.compute.carbon_intensity, 44.0);
    }

    #[test]
    fn test_application_grouping_by_app_key() {
        let grid = grid3();
        let ts = full_ts(&grid);
        let mut aligner = TelemetryAligner::new(grid);
        for (uid, app) in [("pod-1", "shop"), ("pod-2", "billing")] {
            for kind in [
                ConsumptionKind::CpuUtil,
                ConsumptionKind::RequestedCores,
                ConsumptionKind::RequestedBytes,
            ] {
                aligner
                    .ingest(kind, series(uid, app, "gwc1", ts.clone(), vec![1.0; 3]))
                    .unwrap();
            }
        }
        let apps = aligner.finish(GroupBy::Application).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].base.id, "0");
        assert_eq!(apps[0].base.name.as_deref(), Some("shop"));
    }
}

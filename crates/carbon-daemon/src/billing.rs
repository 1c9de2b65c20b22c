//! Billing export ingestion
//!
//! Reads Azure billing CSV exports into typed resources. VM exports
//! carry one row per machine per sample; storage exports carry one row
//! per billed meter, where only disk-shaped meters translate into a
//! storage resource. Everything else (operations, snapshots, network
//! transfers) is excluded from the inventory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;

use carbon_core::constants::PUE_AZURE;
use carbon_core::intensity;
use carbon_core::models::{
    ReplicationType, Resource, StorageMetrics, StorageResource, StorageType, VirtualMachine,
};

use crate::config::DaemonConfig;

/// GiB to GB.
const GIB_TO_GB: f64 = 1.07374182;

/// Azure managed-disk SKU sizes in GiB: premium SSD (P), standard SSD
/// (E) and standard HDD (S) series.
const DISK_SKU_SIZE_GIB: &[(&str, f64)] = &[
    ("P1", 4.0),
    ("P2", 8.0),
    ("P3", 16.0),
    ("P4", 32.0),
    ("P6", 64.0),
    ("P10", 128.0),
    ("P15", 256.0),
    ("P20", 512.0),
    ("P30", 1024.0),
    ("P40", 2048.0),
    ("P50", 4096.0),
    ("P60", 8192.0),
    ("P70", 16384.0),
    ("P80", 32767.0),
    ("E1", 4.0),
    ("E2", 8.0),
    ("E3", 16.0),
    ("E4", 32.0),
    ("E6", 64.0),
    ("E10", 128.0),
    ("E15", 256.0),
    ("E20", 512.0),
    ("E30", 1024.0),
    ("E40", 2048.0),
    ("E50", 4096.0),
    ("E60", 8192.0),
    ("E70", 16384.0),
    ("E80", 32767.0),
    ("S4", 32.0),
    ("S6", 64.0),
    ("S10", 128.0),
    ("S15", 256.0),
    ("S20", 512.0),
    ("S30", 1024.0),
    ("S40", 2048.0),
    ("S50", 4096.0),
    ("S60", 8192.0),
    ("S70", 16384.0),
    ("S80", 32767.0),
];

/// Largest Azure managed disk, in GB. Bigger figures point at a parsing
/// problem in the export.
const MAX_DISK_SIZE_GB: f64 = 32767.0;

#[derive(Debug, Deserialize)]
struct VmRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Size")]
    size: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Region", default)]
    region: String,
    #[serde(rename = "Instance", default)]
    instance: String,
    #[serde(rename = "Environment", default)]
    environment: String,
    #[serde(rename = "Partition", default)]
    partition: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "Component", default)]
    component: String,
    #[serde(rename = "Subscription", default)]
    subscription: String,
    #[serde(rename = "AverageCpuPercentage", default)]
    average_cpu_percentage: String,
    #[serde(rename = "Time", default)]
    time: String,
    #[serde(rename = "DiskSizeGb", default)]
    disk_size_gb: String,
}

#[derive(Debug, Deserialize)]
struct StorageRow {
    #[serde(rename = "LineNumber", default)]
    line_number: String,
    #[serde(rename = "UnitOfMeasure", default)]
    unit_of_measure: String,
    #[serde(rename = "Quantity", default)]
    quantity: String,
    #[serde(rename = "ProductName", default)]
    product_name: String,
    #[serde(rename = "MeterName", default)]
    meter_name: String,
    #[serde(rename = "ResourceLocation", default)]
    resource_location: String,
    #[serde(rename = "SubscriptionId", default)]
    subscription_id: String,
    #[serde(rename = "ResourceGroup", default)]
    resource_group: String,
    #[serde(rename = "Date", default)]
    date: String,
    #[serde(rename = "BillingPeriodStartDate", default)]
    billing_start: String,
    #[serde(rename = "BillingPeriodEndDate", default)]
    billing_end: String,
}

/// Billing exports encode absent values as a dash.
fn dash_to_empty(value: &str) -> Option<String> {
    match value.trim() {
        "" | "-" => None,
        other => Some(other.to_string()),
    }
}

fn parse_float(value: &str) -> f64 {
    value.trim().parse().unwrap_or(0.0)
}

/// Reads a VM billing export, merging rows with the same `Id` into one
/// machine with one time point per row. Returns the machines in
/// first-seen order.
pub fn read_vms(path: impl AsRef<Path>, config: &DaemonConfig) -> Result<Vec<VirtualMachine>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open VM billing export {}", path.display()))?;

    let mut vms: Vec<VirtualMachine> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut missing_regions: HashMap<String, usize> = HashMap::new();

    for row in reader.deserialize::<VmRow>() {
        let row = row.with_context(|| format!("malformed VM row in {}", path.display()))?;
        let slot = match index.get(&row.id) {
            Some(slot) => *slot,
            None => {
                let region = dash_to_empty(&row.region)
                    .unwrap_or_else(|| config.default_region.clone());
                if !intensity::is_known_region(&region) {
                    *missing_regions.entry(region.clone()).or_insert(0) += 1;
                }
                vms.push(new_vm(&row, &region));
                index.insert(row.id.clone(), vms.len() - 1);
                vms.len() - 1
            }
        };
        let vm = &mut vms[slot];
        vm.compute
            .cpu_util
            .push(parse_float(&row.average_cpu_percentage) / 100.0);
        vm.base.time_points.push(row.time.clone());
        vm.storage_size.push(parse_float(&row.disk_size_gb));
    }

    for (region, count) in &missing_regions {
        tracing::warn!(
            region = %region,
            vms = count,
            "unknown region, using the European average carbon intensity"
        );
    }
    tracing::info!(vms = vms.len(), "VM billing export read");
    Ok(vms)
}

fn new_vm(row: &VmRow, region: &str) -> VirtualMachine {
    let mut vm = VirtualMachine {
        base: Resource {
            id: row.id.clone(),
            name: dash_to_empty(&row.name),
            ..Default::default()
        },
        vm_size: dash_to_empty(&row.size),
        region: Some(region.to_string()),
        instance: dash_to_empty(&row.instance),
        environment: dash_to_empty(&row.environment),
        partition: dash_to_empty(&row.partition),
        service: dash_to_empty(&row.service),
        component: dash_to_empty(&row.component),
        subscription: dash_to_empty(&row.subscription),
        ..Default::default()
    };
    vm.compute.carbon_intensity = intensity::intensity_for_region(region);
    vm.compute.pue = PUE_AZURE;
    vm
}

/// Reads a storage billing export into the disk inventory, in
/// first-seen `LineNumber` order.
pub fn read_storage(path: impl AsRef<Path>) -> Result<Vec<StorageResource>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open storage billing export {}", path.display()))?;
    let rows: Vec<StorageRow> = reader
        .deserialize()
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("malformed storage row in {}", path.display()))?;

    let billing_days = billing_period_days(&rows);
    let mut resources: Vec<StorageResource> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut excluded = 0usize;

    for row in &rows {
        let (size_gb, duration_seconds) = disk_size_and_duration(row, billing_days);
        if size_gb <= 0.0 || duration_seconds == 0 {
            excluded += 1;
            continue;
        }
        let Some(id) = dash_to_empty(&row.line_number) else {
            tracing::error!(product = %row.product_name, "storage row without line number");
            continue;
        };
        if size_gb > MAX_DISK_SIZE_GB {
            tracing::warn!(id = %id, size_gb, "unusually large disk");
        }
        let region = dash_to_empty(&row.resource_location);
        if region.is_none() {
            tracing::warn!(id = %id, "storage row without region");
        }

        let slot = match index.get(&id) {
            Some(slot) => *slot,
            None => {
                resources.push(StorageResource {
                    base: Resource {
                        id: id.clone(),
                        name: Some(row.product_name.clone()),
                        ..Default::default()
                    },
                    storage: StorageMetrics::default(),
                    storage_type: storage_type(&row.product_name),
                    replication_type: Some(replication_type(&row.product_name, &row.meter_name)),
                    size_gb,
                    carbon_intensity: intensity::intensity_for_region(
                        region.as_deref().unwrap_or(""),
                    ),
                    region,
                    subscription: dash_to_empty(&row.subscription_id),
                    resource_group: dash_to_empty(&row.resource_group),
                    duration_seconds,
                });
                index.insert(id.clone(), resources.len() - 1);
                resources.len() - 1
            }
        };
        let timestamp = dash_to_empty(&row.date)
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
        resources[slot].base.time_points.push(timestamp);
    }

    tracing::info!(
        disks = resources.len(),
        excluded,
        billing_days,
        "storage billing export read"
    );
    Ok(resources)
}

/// Number of days covered by the export, from the first row carrying
/// both billing period dates in M/D/YYYY format. Both ends count.
fn billing_period_days(rows: &[StorageRow]) -> i64 {
    for row in rows {
        if row.billing_start.is_empty() || row.billing_end.is_empty() {
            continue;
        }
        let parsed = NaiveDate::parse_from_str(&row.billing_start, "%m/%d/%Y")
            .and_then(|start| {
                NaiveDate::parse_from_str(&row.billing_end, "%m/%d/%Y")
                    .map(|end| (end - start).num_days() + 1)
            });
        match parsed {
            Ok(days) => return days,
            Err(e) => {
                tracing::warn!(
                    start = %row.billing_start,
                    end = %row.billing_end,
                    error = %e,
                    "cannot parse billing period dates"
                );
            }
        }
    }
    tracing::warn!("cannot determine billing period, defaulting to 30 days");
    30
}

/// Translates a billed meter into a disk size and the duration its
/// quantity covers, following the UnitOfMeasure of the row. Meters that
/// are not disks (operations, snapshots, transfers) come back as zero
/// and are excluded upstream.
fn disk_size_and_duration(row: &StorageRow, billing_days: i64) -> (f64, u64) {
    let quantity = parse_float(&row.quantity);
    match row.unit_of_measure.as_str() {
        // Premium SSD v2 and dynamic disks: quantity is GiB-hours/day.
        "1 GiB/Hour" => ((quantity / 24.0) * GIB_TO_GB, 86_400),
        // Classic SKU disks: quantity counts disk-months.
        "1/Month" => {
            let sku_size = sku_size_gib(&row.product_name);
            if sku_size > 0.0 {
                let duration = (billing_days as f64 * quantity * 86_400.0).round() as u64;
                (sku_size, duration)
            } else {
                tracing::warn!(product = %row.product_name, "no SKU size found for 1/Month meter");
                (0.0, 0)
            }
        }
        // Snapshots would need lower coefficients, excluded for now.
        "1 GB/Month" => (0.0, 0),
        // Performance options, operations, transfers.
        "1" | "1/Hour" | "100" | "10K" | "10K/Month" | "1 GB" | "1M" => (0.0, 0),
        other => {
            tracing::warn!(unit = %other, product = %row.product_name, "unknown UnitOfMeasure");
            (0.0, 0)
        }
    }
}

/// Looks up the SKU embedded in a product name, e.g.
/// "Premium SSD Managed Disks - P15 LRS - EU West" resolves P15.
fn sku_size_gib(product_name: &str) -> f64 {
    static SKU_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = SKU_PATTERN.get_or_init(|| Regex::new(r"\b([PES]\d+)\b").expect("valid regex"));
    for capture in pattern.captures_iter(&product_name.to_uppercase()) {
        let sku = &capture[1];
        if let Some((_, size)) = DISK_SKU_SIZE_GIB.iter().find(|(name, _)| *name == sku) {
            return *size;
        }
    }
    0.0
}

fn storage_type(product_name: &str) -> StorageType {
    let product_name = product_name.to_lowercase();
    if product_name.contains("ssd")
        || product_name.contains("ultra disk")
        || product_name.contains("premium page blob")
    {
        StorageType::Ssd
    } else if product_name.contains("hdd") {
        StorageType::Hdd
    } else {
        tracing::warn!(product = %product_name, "unknown disk type");
        StorageType::Unknown
    }
}

/// The longest replication token wins: RA-GZRS must be recognized
/// before GZRS, which must be recognized before ZRS.
fn replication_type(product_name: &str, meter_name: &str) -> ReplicationType {
    let text = format!("{} {}", product_name.to_uppercase(), meter_name.to_uppercase());
    if text.contains("RA-GZRS") || text.contains("RAGZRS") {
        ReplicationType::RaGzrs
    } else if text.contains("GZRS") {
        ReplicationType::Gzrs
    } else if text.contains("RA-GRS") || text.contains("RAGRS") {
        ReplicationType::RaGrs
    } else if text.contains("GRS") {
        ReplicationType::Grs
    } else if text.contains("ZRS") {
        ReplicationType::Zrs
    } else {
        ReplicationType::Lrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn storage_row(unit: &str, quantity: &str, product: &str) -> StorageRow {
        StorageRow {
            line_number: "1".to_string(),
            unit_of_measure: unit.to_string(),
            quantity: quantity.to_string(),
            product_name: product.to_string(),
            meter_name: String::new(),
            resource_location: "westeurope".to_string(),
            subscription_id: String::new(),
            resource_group: String::new(),
            date: "2025-04-01".to_string(),
            billing_start: "4/1/2025".to_string(),
            billing_end: "4/30/2025".to_string(),
        }
    }

    #[test]
    fn test_billing_period_days_inclusive() {
        let rows = vec![storage_row("1/Month", "1", "disk")];
        assert_eq!(billing_period_days(&rows), 30);
        let mut february = storage_row("1/Month", "1", "disk");
        february.billing_start = "2/1/2025".to_string();
        february.billing_end = "2/28/2025".to_string();
        assert_eq!(billing_period_days(&[february]), 28);
    }

    #[test]
    fn test_billing_period_defaults_without_dates() {
        let mut row = storage_row("1/Month", "1", "disk");
        row.billing_start = String::new();
        row.billing_end = String::new();
        assert_eq!(billing_period_days(&[row]), 30);
    }

    #[test]
    fn test_gib_hour_meters() {
        let row = storage_row("1 GiB/Hour", "2400", "Premium SSD v2");
        let (size, duration) = disk_size_and_duration(&row, 30);
        assert!((size - 100.0 * GIB_TO_GB).abs() < 1e-9);
        assert_eq!(duration, 86_400);
    }

    #[test]
    fn test_monthly_sku_meters() {
        let row = storage_row("1/Month", "2", "Premium SSD Managed Disks - P15 LRS - EU West");
        let (size, duration) = disk_size_and_duration(&row, 30);
        assert_eq!(size, 256.0);
        assert_eq!(duration, 2 * 30 * 86_400);
    }

    #[test]
    fn test_monthly_meter_without_sku_is_excluded() {
        let row = storage_row("1/Month", "1", "Some Blob Feature");
        assert_eq!(disk_size_and_duration(&row, 30), (0.0, 0));
    }

    #[test]
    fn test_operation_meters_are_excluded() {
        for unit in ["1 GB/Month", "1", "1/Hour", "100", "10K", "10K/Month", "1 GB", "1M"] {
            let row = storage_row(unit, "50", "Standard HDD Managed Disks");
            assert_eq!(disk_size_and_duration(&row, 30), (0.0, 0), "unit {unit}");
        }
    }

    #[test]
    fn test_sku_extraction() {
        assert_eq!(sku_size_gib("Standard HDD Managed Disks - S4 - LRS - Disk"), 32.0);
        assert_eq!(sku_size_gib("Standard SSD - E10 ZRS"), 128.0);
        assert_eq!(sku_size_gib("no sku here"), 0.0);
        // A stray token that is not a SKU does not shadow the real one.
        assert_eq!(sku_size_gib("P999 then P30 LRS"), 1024.0);
    }

    #[test]
    fn test_storage_type_keywords() {
        assert_eq!(storage_type("Premium SSD Managed Disks"), StorageType::Ssd);
        assert_eq!(storage_type("Ultra Disk Provisioned"), StorageType::Ssd);
        assert_eq!(storage_type("Standard HDD Managed Disks"), StorageType::Hdd);
        assert_eq!(storage_type("Tiered Block Blob"), StorageType::Unknown);
    }

    #[test]
    fn test_replication_precedence() {
        assert_eq!(replication_type("Disk RA-GZRS", ""), ReplicationType::RaGzrs);
        assert_eq!(replication_type("Disk GZRS", ""), ReplicationType::Gzrs);
        assert_eq!(replication_type("", "Data Stored RAGRS"), ReplicationType::RaGrs);
        assert_eq!(replication_type("Disk GRS", ""), ReplicationType::Grs);
        assert_eq!(replication_type("Disk ZRS", ""), ReplicationType::Zrs);
        assert_eq!(replication_type("plain disk", ""), ReplicationType::Lrs);
    }

    #[test]
    fn test_read_vms_merges_rows_by_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Id,Size,Name,Region,Instance,Environment,Partition,Service,Component,Subscription,AverageCpuPercentage,Time,DiskSizeGb"
        )
        .unwrap();
        writeln!(file, "vm-1,Standard_D4s_v3,web-0,westeurope,-,-,-,-,-,-,42,2024-05-01 12:00,128").unwrap();
        writeln!(file, "vm-1,Standard_D4s_v3,web-0,westeurope,-,-,-,-,-,-,58,2024-05-01 13:00,128").unwrap();
        writeln!(file, "vm-2,Standard_B2s,db-0,-,-,-,-,-,-,-,10,2024-05-01 12:00,64").unwrap();

        let config = DaemonConfig::default();
        let vms = read_vms(file.path(), &config).unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].base.id, "vm-1");
        assert_eq!(vms[0].compute.cpu_util, vec![0.42, 0.58]);
        assert_eq!(vms[0].base.time_points.len(), 2);
        assert_eq!(vms[0].compute.carbon_intensity, 253.0);
        assert_eq!(vms[0].compute.pue, PUE_AZURE);
        // A dashed region falls back to the configured default.
        assert_eq!(vms[1].region.as_deref(), Some("germanywestcentral"));
        assert_eq!(vms[1].compute.carbon_intensity, 344.0);
        assert_eq!(vms[1].service, None);
    }

    #[test]
    fn test_read_storage_groups_by_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "LineNumber,UnitOfMeasure,Quantity,ProductName,MeterName,ResourceLocation,SubscriptionId,ResourceGroup,Date,BillingPeriodStartDate,BillingPeriodEndDate"
        )
        .unwrap();
        writeln!(
            file,
            "7,1/Month,1,Premium SSD Managed Disks - P15 LRS,P15 Disks,westeurope,sub-1,rg-1,2025-04-01,4/1/2025,4/30/2025"
        )
        .unwrap();
        writeln!(
            file,
            "8,10K,500,Blob Write Operations,Write Operations,westeurope,sub-1,rg-1,2025-04-01,4/1/2025,4/30/2025"
        )
        .unwrap();

        let disks = read_storage(file.path()).unwrap();
        assert_eq!(disks.len(), 1);
        let disk = &disks[0];
        assert_eq!(disk.base.id, "7");
        assert_eq!(disk.size_gb, 256.0);
        assert_eq!(disk.storage_type, StorageType::Ssd);
        assert_eq!(disk.replication_type, Some(ReplicationType::Lrs));
        assert_eq!(disk.duration_seconds, 30 * 86_400);
        assert_eq!(disk.carbon_intensity, 253.0);
        assert_eq!(disk.base.time_points, vec!["2025-04-01".to_string()]);
    }
}

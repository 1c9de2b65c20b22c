//! Carbon daemon - infrastructure emission reports
//!
//! This binary reads billing exports, runs the carbon computation
//! pipelines over them, and writes emission reports as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use carbon_core::catalog::InstanceCatalog;
use carbon_core::evaluate::ReferenceEvaluator;
use carbon_core::pipeline::{StoragePipeline, VmPipeline};

mod billing;
mod config;
mod report;

/// Carbon emission daemon
#[derive(Parser)]
#[command(name = "carbon-daemon")]
#[command(author, version, about = "Computes carbon emission reports from billing exports", long_about = None)]
struct Cli {
    /// Directory where reports are written (overrides CARBON_OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a virtual machine billing export
    Vms {
        /// Path to the VM billing CSV
        billing: PathBuf,

        /// Instance-type hardware catalog CSV (overrides CARBON_CATALOG_PATH)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Evaluate a storage billing export
    Storage {
        /// Path to the storage billing CSV
        billing: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let mut config = config::DaemonConfig::load()?;
    if let Some(output_dir) = &cli.output_dir {
        config.output_dir = output_dir.display().to_string();
    }
    info!(output_dir = %config.output_dir, "carbon daemon starting");
    let started = std::time::Instant::now();

    match cli.command {
        Commands::Vms { billing, catalog } => {
            let catalog_path = catalog
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| config.catalog_path.clone());
            let catalog = InstanceCatalog::from_csv_path(&catalog_path)?;
            let vms = billing::read_vms(&billing, &config)?;
            let pipeline = VmPipeline::new(
                config.vm_duration_secs,
                Arc::new(ReferenceEvaluator::with_catalog(catalog)),
            );
            let vms = pipeline.run(vms).await?;
            report::write_vm_report(&config.output_dir, &vms)?;
        }
        Commands::Storage { billing } => {
            let resources = billing::read_storage(&billing)?;
            let pipeline = StoragePipeline::new(Arc::new(ReferenceEvaluator::new()));
            let resources = pipeline.run(resources).await?;
            report::write_storage_report(&config.output_dir, &resources)?;
        }
    }

    info!(elapsed_secs = started.elapsed().as_secs_f64(), "carbon daemon finished");
    Ok(())
}

//! Daemon configuration

use anyhow::Result;
use serde::Deserialize;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Path to the instance-type hardware catalog CSV
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Directory where emission reports are written
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Sampling period assumed between VM billing rows, in seconds
    #[serde(default = "default_vm_duration")]
    pub vm_duration_secs: u64,

    /// Region assumed for rows whose region column is empty
    #[serde(default = "default_region")]
    pub default_region: String,
}

fn default_catalog_path() -> String {
    "data/azure-instances.csv".to_string()
}

fn default_output_dir() -> String {
    "reports".to_string()
}

fn default_vm_duration() -> u64 {
    3600
}

fn default_region() -> String {
    "germanywestcentral".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            output_dir: default_output_dir(),
            vm_duration_secs: default_vm_duration(),
            default_region: default_region(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CARBON"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.vm_duration_secs, 3600);
        assert_eq!(config.default_region, "germanywestcentral");
    }
}

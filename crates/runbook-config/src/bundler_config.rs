use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::paths::default_output_dir;
use super::scripts_config::Profile;

/// How many bundles go into one compiler call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackingGranularity {
    /// One compiler call per bundle; bundles fail independently
    PerBundle,
    /// Every bundle packed by a single compiler call
    Single,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Directory receiving packed bundles (default: ~/.cache/runbook/bundles)
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    /// Packing granularity; when unset it follows the validation profile
    #[serde(default)]
    pub packing: Option<PackingGranularity>,
}

impl BundlerConfig {
    /// Get the output directory (use provided or default)
    pub fn output_path(&self) -> PathBuf {
        self.output_path.clone().unwrap_or_else(default_output_dir)
    }

    /// Packing granularity, falling back to the profile's default:
    /// client scripts are packed per bundle, server scripts in one call
    pub fn packing(&self, profile: Profile) -> PackingGranularity {
        self.packing.unwrap_or(match profile {
            Profile::Client => PackingGranularity::PerBundle,
            Profile::Server => PackingGranularity::Single,
        })
    }
}

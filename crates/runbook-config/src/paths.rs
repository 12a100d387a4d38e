use directories::ProjectDirs;
use std::path::PathBuf;

/// Application name used for every default directory
pub const APP_NAME: &str = "runbook";

/// Platform-specific default locations for config, script sources and packed bundles.
///
/// Resolution is delegated to `directories`, which follows the XDG Base Directory
/// spec on Linux and the platform conventions on macOS and Windows.
pub struct ProjectPaths {
    dirs: ProjectDirs,
}

impl ProjectPaths {
    /// Resolve paths for the given application name.
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn new(name: &str) -> Option<Self> {
        ProjectDirs::from("", "", name).map(|dirs| Self { dirs })
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        self.dirs.data_dir().to_path_buf()
    }

    /// Get the cache directory path.
    pub fn cache_dir(&self) -> PathBuf {
        self.dirs.cache_dir().to_path_buf()
    }
}

/// Default directory scanned for script manifests
pub fn default_scripts_dir() -> PathBuf {
    ProjectPaths::new(APP_NAME)
        .map(|p| p.data_dir().join("scripts"))
        .unwrap_or_else(|| PathBuf::from(".scripts"))
}

/// Default directory receiving packed bundles
pub fn default_output_dir() -> PathBuf {
    ProjectPaths::new(APP_NAME)
        .map(|p| p.cache_dir().join("bundles"))
        .unwrap_or_else(|| PathBuf::from(".bundles"))
}

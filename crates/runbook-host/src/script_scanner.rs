//! Script source discovery and change detection
//!
//! The scanner walks the script directories recursively, records the
//! modification time of every file with a script extension, and compares
//! successive scans to report added, changed and removed sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::reload::{ChangeEvent, ChangeSource};

/// Default scan interval (1000ms = 1Hz)
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

/// Result of scanning for script changes
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Scripts that were modified (path and new modification time)
    pub changed: Vec<(PathBuf, SystemTime)>,
    /// Scripts that were added to the directory
    pub added: Vec<PathBuf>,
    /// Scripts that were removed from the directory
    pub removed: Vec<PathBuf>,
}

impl ScanResult {
    /// Returns true if there are any changes detected
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Every path the scan reported
    pub fn paths(&self) -> Vec<PathBuf> {
        self.added
            .iter()
            .chain(self.changed.iter().map(|(p, _)| p))
            .chain(self.removed.iter())
            .cloned()
            .collect()
    }
}

/// Scanner for detecting script file changes
pub struct ScriptScanner {
    /// Directories to scan for scripts
    dirs: Vec<PathBuf>,
    /// Extensions treated as script sources
    extensions: Vec<String>,
    /// Time between scans
    scan_interval: Duration,
    /// Cached state from last scan: path -> modification time
    cached_state: HashMap<PathBuf, SystemTime>,
}

impl ScriptScanner {
    /// Create a new scanner with the default scan interval
    pub fn new(dirs: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self::with_interval(dirs, extensions, DEFAULT_SCAN_INTERVAL)
    }

    /// Create a new scanner with a custom scan interval
    ///
    /// The cache is pre-populated with the files present now, so the first
    /// scan only reports what changed after construction.
    pub fn with_interval(
        dirs: Vec<PathBuf>,
        extensions: Vec<String>,
        scan_interval: Duration,
    ) -> Self {
        let cached_state = scan_dirs(&dirs, &extensions);

        Self {
            dirs,
            extensions,
            scan_interval,
            cached_state,
        }
    }

    /// Scan the script directories for changes and update the cache
    pub fn scan_changes(&mut self) -> ScanResult {
        let current_state = scan_dirs(&self.dirs, &self.extensions);
        let mut result = ScanResult::default();

        for (path, modified_time) in &current_state {
            match self.cached_state.get(path) {
                Some(cached_time) if cached_time != modified_time => {
                    debug!(target: "scripting", "Script changed: {}", path.display());
                    result.changed.push((path.clone(), *modified_time));
                }
                Some(_) => {}
                None => {
                    debug!(target: "scripting", "Script added: {}", path.display());
                    result.added.push(path.clone());
                }
            }
        }

        for path in self.cached_state.keys() {
            if !current_state.contains_key(path) {
                debug!(target: "scripting", "Script removed: {}", path.display());
                result.removed.push(path.clone());
            }
        }

        self.cached_state = current_state;
        result
    }

    /// Get the scan interval
    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Turn the scanner into a change source that scans on a fixed interval
    pub fn into_source(mut self) -> ChangeSource {
        let source = ChangeSource::new();
        let tx = source.sender();
        let interval = self.scan_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = self.scan_changes();
                if result.has_changes() && tx.send(ChangeEvent::Files(result.paths())).is_err() {
                    break;
                }
            }
        });

        source.with_task(handle)
    }
}

/// Collect script files and their modification times from several directories
pub fn scan_dirs(dirs: &[PathBuf], extensions: &[String]) -> HashMap<PathBuf, SystemTime> {
    let mut scripts = HashMap::new();
    for dir in dirs {
        scan_dir(dir, extensions, &mut scripts);
    }
    scripts
}

fn scan_dir(dir: &Path, extensions: &[String], scripts: &mut HashMap<PathBuf, SystemTime>) {
    if !dir.exists() {
        debug!(
            target: "scripting",
            "Script directory does not exist: {}",
            dir.display()
        );
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                target: "scripting",
                "Failed to read script directory {}: {}",
                dir.display(),
                e
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    target: "scripting",
                    "Failed to read metadata for {}: {}",
                    path.display(),
                    e
                );
                continue;
            }
        };

        if metadata.is_dir() {
            scan_dir(&path, extensions, scripts);
            continue;
        }

        if !has_extension(&path, extensions) {
            continue;
        }

        match metadata.modified() {
            Ok(modified_time) => {
                scripts.insert(path, modified_time);
            }
            Err(e) => {
                tracing::warn!(
                    target: "scripting",
                    "Failed to get modification time for {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

/// Whether the path ends in one of the extensions
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn toml_ext() -> Vec<String> {
        vec!["toml".to_string()]
    }

    #[test]
    fn test_scanner_creation() {
        let dir = PathBuf::from("/tmp/runbook_scanner_test");
        let scanner = ScriptScanner::new(vec![dir], toml_ext());

        assert_eq!(scanner.scan_interval(), DEFAULT_SCAN_INTERVAL);
    }

    #[test]
    fn test_detect_new_script_in_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        let mut scanner = ScriptScanner::new(vec![temp_dir.path().to_path_buf()], toml_ext());

        let result = scanner.scan_changes();
        assert!(!result.has_changes());

        let bundle_dir = temp_dir.path().join("crm").join("leads");
        fs::create_dir_all(&bundle_dir).unwrap();
        let script_path = bundle_dir.join("sync.toml");
        let mut file = File::create(&script_path).unwrap();
        file.write_all(b"name = \"sync\"").unwrap();

        let result = scanner.scan_changes();
        assert_eq!(result.added, vec![script_path.clone()]);
        assert!(result.changed.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(result.paths(), vec![script_path]);
    }

    #[test]
    fn test_detect_modified_script() {
        let temp_dir = TempDir::new().unwrap();
        let script_path = temp_dir.path().join("test.toml");
        fs::write(&script_path, b"initial content").unwrap();

        let mut scanner = ScriptScanner::new(vec![temp_dir.path().to_path_buf()], toml_ext());
        scanner.scan_changes();

        // Ensure a different timestamp
        let later = SystemTime::now() + Duration::from_secs(5);
        File::options()
            .write(true)
            .open(&script_path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let result = scanner.scan_changes();
        assert_eq!(result.changed.len(), 1);
        assert_eq!(result.changed[0].0, script_path);
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_detect_removed_script() {
        let temp_dir = TempDir::new().unwrap();
        let script_path = temp_dir.path().join("test.toml");
        File::create(&script_path).unwrap();

        let mut scanner = ScriptScanner::new(vec![temp_dir.path().to_path_buf()], toml_ext());
        scanner.scan_changes();

        fs::remove_file(&script_path).unwrap();

        let result = scanner.scan_changes();
        assert_eq!(result.removed, vec![script_path]);
        assert!(result.changed.is_empty());
        assert!(result.added.is_empty());
    }

    #[test]
    fn test_only_scans_matching_extensions() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("script1.toml")).unwrap();
        File::create(temp_dir.path().join("notes.txt")).unwrap();
        File::create(temp_dir.path().join("run.sh")).unwrap();

        let found = scan_dirs(&[temp_dir.path().to_path_buf()], &toml_ext());

        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&temp_dir.path().join("script1.toml")));
    }

    #[test]
    fn test_handles_missing_directory() {
        let missing_dir = PathBuf::from("/tmp/runbook_this_does_not_exist_12345");
        assert!(scan_dirs(&[missing_dir.clone()], &toml_ext()).is_empty());

        let mut scanner = ScriptScanner::new(vec![missing_dir], toml_ext());
        let result = scanner.scan_changes();
        assert!(!result.has_changes());
    }
}

//! Change sources backed by the filesystem

use notify::{EventKind, RecursiveMode, Watcher};
use runbook_config::{ReloadConfig, WatchMode};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::reload::{ChangeEvent, ChangeSource};
use crate::script_scanner::{has_extension, ScriptScanner};

/// Recursive filesystem watch on every path, reporting files with a matching
/// extension
///
/// Paths that do not exist are skipped with a warning.
pub fn notify_source(
    paths: &[PathBuf],
    extensions: &[String],
) -> Result<ChangeSource, notify::Error> {
    let source = ChangeSource::new();
    let tx = source.sender();
    let extensions = extensions.to_vec();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(target: "scripting", "File watch error: {}", e);
                return;
            }
        };

        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }

        let paths: Vec<PathBuf> = event
            .paths
            .into_iter()
            .filter(|p| has_extension(p, &extensions))
            .collect();

        if !paths.is_empty() {
            // Receiver gone means the source was dropped
            let _ = tx.send(ChangeEvent::Files(paths));
        }
    })?;

    for path in paths {
        if !path.exists() {
            warn!(
                target: "scripting",
                "Not watching missing script directory: {}",
                path.display()
            );
            continue;
        }
        watcher.watch(path, RecursiveMode::Recursive)?;
        debug!(target: "scripting", "Watching {}", path.display());
    }

    Ok(source.with_watcher(watcher))
}

/// Change source for the configured watch mode, with SIGHUP forwarding when enabled
pub fn change_source(
    config: &ReloadConfig,
    paths: &[PathBuf],
    extensions: &[String],
) -> Result<ChangeSource, notify::Error> {
    let source = match config.mode {
        WatchMode::Notify => notify_source(paths, extensions)?,
        WatchMode::Poll => ScriptScanner::with_interval(
            paths.to_vec(),
            extensions.to_vec(),
            config.poll_interval(),
        )
        .into_source(),
    };

    Ok(if config.signal {
        source.with_reload_signal()
    } else {
        source
    })
}

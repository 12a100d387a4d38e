use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::filter::{make_filter, ListFilter};
use crate::script::Script;

/// Immutable script set visible to readers at one point in time
#[derive(Debug, Default)]
pub struct Snapshot {
    scripts: Vec<Script>,
    last_updated: DateTime<Utc>,
}

impl Snapshot {
    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    /// Most recent modification time seen by the registry
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// First script with the given name
    pub fn get(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name == name)
    }

    /// Scripts matching the filter, in snapshot order
    pub fn list(&self, filter: &ListFilter) -> Vec<Script> {
        let predicate = make_filter(filter);
        self.scripts.iter().filter(|s| predicate(s)).cloned().collect()
    }
}

/// Latest modification time across a set, or the Unix epoch when none is known
pub fn derive_last_updated(scripts: &[Script]) -> DateTime<Utc> {
    scripts
        .iter()
        .filter_map(|s| s.updated_at)
        .max()
        .unwrap_or_default()
}

/// Holds the current snapshot
///
/// Readers load the snapshot pointer without locking. Writers are serialized
/// and swap in a complete replacement, so a reader sees either the old set or
/// the new one.
#[derive(Default)]
pub struct ScriptRegistry {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole script set
    pub fn update(&self, scripts: Vec<Script>) {
        let _guard = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let previous = self.current.load();
        // Never move backwards, e.g. when a reload drops the newest script
        let last_updated = derive_last_updated(&scripts).max(previous.last_updated);

        debug!(
            target: "scripting",
            "Swapping registry snapshot: {} -> {} script(s)",
            previous.len(),
            scripts.len()
        );

        self.current.store(Arc::new(Snapshot {
            scripts,
            last_updated,
        }));
    }

    /// Current snapshot; stays valid after later updates
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<Script> {
        self.current.load().list(filter)
    }

    pub fn get(&self, name: &str) -> Option<Script> {
        self.current.load().get(name).cloned()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.current.load().last_updated
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::exec::ScriptExec;
use crate::trigger::Trigger;

/// Script record as produced by a loader, before compilation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScript {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Source path; keys bundling and merge-back
    pub src: PathBuf,
    /// Validation errors; empty when the script is structurally valid
    pub errors: Vec<String>,
    pub triggers: Vec<Trigger>,
    /// Modification time of the source
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawScript {
    pub fn new(name: impl Into<String>, src: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            src: src.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }
}

/// Output of the compiler for one script
#[derive(Clone)]
pub struct CompiledScript {
    pub exec: Arc<dyn ScriptExec>,
    pub metadata: BTreeMap<String, Value>,
}

impl CompiledScript {
    pub fn new(exec: Arc<dyn ScriptExec>) -> Self {
        Self {
            exec,
            metadata: BTreeMap::new(),
        }
    }
}

/// One loadable automation unit inside a registry snapshot
#[derive(Clone, Default)]
pub struct Script {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub src: PathBuf,
    pub errors: Vec<String>,
    pub triggers: Vec<Trigger>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Bundle the pipeline grouped this script into
    pub bundle: Option<String>,
    /// Metadata attached by the compiler
    pub metadata: BTreeMap<String, Value>,
    /// Entry point; only present after successful compilation
    pub exec: Option<Arc<dyn ScriptExec>>,
}

impl Script {
    /// No validation errors
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Valid and compiled
    pub fn is_executable(&self) -> bool {
        self.is_valid() && self.exec.is_some()
    }

    /// Merge compiler output into this record.
    ///
    /// Only `exec` and metadata are taken from the compiler; identity and
    /// validation state stay as loaded.
    pub fn with_compiled(mut self, compiled: CompiledScript) -> Self {
        self.exec = Some(compiled.exec);
        self.metadata.extend(compiled.metadata);
        self
    }
}

impl From<RawScript> for Script {
    fn from(raw: RawScript) -> Self {
        Self {
            name: raw.name,
            label: raw.label,
            description: raw.description,
            src: raw.src,
            errors: raw.errors,
            triggers: raw.triggers,
            updated_at: raw.updated_at,
            bundle: None,
            metadata: BTreeMap::new(),
            exec: None,
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("src", &self.src)
            .field("bundle", &self.bundle)
            .field("errors", &self.errors)
            .field("triggers", &self.triggers.len())
            .field("exec", &self.exec.is_some())
            .finish()
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

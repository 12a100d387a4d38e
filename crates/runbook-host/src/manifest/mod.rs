//! TOML manifests describing process-backed scripts
//!
//! One manifest per file:
//!
//! ```toml
//! name = "notify-owner"
//! label = "Notify owner"
//! command = ["sh", "notify.sh"]
//!
//! [[triggers]]
//! event_types = ["afterCreate"]
//! resource_types = ["compose:record"]
//! ```
//!
//! The command runs with the manifest's directory as working directory.

mod compiler;
mod loader;
mod process;

pub use compiler::{ArtifactEntry, ArtifactFile, ProcessCompiler};
pub use loader::ManifestLoader;
pub use process::ProcessExec;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::script::RawScript;
use crate::trigger::Trigger;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Program followed by its arguments
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Problems that keep the script from being run
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("name is missing".to_string());
        }
        if self.command.first().is_none_or(|p| p.trim().is_empty()) {
            errors.push("command is missing".to_string());
        }
        errors
    }

    pub fn into_raw(self, src: &Path) -> RawScript {
        let errors = self.errors();
        RawScript {
            name: self.name,
            label: self.label,
            description: self.description,
            src: src.to_path_buf(),
            errors,
            triggers: self.triggers,
            updated_at: None,
        }
    }
}

//! Host runtime for the runbook script registry
//!
//! Loads script definitions, bundles the valid ones, serves listing and
//! execution against an atomically swapped snapshot, and re-runs the whole
//! pipeline when sources change.

pub mod compiler;
pub mod dispatch;
pub mod exec;
pub mod filter;
pub mod handlers;
pub mod loader;
pub mod manifest;
pub mod pipeline;
pub mod registry;
pub mod reload;
pub mod script;
pub mod script_scanner;
pub mod trigger;
pub mod watcher;

// Re-export commonly used types
pub use compiler::{Artifact, BootEntry, Bootloader, CompileError, ScriptCompiler};
pub use dispatch::{DispatchError, Dispatcher, ExecError};
pub use exec::{
    exec_fn, BufferSink, ExecContext, LogLevel, LogLine, LogSink, ScriptExec, TracingSink,
};
pub use filter::{make_filter, ListFilter};
pub use handlers::ScriptHandlers;
pub use loader::{LoaderError, ScriptLoader};
pub use manifest::{ManifestLoader, ProcessCompiler};
pub use pipeline::{BundlingPipeline, PipelineConfig, ReloadSummary};
pub use registry::{ScriptRegistry, Snapshot};
pub use reload::{ChangeEvent, ChangeSource, ReloadController, ReloadStats};
pub use script::{CompiledScript, RawScript, Script};
pub use trigger::{Constraint, Trigger, TriggerQuery};
pub use watcher::change_source;

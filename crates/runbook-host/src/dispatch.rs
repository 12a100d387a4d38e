use runbook_config::ExecConfig;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::exec::{ExecContext, LogSink};
use crate::registry::ScriptRegistry;

/// Why a script could not be started
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("script not found: {0}")]
    ScriptNotFound(String),
    #[error("can not run script with initialization errors: {0}")]
    ScriptHasInitializationErrors(String),
    #[error("can not run uninitialized script: {0}")]
    ScriptUninitialized(String),
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Whatever the script body returned
    #[error(transparent)]
    Script(anyhow::Error),
}

impl ExecError {
    pub fn as_dispatch(&self) -> Option<&DispatchError> {
        match self {
            ExecError::Dispatch(e) => Some(e),
            ExecError::Script(_) => None,
        }
    }
}

/// Looks scripts up in the registry and runs them
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ScriptRegistry>,
    config: Arc<ExecConfig>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ScriptRegistry>, config: ExecConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<ScriptRegistry> {
        &self.registry
    }

    /// Run a script once with the given arguments.
    ///
    /// The outcome of the script itself is returned untouched: no retries,
    /// no timeout.
    pub async fn exec(
        &self,
        name: &str,
        args: Value,
        log: Arc<dyn LogSink>,
    ) -> Result<Value, ExecError> {
        let script = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::ScriptNotFound(name.to_string()))?;

        if !script.errors.is_empty() {
            return Err(
                DispatchError::ScriptHasInitializationErrors(name.to_string()).into(),
            );
        }

        let Some(exec) = script.exec else {
            return Err(DispatchError::ScriptUninitialized(name.to_string()).into());
        };

        let ctx = ExecContext::new(script.name, log, self.config.clone());
        exec.exec(args, ctx).await.map_err(ExecError::Script)
    }
}

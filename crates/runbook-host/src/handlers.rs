//! Request handlers in front of the registry and dispatcher
//!
//! Transports translate their wire format into these request types and map
//! [`Status`] onto their own error codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::dispatch::{DispatchError, Dispatcher, ExecError};
use crate::exec::{BufferSink, LogLine};
use crate::filter::ListFilter;
use crate::script::Script;
use crate::trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotFound,
    FailedPrecondition,
    InvalidArgument,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub status: Status,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ExecError> for HandlerError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Dispatch(e @ DispatchError::ScriptNotFound(_)) => {
                HandlerError::new(Status::NotFound, e.to_string())
            }
            ExecError::Dispatch(e) => HandlerError::new(Status::FailedPrecondition, e.to_string()),
            ExecError::Script(e) => HandlerError::new(Status::Internal, format!("{:#}", e)),
        }
    }
}

pub type ListRequest = ListFilter;

/// Listing view of a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSummary {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub src: PathBuf,
    pub bundle: Option<String>,
    pub errors: Vec<String>,
    pub triggers: Vec<Trigger>,
    pub executable: bool,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl From<&Script> for ScriptSummary {
    fn from(script: &Script) -> Self {
        Self {
            name: script.name.clone(),
            label: script.label.clone(),
            description: script.description.clone(),
            src: script.src.clone(),
            bundle: script.bundle.clone(),
            errors: script.errors.clone(),
            triggers: script.triggers.clone(),
            executable: script.is_executable(),
            updated_at: script.updated_at,
            metadata: script.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub scripts: Vec<ScriptSummary>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    pub result: Value,
    pub log: Vec<LogLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResponse {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

#[derive(Clone)]
pub struct ScriptHandlers {
    dispatcher: Dispatcher,
    output_dir: PathBuf,
}

impl ScriptHandlers {
    pub fn new(dispatcher: Dispatcher, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            dispatcher,
            output_dir: output_dir.into(),
        }
    }

    pub fn list(&self, request: &ListRequest) -> ListResponse {
        let snapshot = self.dispatcher.registry().snapshot();
        ListResponse {
            scripts: snapshot.list(request).iter().map(ScriptSummary::from).collect(),
            last_updated: snapshot.last_updated(),
        }
    }

    /// Run a script, returning its result together with everything it logged
    pub async fn exec(&self, request: ExecRequest) -> Result<ExecResponse, HandlerError> {
        let sink = Arc::new(BufferSink::new());
        let result = self
            .dispatcher
            .exec(&request.name, request.args, sink.clone())
            .await?;

        Ok(ExecResponse {
            result,
            log: sink.take(),
        })
    }

    /// Packed bundle as last written to the output directory
    pub async fn bundle(&self, request: &BundleRequest) -> Result<BundleResponse, HandlerError> {
        if !is_plain_name(&request.name) {
            return Err(HandlerError::new(
                Status::InvalidArgument,
                format!("invalid bundle name: {:?}", request.name),
            ));
        }

        let path = self.output_dir.join(format!("{}.json", request.name));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(BundleResponse {
                name: request.name.clone(),
                path,
                content,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(HandlerError::new(
                Status::NotFound,
                format!("bundle not found: {}", request.name),
            )),
            Err(e) => Err(HandlerError::new(
                Status::Internal,
                format!("failed to read {}: {}", path.display(), e),
            )),
        }
    }
}

/// A single path segment that stays inside the output directory
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && Path::new(name).components().count() == 1
        && !name.contains(['/', '\\'])
}

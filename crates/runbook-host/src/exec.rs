//! Execution context and log sinks handed to running scripts

use async_trait::async_trait;
use runbook_config::ExecConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Compiled entry point of a script
#[async_trait]
pub trait ScriptExec: Send + Sync {
    async fn exec(&self, args: Value, ctx: ExecContext) -> anyhow::Result<Value>;
}

/// Adapter turning a plain function into a [`ScriptExec`]
pub struct ExecFn<F>(pub F);

#[async_trait]
impl<F> ScriptExec for ExecFn<F>
where
    F: Fn(Value, ExecContext) -> anyhow::Result<Value> + Send + Sync,
{
    async fn exec(&self, args: Value, ctx: ExecContext) -> anyhow::Result<Value> {
        (self.0)(args, ctx)
    }
}

/// Wrap a function as a shared script entry point
pub fn exec_fn<F>(f: F) -> Arc<dyn ScriptExec>
where
    F: Fn(Value, ExecContext) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(ExecFn(f))
}

/// Severity of a line a script logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Split a `level: message` prefix off a line of script output.
    ///
    /// Lines without a recognised prefix are logged at info.
    pub fn parse_line(line: &str) -> (Self, &str) {
        let Some((prefix, rest)) = line.split_once(':') else {
            return (LogLevel::Info, line);
        };

        let level = match prefix.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => return (LogLevel::Info, line),
        };

        (level, rest.trim_start())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Receives everything a script logs while it runs
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards script output to `tracing`
pub struct TracingSink {
    script: String,
}

impl TracingSink {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        let script = self.script.as_str();
        match level {
            LogLevel::Trace => tracing::trace!(target: "script", script, "{}", message),
            LogLevel::Debug => tracing::debug!(target: "script", script, "{}", message),
            LogLevel::Info => tracing::info!(target: "script", script, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "script", script, "{}", message),
            LogLevel::Error => tracing::error!(target: "script", script, "{}", message),
        }
    }
}

/// One captured log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Keeps log lines in memory so they can be returned with the result
#[derive(Default)]
pub struct BufferSink {
    lines: Mutex<Vec<LogLine>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain captured lines
    pub fn take(&self) -> Vec<LogLine> {
        match self.lines.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl LogSink for BufferSink {
    fn log(&self, level: LogLevel, message: &str) {
        let line = LogLine {
            level,
            message: message.to_string(),
        };
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

/// Context passed to every invocation
#[derive(Clone)]
pub struct ExecContext {
    script: String,
    log: Arc<dyn LogSink>,
    config: Arc<ExecConfig>,
}

impl ExecContext {
    pub fn new(script: impl Into<String>, log: Arc<dyn LogSink>, config: Arc<ExecConfig>) -> Self {
        Self {
            script: script.into(),
            log,
            config,
        }
    }

    /// Name of the running script
    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.log.log(level, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("script", &self.script)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_prefixes() {
        assert_eq!(
            LogLevel::parse_line("warn: disk full"),
            (LogLevel::Warn, "disk full")
        );
        assert_eq!(
            LogLevel::parse_line("ERROR:boom"),
            (LogLevel::Error, "boom")
        );
        assert_eq!(
            LogLevel::parse_line("plain output"),
            (LogLevel::Info, "plain output")
        );
        assert_eq!(
            LogLevel::parse_line("http://example.com"),
            (LogLevel::Info, "http://example.com")
        );
    }

    #[test]
    fn test_buffer_sink_take_drains() {
        let sink = BufferSink::new();
        sink.log(LogLevel::Info, "one");
        sink.log(LogLevel::Error, "two");

        let lines = sink.take();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].level, LogLevel::Error);
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_tracing_sink_as_context_log() {
        let ctx = ExecContext::new(
            "greeter",
            Arc::new(TracingSink::new("greeter")),
            Arc::new(ExecConfig::default()),
        );
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            ctx.log(level, "line");
        }
        assert_eq!(ctx.script(), "greeter");
    }

    #[tokio::test]
    async fn test_exec_fn_receives_context() {
        let sink = Arc::new(BufferSink::new());
        let ctx = ExecContext::new("greeter", sink.clone(), Arc::new(ExecConfig::default()));

        let exec = exec_fn(|args, ctx| {
            ctx.info(&format!("hello from {}", ctx.script()));
            Ok(args)
        });

        let out = exec.exec(serde_json::json!({"x": 1}), ctx).await.unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
        assert_eq!(sink.take()[0].message, "hello from greeter");
    }
}

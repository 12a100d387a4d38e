use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::exec::{ExecContext, LogLevel, ScriptExec};

/// Runs a script as a child process
///
/// Arguments go to stdin as JSON. Stdout is the result: parsed as JSON when
/// possible, otherwise returned as a string. Each stderr line is forwarded to
/// the log sink, with an optional `level:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ProcessExec {
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl ScriptExec for ProcessExec {
    async fn exec(&self, args: Value, ctx: ExecContext) -> anyhow::Result<Value> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .envs(&ctx.config().env)
            .env("RUNBOOK_SCRIPT", ctx.script())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        let input = serde_json::to_vec(&args)?;
        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        let mut stdout = child.stdout.take().context("child stdout unavailable")?;
        let stderr = child.stderr.take().context("child stderr unavailable")?;

        let write = async move {
            // The script may exit without reading its input
            if let Err(e) = stdin.write_all(&input).await {
                debug!(target: "scripting", "Script did not read its arguments: {}", e);
            }
        };

        let forward_log = async {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                let (level, message) = LogLevel::parse_line(&line);
                ctx.log(level, message);
            }
            Ok::<_, std::io::Error>(())
        };

        let read = async {
            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await.map(|_| output)
        };

        let ((), logged, output) = tokio::join!(write, forward_log, read);
        let status = child.wait().await.context("failed to wait for script")?;

        logged.context("failed to read script log")?;
        let output = output.context("failed to read script output")?;

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }

        Ok(parse_output(&output))
    }
}

fn parse_output(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

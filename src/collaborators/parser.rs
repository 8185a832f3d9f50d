//! Replay parsing delegated to an external program.
//!
//! The program reads one JSON document on stdin
//! (`{replay, mainPlayer, battleResultHistory, faceOffs}`) and prints the
//! post-match stats as JSON on stdout, or `null` when it cannot parse them.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ParseInput, ReplayParser};
use crate::stats::StatisticsPayload;

pub struct CommandReplayParser {
    program: String,
    args: Vec<String>,
}

impl CommandReplayParser {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a command line on whitespace: `node dist/parse.js --bg`.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().context("empty replay parser command")?;
        Ok(Self::new(program, parts.collect()))
    }
}

#[async_trait::async_trait]
impl ReplayParser for CommandReplayParser {
    async fn parse(&self, input: ParseInput<'_>) -> Result<Option<StatisticsPayload>> {
        let request = serde_json::to_vec(&input).context("serialize parser input")?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn replay parser {}", self.program))?;

        // stdin is fed from its own task while stdout/stderr are collected
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&request).await?;
                stdin.shutdown().await
            })
        });

        let output = child
            .wait_with_output()
            .await
            .context("wait for replay parser")?;

        if let Some(writer) = writer {
            match writer.await.context("parser input task panicked")? {
                Ok(()) => {}
                // the parser exited without reading everything; its exit
                // status and output decide
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("replay parser closed stdin early");
                }
                Err(e) => return Err(e).context("write parser input"),
            }
        }

        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "replay parser failed"
            );
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() || stdout == "null" {
            debug!("replay parser produced no stats");
            return Ok(None);
        }

        match serde_json::from_str::<StatisticsPayload>(stdout) {
            Ok(stats) => Ok(Some(stats)),
            Err(e) => {
                warn!(error = %e, "replay parser output is not a stats payload");
                Ok(None)
            }
        }
    }
}

//! JSON-lines command intake on stdin.
//!
//! Each line is one already-parsed command, e.g.
//! `{"tenant": 1, "text_channel": 7, "actions": [{"type": "status"}]}`.
//! Replies are printed to stdout, split like chat messages.

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use schoolbell_channels::split_chunks;
use schoolbell_core::TenantId;
use schoolbell_scheduler::{render_replies, Action, CommandContext, TenantRegistry};

#[derive(Debug, Deserialize)]
pub struct CommandLine {
    pub tenant: TenantId,
    #[serde(flatten)]
    pub context: CommandContext,
    #[serde(default)]
    pub actions: Vec<Action>,
}

const UNRECOGNISED: &str = "❌ Command not recognised";

pub fn parse_line(line: &str) -> Option<CommandLine> {
    match serde_json::from_str::<CommandLine>(line) {
        Ok(cmd) if !cmd.actions.is_empty() => Some(cmd),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "rejecting malformed command line");
            None
        }
    }
}

/// Reply text for one command line.
pub async fn execute(registry: &TenantRegistry, line: &str) -> String {
    let Some(cmd) = parse_line(line) else {
        return UNRECOGNISED.to_string();
    };
    debug!(tenant = %cmd.tenant, actions = cmd.actions.len(), "command received");
    let outcomes = registry.handle(cmd.tenant, cmd.context, cmd.actions).await;
    render_replies(&outcomes)
}

pub async fn run_stdin(registry: Arc<TenantRegistry>, chunk_max: usize) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = execute(&registry, &line).await;
        if let Err(e) = write_reply(&mut stdout, &reply, chunk_max).await {
            warn!(error = %e, "stdout write failed");
            return;
        }
    }
    info!("command input closed");
}

async fn write_reply(
    out: &mut tokio::io::Stdout,
    reply: &str,
    chunk_max: usize,
) -> std::io::Result<()> {
    for chunk in split_chunks(reply, chunk_max) {
        out.write_all(chunk.as_bytes()).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await
}

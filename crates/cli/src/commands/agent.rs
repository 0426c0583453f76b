// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `swarm start|stop|status|ping|reload|version`

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::client::{AgentClient, ClientError};
use crate::exit_error::ExitError;
use crate::output::{format_or_json, format_uptime, render_status, OutputFormat};

/// How long a background start may take to print READY
const START_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect, or fail with the not-running exit code
pub(crate) fn client() -> Result<AgentClient> {
    AgentClient::connect().map_err(not_running_or)
}

pub(crate) fn not_running_or(e: ClientError) -> anyhow::Error {
    if e.is_not_running() {
        ExitError::not_running().into()
    } else {
        anyhow!("{}", e)
    }
}

pub async fn start(foreground: bool) -> Result<()> {
    let swarmd = find_swarmd_binary();
    if foreground {
        let status = std::process::Command::new(&swarmd).status()?;
        if !status.success() {
            return Err(anyhow!("Agent exited with status: {}", status));
        }
        return Ok(());
    }

    if let Ok(client) = AgentClient::connect() {
        if let Ok(status) = client.status().await {
            println!("Agent already running (uptime: {})", format_uptime(status.uptime_secs));
            return Ok(());
        }
    }

    let mut child = Command::new(&swarmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Failed to launch {}: {}", swarmd.display(), e))?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("agent stdout unavailable"))?;
    let mut lines = BufReader::new(stdout).lines();

    match tokio::time::timeout(START_TIMEOUT, lines.next_line()).await {
        Ok(Ok(Some(line))) if line.trim() == "READY" => {
            println!("Agent started");
            Ok(())
        }
        Ok(_) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            Err(anyhow!("Agent failed to start: {}", startup_error(&stderr)))
        }
        Err(_) => Err(anyhow!("Agent did not become ready within {:?}", START_TIMEOUT)),
    }
}

/// The last `swarmd:` error line, or the whole output
fn startup_error(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("swarmd: "))
        .map(str::to_string)
        .unwrap_or_else(|| stderr.trim().to_string())
}

pub async fn stop(format: OutputFormat) -> Result<()> {
    let stopped = match AgentClient::connect() {
        Ok(client) => client.shutdown().await.map_err(|e| anyhow!("{}", e))?,
        Err(e) if e.is_not_running() => false,
        Err(e) => return Err(anyhow!("{}", e)),
    };
    let obj = serde_json::json!({ "stopped": stopped });
    format_or_json(format, &obj, || {
        if stopped {
            println!("Agent stopping");
        } else {
            println!("Agent not running");
        }
    })
}

pub async fn status(format: OutputFormat) -> Result<()> {
    let status = client()?.status().await.map_err(not_running_or)?;
    format_or_json(format, &status, || print!("{}", render_status(&status)))
}

pub async fn ping(format: OutputFormat) -> Result<()> {
    client()?.ping().await.map_err(not_running_or)?;
    format_or_json(format, &serde_json::json!({ "pong": true }), || println!("pong"))
}

pub async fn reload(format: OutputFormat) -> Result<()> {
    client()?.reload_config().await.map_err(not_running_or)?;
    format_or_json(format, &serde_json::json!({ "reloaded": true }), || {
        println!("Configuration reloaded")
    })
}

pub async fn version(format: OutputFormat) -> Result<()> {
    let protocol = match AgentClient::connect() {
        Ok(client) => client.hello().await.ok(),
        Err(_) => None,
    };
    let obj = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "agent_protocol": protocol,
    });
    format_or_json(format, &obj, || {
        println!("swarm {}", env!("CARGO_PKG_VERSION"));
        match protocol {
            Some(v) => println!("agent protocol {}", v),
            None => println!("agent not running"),
        }
    })
}

/// `SWARMD_BIN`, then a sibling of this executable, then `PATH`
fn find_swarmd_binary() -> PathBuf {
    if let Some(path) = std::env::var_os("SWARMD_BIN") {
        return PathBuf::from(path);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(sibling) = exe.parent().map(|dir| dir.join("swarmd")) {
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("swarmd")
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

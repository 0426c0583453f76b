// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;
use swarm_core::short;
use swarm_wire::{CacheSummary, ConnectionKind, StatusSummary};

use crate::color;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `data` as pretty JSON, or run `text_fn` for text output
pub fn format_or_json<T: Serialize>(
    format: OutputFormat,
    data: &T,
    text_fn: impl FnOnce(),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Text => {
            text_fn();
        }
    }
    Ok(())
}

pub fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn label(text: &str) -> String {
    color::context(&format!("{text}:"))
}

pub fn render_cache(cache: &CacheSummary) -> String {
    format!(
        "{} {} channels, {}, {} job folders ({})",
        label("Cache"),
        cache.channels,
        format_bytes(cache.bytes),
        cache.job_folders,
        color::muted(&cache.root),
    )
}

/// Multi-line text form of `swarm status`
pub fn render_status(status: &StatusSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({})",
        label("Agent"),
        color::literal(&status.agent_name),
        status.state
    );
    let _ = writeln!(out, "{} {}", label("Uptime"), format_uptime(status.uptime_secs));
    let coordinator = if status.coordinator_responding { "responding" } else { "not responding" };
    let _ = writeln!(out, "{} {}", label("Coordinator"), coordinator);
    let _ = writeln!(out, "{}", render_cache(&status.cache));

    let _ = writeln!(out);
    if status.connections.is_empty() {
        let _ = writeln!(out, "{}", color::muted("No connections"));
    } else {
        let _ = writeln!(out, "{}", color::header("Connections"));
        for conn in &status.connections {
            let kind = match conn.kind {
                ConnectionKind::Local => "local pid",
                ConnectionKind::Remote => "remote",
            };
            let _ = write!(out, "  #{:<4} {} {} [{}]", conn.handle, kind, conn.peer, conn.state);
            if let Some(parent) = conn.parent {
                let _ = write!(out, " parent #{parent}");
            }
            if conn.reservations > 0 {
                let _ = write!(out, " {} reserved", conn.reservations);
            }
            let _ = writeln!(out);
        }
    }

    if !status.jobs.is_empty() {
        let _ = writeln!(out, "{}", color::header("Jobs"));
        for job in &status.jobs {
            let guid = job.guid.to_string();
            let role = if job.owner_is_instigator { "instigator" } else { "worker" };
            let _ = writeln!(
                out,
                "  {} {} {}/{} pending {} running {} retired ({})",
                color::literal(short(&guid, 8)),
                role,
                job.state,
                job.success,
                job.pending,
                job.running,
                job.retired,
            );
        }
    }
    out
}

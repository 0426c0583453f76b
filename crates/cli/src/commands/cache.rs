// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `swarm cache` - cache maintenance on an idle agent

use anyhow::Result;
use clap::{Args, Subcommand};
use swarm_wire::CacheMaintenance;

use super::agent::{client, not_running_or};
use crate::output::{format_or_json, render_cache, OutputFormat};

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq)]
pub enum CacheCommand {
    /// Delete every cached channel and job folder
    Clear,
    /// Re-hash persistent channels and drop corrupt ones
    Validate,
    /// Trim old job folders and evict channels over the quota
    Age,
}

impl CacheCommand {
    pub fn mode(self) -> CacheMaintenance {
        match self {
            CacheCommand::Clear => CacheMaintenance::Clear,
            CacheCommand::Validate => CacheMaintenance::Validate,
            CacheCommand::Age => CacheMaintenance::Age,
        }
    }
}

pub async fn cache(args: CacheArgs, format: OutputFormat) -> Result<()> {
    let summary = client()?.maintain_cache(args.command.mode()).await.map_err(not_running_or)?;
    format_or_json(format, &summary, || println!("{}", render_cache(&summary)))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run log files under the cache's `Logs` directory.
//!
//! Each run writes `Agent-<timestamp>.log`. The daemon rolls to a fresh file
//! whenever the agent goes idle, so a log covers one stretch of work. Old
//! files are removed by cache aging.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

struct Current {
    path: PathBuf,
    file: File,
}

/// Handle to the active log file; clones share it
#[derive(Clone)]
pub struct RollingLog {
    dir: PathBuf,
    current: Arc<Mutex<Current>>,
}

impl RollingLog {
    /// Create `dir` if needed and start a new file in it
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let current = create_file(dir)?;
        Ok(Self { dir: dir.to_path_buf(), current: Arc::new(Mutex::new(current)) })
    }

    pub fn path(&self) -> PathBuf {
        self.current.lock().path.clone()
    }

    /// Switch to a new file. Returns its path.
    pub fn roll(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let next = create_file(&self.dir)?;
        let path = next.path.clone();
        let previous = std::mem::replace(&mut *self.current.lock(), next);
        let _ = previous.file.sync_all();
        Ok(path)
    }

    fn writer(&self) -> LogWriter {
        LogWriter { current: self.current.clone() }
    }
}

fn create_file(dir: &Path) -> io::Result<Current> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f").to_string();
    let mut path = dir.join(format!("Agent-{stamp}.log"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("Agent-{stamp}-{n}.log"));
        n += 1;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Current { path, file })
}

struct LogWriter {
    current: Arc<Mutex<Current>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.current.lock().file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current.lock().file.flush()
    }
}

/// Install the global subscriber writing to `log`.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. A subscriber
/// that is already installed (tests starting several daemons) is kept.
/// Hold the returned guard until exit so buffered lines are flushed.
pub fn init(log: &RollingLog) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(log.writer());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
    guard
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

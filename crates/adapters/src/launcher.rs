// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job executable launcher.
//!
//! Starts the executable a job names, streams its output to the telemetry
//! sink, and reports the exit code through a [`RunningProcess`] handle.

use crate::telemetry::{LogColour, TelemetrySink, Verbosity};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Exit code reported when the exit status carries no code (killed by signal)
pub const NO_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process for {0} has no pid")]
    NoPid(PathBuf),
}

/// Everything needed to start a job executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    /// Parameter string as given by the job specification
    pub arguments: String,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    /// Output lines past this are logged at the most verbose level only
    pub max_log_lines: u32,
}

/// Handle to a started job process
#[derive(Clone, Debug)]
pub struct RunningProcess {
    pid: u32,
    exit: watch::Receiver<Option<i32>>,
    kill: CancellationToken,
}

impl RunningProcess {
    pub fn new(pid: u32, exit: watch::Receiver<Option<i32>>, kill: CancellationToken) -> Self {
        Self { pid, exit, kill }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Request termination; the exit code arrives through [`Self::wait`]
    pub fn kill(&self) {
        self.kill.cancel();
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Wait for the process to exit
    pub async fn wait(&self) -> i32 {
        let mut exit = self.exit.clone();
        let code = match exit.wait_for(Option::is_some).await {
            Ok(code) => code.unwrap_or(NO_EXIT_CODE),
            Err(_) => NO_EXIT_CODE,
        };
        code
    }
}

/// Adapter for starting and inspecting job processes
pub trait ProcessLauncher: Send + Sync + 'static {
    fn launch(&self, spec: LaunchSpec) -> Result<RunningProcess, LaunchError>;

    /// Whether a process with `pid` is still running
    fn is_alive(&self, pid: u32) -> bool;

    /// File name of the executable running as `pid`
    fn executable_name(&self, pid: u32) -> Option<String>;
}

/// Split a parameter string into arguments, honouring double quotes
pub fn split_arguments(arguments: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for c in arguments.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        args.push(current);
    }
    args
}

/// Launches real processes with `tokio::process`
#[derive(Clone)]
pub struct TokioLauncher {
    telemetry: Arc<dyn TelemetrySink>,
}

impl TokioLauncher {
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { telemetry }
    }
}

fn forward_lines<R>(
    stream: R,
    colour: LogColour,
    lines: Arc<AtomicU32>,
    max: u32,
    telemetry: Arc<dyn TelemetrySink>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            let seen = lines.fetch_add(1, Ordering::Relaxed);
            if seen < max {
                telemetry.log(Verbosity::Informative, colour, &line);
                continue;
            }
            if seen == max {
                telemetry.log(
                    Verbosity::Informative,
                    LogColour::Blue,
                    "Maximum output from job application received, remaining output truncated",
                );
            }
            telemetry.log(Verbosity::ExtraVerbose, colour, &line);
        }
    });
}

impl ProcessLauncher for TokioLauncher {
    fn launch(&self, spec: LaunchSpec) -> Result<RunningProcess, LaunchError> {
        let mut command = Command::new(&spec.program);
        command
            .args(split_arguments(&spec.arguments))
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| LaunchError::Spawn { program: spec.program.clone(), source })?;
        let Some(pid) = child.id() else {
            return Err(LaunchError::NoPid(spec.program));
        };

        let lines = Arc::new(AtomicU32::new(0));
        if let Some(stdout) = child.stdout.take() {
            let telemetry = Arc::clone(&self.telemetry);
            let lines = Arc::clone(&lines);
            forward_lines(stdout, LogColour::Blue, lines, spec.max_log_lines, telemetry);
        }
        if let Some(stderr) = child.stderr.take() {
            let telemetry = Arc::clone(&self.telemetry);
            forward_lines(stderr, LogColour::Red, lines, spec.max_log_lines, telemetry);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let kill_requested = kill.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_requested.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(pid, error = %e, "failed to kill job process");
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(NO_EXIT_CODE),
                Err(e) => {
                    tracing::warn!(pid, error = %e, "failed to wait for job process");
                    NO_EXIT_CODE
                }
            };
            tracing::debug!(pid, code, "job process exited");
            let _ = exit_tx.send(Some(code));
        });

        Ok(RunningProcess::new(pid, exit_rx, kill))
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
    }

    fn executable_name(&self, pid: u32) -> Option<String> {
        let exe = std::fs::read_link(format!("/proc/{pid}/exe")).ok();
        if let Some(name) = exe.as_ref().and_then(|p| p.file_name()) {
            return Some(name.to_string_lossy().into_owned());
        }
        std::fs::read_to_string(format!("/proc/{pid}/comm")).ok().map(|s| s.trim().to_string())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{LaunchError, LaunchSpec, ProcessLauncher, RunningProcess};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    /// Exit code a fake process reports when killed
    pub const KILLED_EXIT_CODE: i32 = -9;

    /// Test-side control of a fake process
    #[derive(Clone)]
    pub struct FakeProcess {
        pid: u32,
        exit: Arc<watch::Sender<Option<i32>>>,
        kill: CancellationToken,
    }

    impl FakeProcess {
        pub fn pid(&self) -> u32 {
            self.pid
        }

        /// Simulate the process exiting with `code`
        pub fn exit(&self, code: i32) {
            let _ = self.exit.send(Some(code));
        }

        pub fn was_killed(&self) -> bool {
            self.kill.is_cancelled()
        }
    }

    struct FakeLauncherState {
        next_pid: u32,
        launches: Vec<LaunchSpec>,
        processes: Vec<FakeProcess>,
        alive: HashMap<u32, String>,
        fail_launch: bool,
    }

    /// Launcher that starts nothing and lets tests drive process exits
    #[derive(Clone)]
    pub struct FakeLauncher {
        inner: Arc<Mutex<FakeLauncherState>>,
    }

    impl Default for FakeLauncher {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeLauncherState {
                    next_pid: 40_000,
                    launches: Vec::new(),
                    processes: Vec::new(),
                    alive: HashMap::new(),
                    fail_launch: false,
                })),
            }
        }
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn launches(&self) -> Vec<LaunchSpec> {
            self.inner.lock().launches.clone()
        }

        pub fn processes(&self) -> Vec<FakeProcess> {
            self.inner.lock().processes.clone()
        }

        /// Most recently launched process
        pub fn last(&self) -> Option<FakeProcess> {
            self.inner.lock().processes.last().cloned()
        }

        /// Pretend an external process (a client) is running
        pub fn add_running(&self, pid: u32, executable: &str) {
            self.inner.lock().alive.insert(pid, executable.to_string());
        }

        pub fn remove_running(&self, pid: u32) {
            self.inner.lock().alive.remove(&pid);
        }

        pub fn set_fail_launch(&self, fail: bool) {
            self.inner.lock().fail_launch = fail;
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&self, spec: LaunchSpec) -> Result<RunningProcess, LaunchError> {
            let mut state = self.inner.lock();
            if state.fail_launch {
                return Err(LaunchError::Spawn {
                    program: spec.program,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let pid = state.next_pid;
            state.next_pid += 1;

            let (exit_tx, exit_rx) = watch::channel(None);
            let kill = CancellationToken::new();
            let process = FakeProcess { pid, exit: Arc::new(exit_tx), kill: kill.clone() };

            let on_kill = process.clone();
            tokio::spawn(async move {
                on_kill.kill.cancelled().await;
                on_kill.exit(KILLED_EXIT_CODE);
            });

            let name = spec
                .program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            state.alive.insert(pid, name);
            state.launches.push(spec);
            state.processes.push(process);
            Ok(RunningProcess::new(pid, exit_rx, kill))
        }

        fn is_alive(&self, pid: u32) -> bool {
            let state = self.inner.lock();
            if let Some(process) = state.processes.iter().find(|p| p.pid == pid) {
                return process.exit.borrow().is_none();
            }
            state.alive.contains_key(&pid)
        }

        fn executable_name(&self, pid: u32) -> Option<String> {
            self.inner.lock().alive.get(&pid).cloned()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLauncher, FakeProcess, KILLED_EXIT_CODE};

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;

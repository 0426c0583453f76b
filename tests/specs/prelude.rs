// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers shared by the specs: an isolated agent per test and a small
//! fluent wrapper over `assert_cmd`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use tempfile::TempDir;

pub use serial_test::serial;

/// Exit code the CLI uses when the agent is not running
pub const NOT_RUNNING: i32 = 3;

const WAIT: Duration = Duration::from_secs(10);

/// `swarm` with no agent state configured
pub fn cli() -> CliBuilder {
    CliBuilder::new(None)
}

/// A state directory of its own, with a standalone agent configured
pub struct Agent {
    state: TempDir,
}

impl Agent {
    pub fn configured(name: &str) -> Self {
        let state = tempfile::tempdir().unwrap();
        std::fs::write(
            state.path().join("agent.toml"),
            format!("agent_name = \"{name}\"\nstandalone = true\ncache_root = \"cache\"\n"),
        )
        .unwrap();
        Self { state }
    }

    /// Configure and start in the background
    pub fn running(name: &str) -> Self {
        let agent = Self::configured(name);
        agent.swarm().args(&["start"]).passes().stdout_has("Agent started");
        agent
    }

    pub fn state_dir(&self) -> &Path {
        self.state.path()
    }

    pub fn socket(&self) -> PathBuf {
        self.state.path().join("agent.sock")
    }

    pub fn swarm(&self) -> CliBuilder {
        CliBuilder::new(Some(self.state.path()))
    }

    /// Block until `check` holds or the wait runs out
    pub fn wait_for(&self, what: &str, check: impl Fn() -> bool) {
        let start = Instant::now();
        while !check() {
            assert!(start.elapsed() < WAIT, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        let _ = self.swarm().command().arg("stop").output();
    }
}

pub struct CliBuilder {
    command: Command,
}

impl CliBuilder {
    fn new(state_dir: Option<&Path>) -> Self {
        let mut command = Command::cargo_bin("swarm").unwrap();
        command.env("NO_COLOR", "1").env_remove("COLOR").timeout(WAIT);
        command.env("SWARMD_BIN", assert_cmd::cargo::cargo_bin("swarmd"));
        for var in ["SWARM_AGENT_NAME", "SWARM_CACHE_ROOT", "SWARM_COORDINATOR"] {
            command.env_remove(var);
        }
        match state_dir {
            Some(dir) => command.env("SWARM_STATE_DIR", dir),
            None => command.env("SWARM_STATE_DIR", std::env::temp_dir().join("swarm-specs-none")),
        };
        Self { command }
    }

    fn command(&mut self) -> &mut Command {
        &mut self.command
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.command.args(args);
        self
    }

    pub fn passes(mut self) -> RunAssert {
        RunAssert::new(self.command.assert().success())
    }

    pub fn fails_with(mut self, code: i32) -> RunAssert {
        RunAssert::new(self.command.assert().code(code))
    }

    /// Any non-zero exit
    pub fn fails(mut self) -> RunAssert {
        RunAssert::new(self.command.assert().failure())
    }
}

pub struct RunAssert {
    stdout: String,
    stderr: String,
}

impl RunAssert {
    fn new(assert: assert_cmd::assert::Assert) -> Self {
        let output = assert.get_output();
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(self.stdout.contains(needle), "stdout lacks {needle:?}:\n{}", self.stdout);
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(self.stderr.contains(needle), "stderr lacks {needle:?}:\n{}", self.stderr);
        self
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout).unwrap()
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry sink.
//!
//! Services report progress and user-facing log lines through a
//! [`TelemetrySink`] instead of a global logger, so tests can observe them.

use std::fmt;

/// Progress state reported for a machine taking part in a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    TaskTotal(u32),
    TasksInProgress(u32),
    TasksCompleted(u32),
    InstigatorConnected,
    InstigatorDisconnected,
    RemoteConnected,
    RemoteDisconnected,
    Blocked,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::TaskTotal(n) => write!(f, "task_total({n})"),
            MachineState::TasksInProgress(n) => write!(f, "tasks_in_progress({n})"),
            MachineState::TasksCompleted(n) => write!(f, "tasks_completed({n})"),
            MachineState::InstigatorConnected => f.write_str("instigator_connected"),
            MachineState::InstigatorDisconnected => f.write_str("instigator_disconnected"),
            MachineState::RemoteConnected => f.write_str("remote_connected"),
            MachineState::RemoteDisconnected => f.write_str("remote_disconnected"),
            MachineState::Blocked => f.write_str("blocked"),
        }
    }
}

/// How chatty a log line is; sinks may drop lines above their threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Critical,
    Informative,
    Verbose,
    ExtraVerbose,
    SuperVerbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogColour {
    Normal,
    Green,
    Orange,
    Red,
    Blue,
}

/// Adapter for progress and user-facing log output
pub trait TelemetrySink: Send + Sync + 'static {
    fn update_machine_state(&self, machine: &str, state: MachineState);

    fn log(&self, verbosity: Verbosity, colour: LogColour, text: &str);
}

/// Forwards telemetry to `tracing`
#[derive(Clone, Copy, Debug)]
pub struct TracingTelemetry {
    threshold: Verbosity,
}

impl TracingTelemetry {
    pub fn new(threshold: Verbosity) -> Self {
        Self { threshold }
    }
}

impl Default for TracingTelemetry {
    fn default() -> Self {
        Self::new(Verbosity::Informative)
    }
}

impl TelemetrySink for TracingTelemetry {
    fn update_machine_state(&self, machine: &str, state: MachineState) {
        tracing::debug!(machine, %state, "machine state");
    }

    fn log(&self, verbosity: Verbosity, colour: LogColour, text: &str) {
        if verbosity > self.threshold {
            return;
        }
        match (verbosity, colour) {
            (Verbosity::Critical, _) | (_, LogColour::Red) => tracing::error!("{text}"),
            (_, LogColour::Orange) => tracing::warn!("{text}"),
            (Verbosity::Informative, _) => tracing::info!("{text}"),
            _ => tracing::debug!("{text}"),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{LogColour, MachineState, TelemetrySink, Verbosity};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TelemetryEvent {
        Machine { machine: String, state: MachineState },
        Log { verbosity: Verbosity, colour: LogColour, text: String },
    }

    /// Records every telemetry call for assertions
    #[derive(Clone, Default)]
    pub struct RecordingTelemetry {
        events: Arc<Mutex<Vec<TelemetryEvent>>>,
    }

    impl RecordingTelemetry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<TelemetryEvent> {
            self.events.lock().clone()
        }

        /// Machine states reported for `machine`, in order
        pub fn machine_states(&self, machine: &str) -> Vec<MachineState> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    TelemetryEvent::Machine { machine: m, state } if m == machine => Some(*state),
                    _ => None,
                })
                .collect()
        }

        /// Whether any log line contains `needle`
        pub fn logged(&self, needle: &str) -> bool {
            self.events.lock().iter().any(|e| match e {
                TelemetryEvent::Log { text, .. } => text.contains(needle),
                TelemetryEvent::Machine { .. } => false,
            })
        }
    }

    impl TelemetrySink for RecordingTelemetry {
        fn update_machine_state(&self, machine: &str, state: MachineState) {
            self.events
                .lock()
                .push(TelemetryEvent::Machine { machine: machine.to_string(), state });
        }

        fn log(&self, verbosity: Verbosity, colour: LogColour, text: &str) {
            let text = text.to_string();
            self.events.lock().push(TelemetryEvent::Log { verbosity, colour, text });
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{RecordingTelemetry, TelemetryEvent};

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;

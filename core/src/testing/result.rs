use std::{path::PathBuf, time::Duration};

use super::{diff::Diff, verdict::Verdict};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    Exited(i32),
    /// Killed by a signal we did not send.
    Signaled,
    /// Killed by the harness after the time limit elapsed.
    TimedOut,
    /// Killed by the harness after stdout grew past the output ceiling.
    OutputLimitExceeded,
}

impl Termination {
    pub fn success(self) -> bool {
        self == Termination::Exited(0)
    }
}

/// Result of executing one process against one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
    /// Where the captured stdout was persisted, if it was.
    pub saved_stdout: Option<PathBuf>,
}

impl RunOutcome {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A judged fixture, kept around for the detail and summary printers.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub fixture_name: String,
    pub verdict: Verdict,
    pub run: RunOutcome,
    pub expected: String,
    pub diff: Option<Diff>,
}

impl TestOutcome {
    pub fn execution_time(&self) -> Duration {
        self.run.elapsed
    }
}

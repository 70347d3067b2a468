//! [`Isolator`] – one-shot work in a separate OS process with a bounded,
//! forced shutdown.
//!
//! The child's stdin pipe is its shutdown event: the parent closes it to ask
//! the child to stop, and the child notices end-of-file (see
//! [`wait_for_parent_shutdown`]).  A child that is still running once the
//! maximum wait has elapsed is killed and reaped.

use std::io::{self, Read};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sand_types::SandError;
use sand_types::config::IsolatorConfig;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How an isolated process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationOutcome {
    /// Exited on its own within the maximum wait.
    Joined(ExitStatus),
    /// Killed after the maximum wait elapsed.
    ForciblyTerminated,
}

/// Handle to one isolated child process.
#[derive(Debug)]
pub struct Isolator {
    name: String,
    child: Child,
    shutdown_pipe: Option<ChildStdin>,
    max_wait: Duration,
    outcome: Option<IsolationOutcome>,
}

impl Isolator {
    /// Spawn `command` with a piped stdin.
    ///
    /// # Errors
    ///
    /// [`SandError::Spawn`] if the process cannot be started.
    pub fn spawn(name: impl Into<String>, mut command: Command, max_wait: Duration) -> Result<Self, SandError> {
        let name = name.into();
        let mut child = command.stdin(Stdio::piped()).spawn().map_err(|e| SandError::Spawn {
            name: name.clone(),
            details: e.to_string(),
        })?;
        let shutdown_pipe = child.stdin.take();
        info!(isolator = %name, pid = child.id(), "isolated process started");
        Ok(Self {
            name,
            child,
            shutdown_pipe,
            max_wait,
            outcome: None,
        })
    }

    /// [`spawn`][Self::spawn] with the maximum wait taken from `config`.
    pub fn spawn_with_config(
        name: impl Into<String>,
        command: Command,
        config: &IsolatorConfig,
    ) -> Result<Self, SandError> {
        Self::spawn(name, command, Duration::from_secs(config.max_wait_secs))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn is_alive(&mut self) -> bool {
        self.outcome.is_none() && matches!(self.child.try_wait(), Ok(None))
    }

    /// Signal the child, wait at most `max_wait`, then kill it.
    ///
    /// Calling it again returns the first outcome.
    ///
    /// # Errors
    ///
    /// [`SandError::Io`] if the child's status cannot be queried or it
    /// cannot be killed.
    pub fn shutdown(&mut self) -> Result<IsolationOutcome, SandError> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        drop(self.shutdown_pipe.take());

        let deadline = Instant::now() + self.max_wait;
        let outcome = loop {
            if let Some(status) = self.child.try_wait()? {
                debug!(isolator = %self.name, %status, "isolated process joined");
                break IsolationOutcome::Joined(status);
            }
            if Instant::now() >= deadline {
                warn!(
                    isolator = %self.name,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "isolated process did not exit in time, terminating"
                );
                self.terminate()?;
                break IsolationOutcome::ForciblyTerminated;
            }
            thread::sleep(POLL_INTERVAL);
        };
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            // Already exited between the last poll and the kill.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait().map(|_| ())
    }
}

impl Drop for Isolator {
    fn drop(&mut self) {
        if self.outcome.is_none() && self.is_alive() {
            match self.terminate() {
                Ok(()) => debug!(isolator = %self.name, "isolated process terminated on drop"),
                Err(e) => warn!(isolator = %self.name, error = %e, "failed to terminate isolated process on drop"),
            }
        }
    }
}

/// Child side: block until the parent closes our stdin.
pub fn wait_for_parent_shutdown() -> io::Result<()> {
    let mut sink = [0u8; 64];
    let mut stdin = io::stdin().lock();
    loop {
        if stdin.read(&mut sink)? == 0 {
            return Ok(());
        }
    }
}

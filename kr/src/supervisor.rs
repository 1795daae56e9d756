//! Subprocess supervision
//!
//! Pauses, resumes and stops one supervised child through signals. The
//! signals used here never overlap the duel's notification signals.

use eyre::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info};

/// Freezes the child
pub const PAUSE_SIGNAL: Signal = Signal::SIGSTOP;

/// Thaws a frozen child
pub const RESUME_SIGNAL: Signal = Signal::SIGCONT;

/// Ends the child
pub const STOP_SIGNAL: Signal = Signal::SIGABRT;

/// Signals reserved for supervision
pub const SUPERVISOR_SIGNALS: [Signal; 3] = [PAUSE_SIGNAL, RESUME_SIGNAL, STOP_SIGNAL];

/// Tracks at most one running child and controls it with signals
#[derive(Debug, Default)]
pub struct Supervisor {
    pid: Option<u32>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start supervising `pid`
    pub fn attach(&mut self, pid: u32) {
        debug!(pid, "Supervisor::attach: called");
        self.pid = Some(pid);
    }

    /// Forget the current child, e.g. after it was reaped
    pub fn detach(&mut self) {
        debug!(pid = ?self.pid, "Supervisor::detach: called");
        self.pid = None;
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    /// Freeze the child. No-op without one.
    pub fn pause(&self) -> Result<()> {
        debug!(pid = ?self.pid, "Supervisor::pause: called");
        self.signal(PAUSE_SIGNAL).context("Failed to pause subprocess")
    }

    /// Thaw the child. No-op without one.
    pub fn resume(&self) -> Result<()> {
        debug!(pid = ?self.pid, "Supervisor::resume: called");
        self.signal(RESUME_SIGNAL).context("Failed to resume subprocess")
    }

    /// Resume, then abort the child. No-op without one.
    pub fn stop(&self) -> Result<()> {
        debug!(pid = ?self.pid, "Supervisor::stop: called");
        // A stopped process would hold the abort until continued
        self.resume()?;
        self.signal(STOP_SIGNAL).context("Failed to stop subprocess")?;
        info!(pid = ?self.pid, "Subprocess stopped");
        Ok(())
    }

    fn signal(&self, sig: Signal) -> Result<()> {
        let Some(pid) = self.pid else {
            debug!(?sig, "Supervisor::signal: no subprocess");
            return Ok(());
        };
        match kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                debug!(pid, ?sig, "Supervisor::signal: subprocess already gone");
                Ok(())
            }
            Err(e) => Err(eyre::eyre!("kill({}, {:?}) failed: {}", pid, sig, e)),
        }
    }
}

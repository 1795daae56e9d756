//! POSIX signal transport for the notification channel
//!
//! `Shot` travels as SIGUSR1 and `Concede` as SIGUSR2. Sends go through
//! `kill(2)`; receipt goes through tokio's signal driver, which turns the
//! asynchronous handler into a queued event. The kernel coalesces pending
//! signals of one kind, so a burst of shots may arrive as one.
//!
//! A spawned challenger starts with both signals blocked (see
//! [`block_duel_signals`]) and unblocks them once its inbox is installed, so a
//! shot that lands during process startup stays pending instead of killing it.

use std::io;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal, kill, sigprocmask};
use nix::unistd::Pid;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, warn};

use super::error::DuelError;
use super::notify::{Address, Inbox, Notification, Notifier};

/// Signal carrying [`Notification::Shot`]
pub const SHOT_SIGNAL: Signal = Signal::SIGUSR1;

/// Signal carrying [`Notification::Concede`]
pub const CONCEDE_SIGNAL: Signal = Signal::SIGUSR2;

/// Signals the duel protocol occupies
pub const DUEL_SIGNALS: [Signal; 2] = [SHOT_SIGNAL, CONCEDE_SIGNAL];

/// Map a notification kind onto its signal
pub fn signal_for(kind: Notification) -> Signal {
    match kind {
        Notification::Shot => SHOT_SIGNAL,
        Notification::Concede => CONCEDE_SIGNAL,
    }
}

fn duel_signal_set() -> SigSet {
    let mut set = SigSet::empty();
    for sig in DUEL_SIGNALS {
        set.add(sig);
    }
    set
}

/// Block both duel signals for the calling thread
///
/// Async-signal-safe, so it can run as a `pre_exec` hook between fork and
/// exec. The mask survives exec; pending signals wait for the unblock in
/// [`SignalInbox::install`].
pub fn block_duel_signals() -> io::Result<()> {
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&duel_signal_set()), None).map_err(io::Error::from)
}

/// Sends notifications to other processes with `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalNotifier;

impl Notifier for SignalNotifier {
    fn send(&self, target: Address, kind: Notification) {
        // pid <= 0 addresses process groups
        if target.as_raw() <= 0 {
            warn!(%target, %kind, "SignalNotifier::send: refusing non-process address");
            return;
        }

        let sig = signal_for(kind);
        match kill(Pid::from_raw(target.as_raw()), sig) {
            Ok(()) => debug!(%target, %kind, ?sig, "SignalNotifier::send: sent"),
            Err(Errno::ESRCH) => debug!(%target, %kind, "SignalNotifier::send: target is gone"),
            Err(e) => warn!(%target, %kind, error = %e, "SignalNotifier::send: kill failed"),
        }
    }
}

/// Receives SIGUSR1/SIGUSR2 as queued notifications
///
/// Creating the inbox replaces the default disposition of both signals
/// (terminate), so it must exist before the peer can possibly send.
pub struct SignalInbox {
    shot: tokio::signal::unix::Signal,
    concede: tokio::signal::unix::Signal,
}

impl SignalInbox {
    /// Register handlers for both duel signals. Must run inside a tokio runtime.
    pub fn install() -> Result<Self, DuelError> {
        debug!("SignalInbox::install: called");
        let shot = signal(SignalKind::user_defined1()).map_err(DuelError::SignalSetup)?;
        let concede = signal(SignalKind::user_defined2()).map_err(DuelError::SignalSetup)?;
        // Inherited from the spawning root; anything pending is delivered now
        sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&duel_signal_set()), None)
            .map_err(|e| DuelError::SignalSetup(e.into()))?;
        debug!("SignalInbox::install: handlers registered");
        Ok(Self { shot, concede })
    }
}

#[async_trait]
impl Inbox for SignalInbox {
    async fn recv(&mut self) -> Option<Notification> {
        tokio::select! {
            biased;
            concede = self.concede.recv() => concede.map(|_| Notification::Concede),
            shot = self.shot.recv() => shot.map(|_| Notification::Shot),
        }
    }
}

//! KREPS - two-process signal duel
//!
//! An initiator process spawns a challenger; both wait for a shared epoch and
//! then trade `Shot` notifications (SIGUSR1) until one is hit and concedes
//! (SIGUSR2). The process that started the duel reports the outcome; the
//! spawned one exits silently.
//!
//! # Modules
//!
//! - [`duel`] - notification channel, participant state machine, coordinator
//! - [`supervisor`] - pause / resume / stop of a supervised child
//! - [`shell`] - interactive command shell
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod duel;
pub mod shell;
pub mod supervisor;

// Re-export commonly used types
pub use config::{Config, DuelConfig};
pub use duel::{
    Address, ChallengerParams, DuelCoordinator, DuelEpoch, DuelError, DuelOutcome, DuelReport, Notification,
    Participant, ParticipantState, Role, Termination,
};
pub use supervisor::Supervisor;

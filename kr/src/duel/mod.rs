//! Two-process duel over POSIX signals
//!
//! An initiator spawns a challenger, both wait for a shared epoch, then trade
//! payload-less `Shot` notifications until one side is hit and concedes.

mod coordinator;
mod dice;
mod epoch;
mod error;
mod notify;
mod participant;
mod signal;

pub use coordinator::{
    CHALLENGER_SUBCOMMAND, ChallengerParams, DuelCoordinator, DuelOutcome, DuelReport, Termination, run_challenger,
    terminate,
};
pub use dice::{Dice, ScriptedDice, SeededDice};
pub use epoch::DuelEpoch;
pub use error::DuelError;
pub use notify::{Address, Delivery, Inbox, MemoryInbox, MemoryNetwork, Notification, Notifier};
pub use participant::{Participant, ParticipantState, Reaction, Role};
pub use signal::{
    CONCEDE_SIGNAL, DUEL_SIGNALS, SHOT_SIGNAL, SignalInbox, SignalNotifier, block_duel_signals, signal_for,
};

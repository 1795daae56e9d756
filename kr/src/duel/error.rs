//! Duel error types

use thiserror::Error;

/// Errors that abort a duel attempt
///
/// A send to a peer that is already gone is deliberately absent: the
/// notification channel treats it as a no-op.
#[derive(Debug, Error)]
pub enum DuelError {
    #[error("Failed to spawn challenger: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to register notification handlers: {0}")]
    SignalSetup(#[source] std::io::Error),

    #[error("Notification inbox closed before the duel ended")]
    InboxClosed,

    #[error("Invalid duel configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid challenger parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

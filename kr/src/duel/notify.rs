//! Notification channel
//!
//! Addressed, payload-less, fire-and-forget delivery of one of two
//! notification kinds. Senders never learn whether a notification arrived.
//! Receivers drain a per-process [`Inbox`] at well-defined points instead of
//! running handler code preemptively.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Identity of a participant process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub i32);

impl Address {
    /// Address of the calling process
    pub fn current() -> Self {
        Self(std::process::id() as i32)
    }

    pub fn as_raw(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two message kinds of the duel protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    /// The sender fired at the receiver
    Shot,
    /// The sender was hit; the receiver wins
    Concede,
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shot => write!(f, "shot"),
            Self::Concede => write!(f, "concede"),
        }
    }
}

/// Sending half of the channel
///
/// `send` returns immediately. Delivery is at most once, unordered and
/// unacknowledged; a target that does not exist swallows the notification.
pub trait Notifier: Send + Sync {
    fn send(&self, target: Address, kind: Notification);
}

/// Receiving half of the channel, owned by exactly one participant
///
/// `recv` must be cancel safe: participants race it against timers.
#[async_trait]
pub trait Inbox: Send {
    /// Wait for the next notification. `None` means nothing can arrive anymore.
    async fn recv(&mut self) -> Option<Notification>;
}

/// A single send recorded by [`MemoryNetwork`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub target: Address,
    pub kind: Notification,
    pub delivered: bool,
}

#[derive(Default)]
struct NetworkInner {
    routes: Mutex<HashMap<Address, mpsc::UnboundedSender<Notification>>>,
    log: Mutex<Vec<Delivery>>,
}

/// In-process notification network with deterministic delivery
///
/// Lets both participants of a duel run inside one runtime. Every send is
/// logged so callers can count exchanges after the fact.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address` and return its inbox
    pub fn join(&self, address: Address) -> MemoryInbox {
        debug!(%address, "MemoryNetwork::join: called");
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes().insert(address, tx);
        MemoryInbox { rx }
    }

    /// Drop the route to `address`, as if its process had exited
    pub fn leave(&self, address: Address) {
        debug!(%address, "MemoryNetwork::leave: called");
        self.routes().remove(&address);
    }

    /// All sends so far, in order
    pub fn sent(&self) -> Vec<Delivery> {
        self.inner.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of sends of `kind` so far
    pub fn count(&self, kind: Notification) -> usize {
        self.sent().iter().filter(|d| d.kind == kind).count()
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, HashMap<Address, mpsc::UnboundedSender<Notification>>> {
        self.inner.routes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Notifier for MemoryNetwork {
    fn send(&self, target: Address, kind: Notification) {
        let delivered = self
            .routes()
            .get(&target)
            .is_some_and(|tx| tx.send(kind).is_ok());
        debug!(%target, %kind, delivered, "MemoryNetwork::send: called");
        self.inner
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Delivery { target, kind, delivered });
    }
}

/// Inbox handed out by [`MemoryNetwork::join`]
pub struct MemoryInbox {
    rx: mpsc::UnboundedReceiver<Notification>,
}

#[async_trait]
impl Inbox for MemoryInbox {
    async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

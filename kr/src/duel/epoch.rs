//! Duel epoch: the shared start time
//!
//! Computed once by the initiator before the challenger exists and handed
//! over by value, so both sides agree on it without exchanging messages.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Wall-clock instant at which the duel begins, in whole milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelEpoch(u64);

impl DuelEpoch {
    /// Epoch `pre_delay` after `now`
    pub fn schedule(now: SystemTime, pre_delay: Duration) -> Self {
        let start = now + pre_delay;
        let millis = start.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
        debug!(millis, ?pre_delay, "DuelEpoch::schedule: called");
        Self(millis)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn start_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.0)
    }

    /// How long to wait from `now` before the duel starts
    ///
    /// An epoch that is already due yields `fallback` rather than zero.
    pub fn wait_from(&self, now: SystemTime, fallback: Duration) -> Duration {
        match self.start_at().duration_since(now) {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => {
                debug!(epoch = self.0, ?fallback, "DuelEpoch::wait_from: epoch passed, using fallback");
                fallback
            }
        }
    }
}

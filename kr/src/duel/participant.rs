//! Participant state machine
//!
//! One participant per process. All transitions happen in [`Participant::receive`]
//! and [`Participant::fire`]; [`Participant::run`] only decides when to call them.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use super::dice::{Dice, SeededDice};
use super::epoch::DuelEpoch;
use super::error::DuelError;
use super::notify::{Address, Inbox, Notification, Notifier};
use crate::config::DuelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Started the duel and spawned the peer
    Initiator,
    /// Spawned by the initiator
    Challenger,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Challenger => write!(f, "challenger"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    AwaitingStart,
    ReadyToFire,
    AwaitingResolution,
    Victor,
    Defeated,
}

impl ParticipantState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Victor | Self::Defeated)
    }
}

/// What a participant sends in response to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Survived the shot; shoot back
    Fire,
    /// Hit; tell the peer it won
    Concede,
    Nothing,
}

pub struct Participant {
    role: Role,
    self_address: Address,
    peer_address: Address,
    state: ParticipantState,
    dice: Box<dyn Dice>,
    config: DuelConfig,
    shots_fired: u32,
    shots_taken: u32,
    narrate: bool,
}

impl Participant {
    /// Create a participant with dice seeded from its own address
    pub fn new(role: Role, self_address: Address, peer_address: Address, config: DuelConfig) -> Self {
        debug!(%role, %self_address, %peer_address, "Participant::new: called");
        Self {
            role,
            self_address,
            peer_address,
            state: ParticipantState::AwaitingStart,
            dice: Box::new(SeededDice::for_address(self_address)),
            config,
            shots_fired: 0,
            shots_taken: 0,
            narrate: false,
        }
    }

    /// Replace the dice, e.g. with a scripted sequence
    pub fn with_dice(mut self, dice: impl Dice + 'static) -> Self {
        self.dice = Box::new(dice);
        self
    }

    /// Print a line to stdout for each protocol step
    pub fn with_narration(mut self, narrate: bool) -> Self {
        self.narrate = narrate;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn address(&self) -> Address {
        self.self_address
    }

    pub fn peer(&self) -> Address {
        self.peer_address
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn shots_fired(&self) -> u32 {
        self.shots_fired
    }

    pub fn shots_taken(&self) -> u32 {
        self.shots_taken
    }

    /// Shoot at the peer and wait for the result
    pub fn fire(&mut self, notifier: &dyn Notifier) {
        debug!(address = %self.self_address, peer = %self.peer_address, "Participant::fire: called");
        self.say("bang!");
        notifier.send(self.peer_address, Notification::Shot);
        self.shots_fired += 1;
        self.state = ParticipantState::AwaitingResolution;
    }

    /// Apply one incoming notification to the state and return what to send back
    ///
    /// Terminal participants ignore everything.
    pub fn handle(&mut self, kind: Notification) -> Reaction {
        debug!(address = %self.self_address, state = ?self.state, %kind, "Participant::handle: called");
        if self.state.is_terminal() {
            debug!("Participant::handle: terminal, ignoring");
            return Reaction::Nothing;
        }

        match kind {
            Notification::Shot => {
                self.shots_taken += 1;
                let roll = self.dice.roll();
                if roll < self.config.survival_probability {
                    debug!(roll, "Participant::handle: shot missed");
                    self.say("missed me, my turn");
                    self.state = ParticipantState::ReadyToFire;
                    Reaction::Fire
                } else {
                    debug!(roll, "Participant::handle: shot connected");
                    self.say("I'm hit");
                    self.state = ParticipantState::Defeated;
                    Reaction::Concede
                }
            }
            Notification::Concede => {
                self.say("victory");
                self.state = ParticipantState::Victor;
                Reaction::Nothing
            }
        }
    }

    /// Handle a notification and send the reaction
    pub fn receive(&mut self, kind: Notification, notifier: &dyn Notifier) {
        match self.handle(kind) {
            Reaction::Fire => self.fire(notifier),
            Reaction::Concede => notifier.send(self.peer_address, Notification::Concede),
            Reaction::Nothing => {}
        }
    }

    /// Play the duel from the epoch until a terminal state
    pub async fn run(
        &mut self,
        epoch: DuelEpoch,
        inbox: &mut dyn Inbox,
        notifier: &dyn Notifier,
    ) -> Result<ParticipantState, DuelError> {
        info!(role = %self.role, address = %self.self_address, peer = %self.peer_address, epoch = epoch.as_millis(), "Participant::run: in position");
        self.say("in position");

        let fallback = self.config.units(self.config.fallback_delay);
        let start = Instant::now() + epoch.wait_from(SystemTime::now(), fallback);
        self.wait_until(start, inbox, notifier).await?;
        if self.state == ParticipantState::AwaitingStart {
            self.state = ParticipantState::ReadyToFire;
            self.say("ready to fire");
        }

        // A shot received while waiting may already have made us fire
        if self.state == ParticipantState::ReadyToFire {
            let jitter = self.dice.jitter() * self.config.max_jitter;
            let fire_at = Instant::now() + self.config.units(self.config.ready_delay + jitter);
            debug!(jitter, "Participant::run: scheduled first shot");
            self.wait_until(fire_at, inbox, notifier).await?;
            if self.state == ParticipantState::ReadyToFire {
                self.fire(notifier);
            }
        }

        while !self.state.is_terminal() {
            let kind = inbox.recv().await.ok_or(DuelError::InboxClosed)?;
            self.receive(kind, notifier);
        }

        info!(role = %self.role, state = ?self.state, shots_fired = self.shots_fired, shots_taken = self.shots_taken, "Participant::run: duel over");
        Ok(self.state)
    }

    /// Sleep until `deadline`, handling notifications as they arrive
    ///
    /// Returns early once a terminal state is reached.
    async fn wait_until(
        &mut self,
        deadline: Instant,
        inbox: &mut dyn Inbox,
        notifier: &dyn Notifier,
    ) -> Result<(), DuelError> {
        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);
        while !self.state.is_terminal() {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                kind = inbox.recv() => {
                    let kind = kind.ok_or(DuelError::InboxClosed)?;
                    self.receive(kind, notifier);
                }
            }
        }
        Ok(())
    }

    fn say(&self, line: &str) {
        if self.narrate {
            println!("[{}]: {}", self.self_address, line);
        }
    }
}

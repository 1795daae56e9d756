//! Duel coordinator
//!
//! Bootstraps a duel from the root process: opens the inbox, fixes the epoch,
//! spawns the challenger with explicit parameters and plays the initiator.
//! Also hosts the challenger's entry point and the identity-keyed rule that
//! decides how a finished participant leaves.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::epoch::DuelEpoch;
use super::error::DuelError;
use super::notify::{Address, Inbox};
use super::participant::{Participant, ParticipantState, Role};
use super::signal::{SignalInbox, SignalNotifier, block_duel_signals};
use crate::config::DuelConfig;

/// Subcommand the challenger process is started with
pub const CHALLENGER_SUBCOMMAND: &str = "challenger";

/// How a duel ended for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelOutcome {
    Victor,
    Defeated,
    /// Cancelled before either side won
    Aborted,
}

impl From<ParticipantState> for DuelOutcome {
    fn from(state: ParticipantState) -> Self {
        match state {
            ParticipantState::Victor => Self::Victor,
            ParticipantState::Defeated => Self::Defeated,
            _ => Self::Aborted,
        }
    }
}

impl std::fmt::Display for DuelOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Victor => write!(f, "victory"),
            Self::Defeated => write!(f, "defeat"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// What the root process hands back to its caller once the duel is over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelReport {
    pub outcome: DuelOutcome,
    pub role: Role,
    pub opponent: Address,
    pub shots_fired: u32,
    pub shots_taken: u32,
    pub message: String,
}

impl DuelReport {
    fn from_participant(participant: &Participant, outcome: DuelOutcome) -> Self {
        let message = format!(
            "Duel concluded: {} against {} ({} fired, {} taken)",
            outcome,
            participant.peer(),
            participant.shots_fired(),
            participant.shots_taken()
        );
        Self {
            outcome,
            role: participant.role(),
            opponent: participant.peer(),
            shots_fired: participant.shots_fired(),
            shots_taken: participant.shots_taken(),
            message,
        }
    }
}

impl std::fmt::Display for DuelReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// How a finished participant leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The root surfaces the result to whoever started the duel
    Report(DuelReport),
    /// Any other process exits with status 0 and says nothing
    ExitSilently,
}

/// Decide termination from identity alone; the outcome plays no part
pub fn terminate(self_address: Address, root: Address, report: DuelReport) -> Termination {
    debug!(%self_address, %root, outcome = %report.outcome, "terminate: called");
    if self_address == root {
        Termination::Report(report)
    } else {
        Termination::ExitSilently
    }
}

/// Everything the challenger needs, passed on its command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengerParams {
    /// The initiator, which the challenger shoots at
    pub peer: Address,
    /// Process that started the duel session
    pub root: Address,
    pub epoch: DuelEpoch,
    pub config: DuelConfig,
    /// Print protocol steps to the inherited stdout
    #[serde(default)]
    pub narrate: bool,
}

impl ChallengerParams {
    pub fn encode(&self) -> Result<String, DuelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, DuelError> {
        let params: Self = serde_json::from_str(raw)?;
        params.config.validate()?;
        Ok(params)
    }
}

/// Runs duels with the calling process as root and initiator
pub struct DuelCoordinator {
    config: DuelConfig,
    root: Address,
    program: PathBuf,
    narrate: bool,
}

impl DuelCoordinator {
    /// Coordinator that re-runs the current executable as challenger
    pub fn new(config: DuelConfig) -> Result<Self, DuelError> {
        debug!("DuelCoordinator::new: called");
        config.validate()?;
        let program = std::env::current_exe().map_err(DuelError::Spawn)?;
        Ok(Self {
            config,
            root: Address::current(),
            program,
            narrate: false,
        })
    }

    /// Use a different executable for the challenger
    ///
    /// It must accept `challenger --params <json>`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_narration(mut self, narrate: bool) -> Self {
        self.narrate = narrate;
        self
    }

    pub fn root(&self) -> Address {
        self.root
    }

    /// Run one duel to completion
    pub async fn spawn_duel(&self) -> Result<DuelReport, DuelError> {
        self.spawn_duel_until(std::future::pending()).await
    }

    /// Run one duel, giving up with [`DuelOutcome::Aborted`] once `shutdown` resolves
    ///
    /// The challenger is killed if it is still alive when this returns.
    pub async fn spawn_duel_until(&self, shutdown: impl Future<Output = ()>) -> Result<DuelReport, DuelError> {
        debug!(program = ?self.program, "DuelCoordinator::spawn_duel_until: called");
        let me = Address::current();

        // Handlers go in before the challenger exists
        let mut inbox = SignalInbox::install()?;

        let epoch = DuelEpoch::schedule(SystemTime::now(), self.config.units(self.config.pre_delay));
        let params = ChallengerParams {
            peer: me,
            root: self.root,
            epoch,
            config: self.config.clone(),
            narrate: self.narrate,
        };

        let mut child = self.spawn_challenger(&params)?;
        let challenger = child
            .id()
            .map(|pid| Address(pid as i32))
            .ok_or_else(|| DuelError::Spawn(std::io::Error::other("challenger exited before it was addressed")))?;
        info!(%challenger, epoch = epoch.as_millis(), "Challenger spawned");

        let mut participant =
            Participant::new(Role::Initiator, me, challenger, self.config.clone()).with_narration(self.narrate);

        // None: the challenger left before the duel resolved
        let outcome = tokio::select! {
            biased;
            state = participant.run(epoch, &mut inbox, &SignalNotifier) => Some(DuelOutcome::from(state?)),
            _ = shutdown => {
                warn!(%challenger, "Duel aborted by shutdown request");
                Some(DuelOutcome::Aborted)
            }
            status = child.wait() => {
                warn!(%challenger, ?status, "Challenger exited mid-duel");
                None
            }
        };
        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                let grace = self.config.units(self.config.fallback_delay);
                settle(&mut participant, &mut inbox, grace).await
            }
        };

        self.reap(&mut child, outcome).await;

        let report = DuelReport::from_participant(&participant, outcome);
        info!(outcome = %report.outcome, "Duel concluded");
        Ok(report)
    }

    fn spawn_challenger(&self, params: &ChallengerParams) -> Result<Child, DuelError> {
        let encoded = params.encode()?;
        debug!(%encoded, "DuelCoordinator::spawn_challenger: called");
        let stdout = if self.narrate { Stdio::inherit() } else { Stdio::null() };
        let mut command = Command::new(&self.program);
        command
            .arg(CHALLENGER_SUBCOMMAND)
            .arg("--params")
            .arg(encoded)
            .stdin(Stdio::null())
            .stdout(stdout)
            .kill_on_drop(true);
        // The challenger unblocks them once its inbox exists
        unsafe {
            command.pre_exec(block_duel_signals);
        }
        command.spawn().map_err(DuelError::Spawn)
    }

    /// Wait for the challenger to leave, killing it after the grace period
    async fn reap(&self, child: &mut Child, outcome: DuelOutcome) {
        if outcome != DuelOutcome::Aborted {
            let grace = self.config.units(self.config.reap_grace);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(?status, "DuelCoordinator::reap: challenger exited");
                    return;
                }
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for challenger"),
                Err(_) => warn!(?grace, "Challenger outlived the duel, killing it"),
            }
        }
        if let Err(e) = child.kill().await {
            debug!(error = %e, "DuelCoordinator::reap: kill failed (already gone?)");
        }
    }
}

/// Take whatever the departed challenger sent on its way out
///
/// A concede can still be queued when its sender's exit is noticed. Anything
/// short of a terminal state within `grace` counts as aborted.
async fn settle(participant: &mut Participant, inbox: &mut dyn Inbox, grace: Duration) -> DuelOutcome {
    let drain = async {
        while !participant.state().is_terminal() {
            match inbox.recv().await {
                Some(kind) => participant.receive(kind, &SignalNotifier),
                None => break,
            }
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        debug!(state = ?participant.state(), "settle: nothing more from the challenger");
    }
    DuelOutcome::from(participant.state())
}

/// Entry point of a spawned challenger process
///
/// `inbox` must be installed before anything else the process does. The
/// caller acts on the returned [`Termination`]; for a challenger that is
/// always a silent exit.
pub async fn run_challenger(params: ChallengerParams, mut inbox: SignalInbox) -> Result<Termination, DuelError> {
    let me = Address::current();
    debug!(%me, peer = %params.peer, "run_challenger: called");

    let mut participant =
        Participant::new(Role::Challenger, me, params.peer, params.config.clone()).with_narration(params.narrate);
    let state = participant.run(params.epoch, &mut inbox, &SignalNotifier).await?;

    let report = DuelReport::from_participant(&participant, DuelOutcome::from(state));
    Ok(terminate(me, params.root, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: DuelOutcome) -> DuelReport {
        DuelReport {
            outcome,
            role: Role::Initiator,
            opponent: Address(2),
            shots_fired: 1,
            shots_taken: 1,
            message: "Duel concluded".to_string(),
        }
    }

    #[test]
    fn test_root_reports_regardless_of_outcome() {
        for outcome in [DuelOutcome::Victor, DuelOutcome::Defeated] {
            let termination = terminate(Address(10), Address(10), report(outcome));
            assert_eq!(termination, Termination::Report(report(outcome)));
        }
    }

    #[test]
    fn test_spawned_participant_exits_silently_regardless_of_outcome() {
        for outcome in [DuelOutcome::Victor, DuelOutcome::Defeated] {
            let termination = terminate(Address(11), Address(10), report(outcome));
            assert_eq!(termination, Termination::ExitSilently);
        }
    }

    #[test]
    fn test_challenger_params_preserve_epoch() {
        let params = ChallengerParams {
            peer: Address(100),
            root: Address(100),
            epoch: DuelEpoch::schedule(SystemTime::now(), Duration::from_secs(3)),
            config: DuelConfig::default(),
            narrate: false,
        };
        let decoded = ChallengerParams::decode(&params.encode().unwrap()).unwrap();
        assert_eq!(decoded.epoch.as_millis(), params.epoch.as_millis());
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_challenger_params_reject_garbage() {
        assert!(matches!(
            ChallengerParams::decode("{not json"),
            Err(DuelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_challenger_params_reject_invalid_config() {
        let mut params = ChallengerParams {
            peer: Address(1),
            root: Address(1),
            epoch: DuelEpoch::from_millis(0),
            config: DuelConfig::default(),
            narrate: false,
        };
        params.config.time_unit_ms = 0;
        let raw = params.encode().unwrap();
        assert!(matches!(ChallengerParams::decode(&raw), Err(DuelError::InvalidConfig(_))));
    }

    #[test]
    fn test_outcome_from_state() {
        assert_eq!(DuelOutcome::from(ParticipantState::Victor), DuelOutcome::Victor);
        assert_eq!(DuelOutcome::from(ParticipantState::Defeated), DuelOutcome::Defeated);
        assert_eq!(DuelOutcome::from(ParticipantState::ReadyToFire), DuelOutcome::Aborted);
    }

    #[test]
    fn test_report_message_names_outcome() {
        let p = Participant::new(Role::Initiator, Address(1), Address(2), DuelConfig::default());
        let report = DuelReport::from_participant(&p, DuelOutcome::Victor);
        assert!(report.message.starts_with("Duel concluded: victory against 2"));
        assert_eq!(report.to_string(), report.message);
    }

    #[test]
    fn test_coordinator_rejects_invalid_config() {
        let config = DuelConfig {
            survival_probability: 1.5,
            ..Default::default()
        };
        assert!(matches!(DuelCoordinator::new(config), Err(DuelError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let coordinator = DuelCoordinator::new(DuelConfig::default())
            .unwrap()
            .with_program("/nonexistent/kreps-challenger");
        let result = coordinator.spawn_duel().await;
        assert!(matches!(result, Err(DuelError::Spawn(_))));
    }
}

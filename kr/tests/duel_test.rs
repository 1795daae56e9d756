//! In-process duels over the memory network
//!
//! Both participants share one runtime and a deterministic notification
//! network, so shot counts and winners can be asserted exactly.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use kreps::config::DuelConfig;
use kreps::duel::{
    Address, DuelEpoch, MemoryNetwork, Notification, Notifier, Participant, ParticipantState, Role, ScriptedDice,
};

const INITIATOR: Address = Address(1001);
const CHALLENGER: Address = Address(1002);

const MISS: f64 = 0.1;
const HIT: f64 = 0.9;

fn fast_config() -> DuelConfig {
    DuelConfig {
        time_unit_ms: 50,
        ..Default::default()
    }
}

/// Play a duel where the initiator always shoots first.
///
/// `rolls[i]` decides shot `i + 1`. Odd shots land on the challenger, even
/// shots on the initiator.
async fn play(rolls: &[f64]) -> (Participant, Participant, MemoryNetwork) {
    let initiator_rolls: Vec<f64> = rolls.iter().skip(1).step_by(2).copied().collect();
    let challenger_rolls: Vec<f64> = rolls.iter().step_by(2).copied().collect();

    let net = MemoryNetwork::new();
    let mut initiator_inbox = net.join(INITIATOR);
    let mut challenger_inbox = net.join(CHALLENGER);

    let mut initiator = Participant::new(Role::Initiator, INITIATOR, CHALLENGER, fast_config())
        .with_dice(ScriptedDice::new(initiator_rolls).with_jitter(0.0));
    let mut challenger = Participant::new(Role::Challenger, CHALLENGER, INITIATOR, fast_config())
        .with_dice(ScriptedDice::new(challenger_rolls).with_jitter(0.9));

    let epoch = DuelEpoch::schedule(SystemTime::now(), Duration::from_millis(50));
    let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(
            initiator.run(epoch, &mut initiator_inbox, &net),
            challenger.run(epoch, &mut challenger_inbox, &net),
        )
    })
    .await
    .expect("duel did not finish");
    a.unwrap();
    b.unwrap();

    (initiator, challenger, net)
}

/// Notes when each shot leaves and concedes to the first one
struct ConcedingPeer {
    net: MemoryNetwork,
    shots: Mutex<Vec<Instant>>,
}

impl ConcedingPeer {
    fn new(net: MemoryNetwork) -> Self {
        Self {
            net,
            shots: Mutex::new(Vec::new()),
        }
    }

    fn shots(&self) -> Vec<Instant> {
        self.shots.lock().unwrap().clone()
    }
}

impl Notifier for ConcedingPeer {
    fn send(&self, target: Address, kind: Notification) {
        if kind == Notification::Shot {
            self.shots.lock().unwrap().push(Instant::now());
            self.net.send(INITIATOR, Notification::Concede);
        }
        self.net.send(target, kind);
    }
}

/// Run a lone initiator against a peer that concedes, returning when it fired
/// relative to `started`
async fn first_shot_delay(config: DuelConfig, epoch: DuelEpoch, started: Instant) -> Duration {
    let net = MemoryNetwork::new();
    let mut inbox = net.join(INITIATOR);
    let _peer_inbox = net.join(CHALLENGER);
    let peer = ConcedingPeer::new(net.clone());
    let mut initiator = Participant::new(Role::Initiator, INITIATOR, CHALLENGER, config)
        .with_dice(ScriptedDice::default().with_jitter(0.5));

    let state = tokio::time::timeout(Duration::from_secs(5), initiator.run(epoch, &mut inbox, &peer))
        .await
        .expect("participant did not finish")
        .unwrap();
    assert_eq!(state, ParticipantState::Victor);

    let shots = peer.shots();
    assert_eq!(shots.len(), 1);
    shots[0] - started
}

fn assert_one_winner(a: &Participant, b: &Participant) {
    let states = [a.state(), b.state()];
    assert!(states.contains(&ParticipantState::Victor), "no victor: {:?}", states);
    assert!(states.contains(&ParticipantState::Defeated), "no loser: {:?}", states);
}

#[tokio::test]
async fn test_first_hit_ends_duel_after_one_exchange() {
    let (initiator, challenger, net) = play(&[HIT]).await;

    assert_eq!(challenger.state(), ParticipantState::Defeated);
    assert_eq!(initiator.state(), ParticipantState::Victor);
    assert_eq!(net.count(Notification::Shot), 1);
    assert_eq!(net.count(Notification::Concede), 1);
}

#[tokio::test]
async fn test_miss_then_hit_scenario() {
    let (initiator, challenger, net) = play(&[MISS, HIT]).await;

    assert_eq!(net.count(Notification::Shot), 2);
    // The second shot landed on the initiator
    assert_eq!(initiator.state(), ParticipantState::Defeated);
    assert_eq!(challenger.state(), ParticipantState::Victor);
    assert_eq!(challenger.shots_fired(), 1);
    assert_eq!(initiator.shots_taken(), 1);
}

#[tokio::test]
async fn test_k_misses_take_k_plus_one_shots() {
    for k in 0..5 {
        let mut rolls = vec![MISS; k];
        rolls.push(HIT);
        let (initiator, challenger, net) = play(&rolls).await;

        assert_eq!(net.count(Notification::Shot), k + 1, "k = {}", k);
        assert_one_winner(&initiator, &challenger);

        let loser = if (k + 1) % 2 == 1 { &challenger } else { &initiator };
        assert_eq!(loser.state(), ParticipantState::Defeated, "k = {}", k);
    }
}

#[tokio::test]
async fn test_concede_goes_to_the_winner() {
    let (initiator, _challenger, net) = play(&[MISS, MISS, HIT]).await;

    let concedes: Vec<_> = net.sent().into_iter().filter(|d| d.kind == Notification::Concede).collect();
    assert_eq!(concedes.len(), 1);
    assert_eq!(concedes[0].target, INITIATOR);
    assert!(concedes[0].delivered);
    assert_eq!(initiator.state(), ParticipantState::Victor);
}

#[tokio::test]
async fn test_concede_to_vanished_peer_is_silent() {
    let net = MemoryNetwork::new();
    let mut inbox = net.join(INITIATOR);
    let mut initiator = Participant::new(Role::Initiator, INITIATOR, CHALLENGER, fast_config())
        .with_dice(ScriptedDice::new([HIT]));

    // A shot is already queued and the challenger is gone
    net.send(INITIATOR, Notification::Shot);

    let epoch = DuelEpoch::schedule(SystemTime::now(), Duration::from_millis(50));
    let state = initiator.run(epoch, &mut inbox, &net).await.unwrap();

    assert_eq!(state, ParticipantState::Defeated);
    let last = net.sent().last().copied().unwrap();
    assert_eq!(last.kind, Notification::Concede);
    assert!(!last.delivered);
}

#[tokio::test]
async fn test_concede_during_fallback_wait_wins() {
    let net = MemoryNetwork::new();
    let mut inbox = net.join(INITIATOR);
    let _peer = net.join(CHALLENGER);
    let config = fast_config();
    let fallback = config.units(config.fallback_delay);
    let ready = config.units(config.ready_delay);
    let mut initiator =
        Participant::new(Role::Initiator, INITIATOR, CHALLENGER, config).with_dice(ScriptedDice::default());

    // Epoch long gone, so the participant sits in the fallback wait
    let epoch = DuelEpoch::from_millis(0);
    net.send(INITIATOR, Notification::Concede);
    let started = std::time::Instant::now();
    let state = initiator.run(epoch, &mut inbox, &net).await.unwrap();

    // The queued concede is handled during the fallback wait
    assert_eq!(state, ParticipantState::Victor);
    assert!(started.elapsed() < fallback + ready);
    assert_eq!(net.count(Notification::Shot), 0);
}

#[tokio::test]
async fn test_first_shot_waits_ready_delay_after_epoch() {
    let config = DuelConfig {
        time_unit_ms: 100,
        ..Default::default()
    };
    let earliest = config.units(config.pre_delay + config.ready_delay);
    let latest = earliest + config.units(config.max_jitter);

    let started = Instant::now();
    let epoch = DuelEpoch::schedule(SystemTime::now(), config.units(config.pre_delay));
    let fired = first_shot_delay(config, epoch, started).await;

    // Epoch millis are truncated, so allow it to sit a hair early
    assert!(fired + Duration::from_millis(2) >= earliest, "fired after {:?}", fired);
    assert!(fired < latest, "fired after {:?}", fired);
}

#[tokio::test]
async fn test_missed_epoch_waits_fallback_delay_before_firing() {
    let config = DuelConfig {
        time_unit_ms: 100,
        ..Default::default()
    };
    let earliest = config.units(config.fallback_delay + config.ready_delay);
    let latest = earliest + config.units(config.max_jitter);

    let started = Instant::now();
    let fired = first_shot_delay(config, DuelEpoch::from_millis(0), started).await;

    assert!(fired >= earliest, "fired after {:?}", fired);
    assert!(fired < latest, "fired after {:?}", fired);
}

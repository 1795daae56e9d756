//! Real duels between this test process (root) and a spawned `kreps challenger`
//!
//! Kept to a single test: every signal inbox in a process sees every duel
//! signal, so concurrent duels in one test binary would hear each other.

use std::time::Duration;

use kreps::config::DuelConfig;
use kreps::duel::{Address, DuelCoordinator, DuelOutcome, Role};

#[tokio::test]
async fn test_root_duels_against_spawned_challenger() {
    let config = DuelConfig {
        time_unit_ms: 100,
        ..Default::default()
    };
    let coordinator = DuelCoordinator::new(config)
        .unwrap()
        .with_program(env!("CARGO_BIN_EXE_kreps"));
    assert_eq!(coordinator.root(), Address::current());

    let report = tokio::time::timeout(Duration::from_secs(60), coordinator.spawn_duel())
        .await
        .expect("duel did not finish")
        .unwrap();

    assert!(matches!(report.outcome, DuelOutcome::Victor | DuelOutcome::Defeated));
    assert_eq!(report.role, Role::Initiator);
    assert_ne!(report.opponent, Address::current());
    assert!(report.shots_fired >= 1 || report.shots_taken >= 1);
    assert!(report.message.starts_with("Duel concluded"));

    // A shutdown request that is already due aborts before any shot
    let report = coordinator.spawn_duel_until(async {}).await.unwrap();
    assert_eq!(report.outcome, DuelOutcome::Aborted);
    assert_eq!(report.shots_fired, 0);
    assert_eq!(report.shots_taken, 0);
}

//! Randomness for the duel
//!
//! Two independent draws per participant: the pre-fire jitter and the roll
//! that decides whether an incoming shot connects.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::notify::Address;

pub trait Dice: Send {
    /// Fraction of the maximum pre-fire jitter, in `[0, 1)`
    fn jitter(&mut self) -> f64;

    /// Survival roll for an incoming shot, in `[0, 1)`
    fn roll(&mut self) -> f64;
}

/// Pseudo-random dice seeded from the owning process's address
///
/// Both participants start from the same program image; seeding from the
/// address keeps their sequences apart.
pub struct SeededDice {
    rng: StdRng,
}

impl SeededDice {
    pub fn for_address(address: Address) -> Self {
        debug!(%address, "SeededDice::for_address: called");
        Self::from_seed(address.as_raw() as u64)
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Dice for SeededDice {
    fn jitter(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn roll(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Dice that replay a fixed sequence
///
/// Once the rolls run out every further roll is `1.0`, which always hits.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    jitter: f64,
    rolls: VecDeque<f64>,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self {
            jitter: 0.0,
            rolls: rolls.into_iter().collect(),
        }
    }

    /// Use a fixed jitter fraction for every fire
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl Dice for ScriptedDice {
    fn jitter(&mut self) -> f64 {
        self.jitter
    }

    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_dice_stay_in_unit_interval() {
        let mut dice = SeededDice::from_seed(99);
        for _ in 0..1000 {
            let j = dice.jitter();
            let r = dice.roll();
            assert!((0.0..1.0).contains(&j));
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn test_same_address_same_sequence() {
        let mut a = SeededDice::for_address(Address(4242));
        let mut b = SeededDice::for_address(Address(4242));
        let xs: Vec<f64> = (0..16).map(|_| a.roll()).collect();
        let ys: Vec<f64> = (0..16).map(|_| b.roll()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_distinct_addresses_diverge() {
        let mut a = SeededDice::for_address(Address(4242));
        let mut b = SeededDice::for_address(Address(4243));
        let xs: Vec<f64> = (0..16).map(|_| a.roll()).collect();
        let ys: Vec<f64> = (0..16).map(|_| b.roll()).collect();
        assert!(xs.iter().zip(&ys).all(|(x, y)| x != y));
    }

    #[test]
    fn test_scripted_dice_replay_then_hit() {
        let mut dice = ScriptedDice::new([0.1, 0.2]).with_jitter(0.5);
        assert_eq!(dice.jitter(), 0.5);
        assert_eq!(dice.roll(), 0.1);
        assert_eq!(dice.roll(), 0.2);
        assert_eq!(dice.remaining(), 0);
        assert_eq!(dice.roll(), 1.0);
    }
}

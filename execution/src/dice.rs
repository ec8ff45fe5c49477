//! Replayable dice.
//!
//! Every roll draws from a ChaCha stream keyed by the match seed and the roll's
//! position in the match, so a match can be replayed from its seed and the
//! action log alone.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use wagerhall_types::constants::DICE_COUNT;
use wagerhall_types::Die;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiceRoller {
    seed: u64,
}

impl DiceRoller {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng(&self, seat: u8, round: u32, roll: u8) -> ChaCha20Rng {
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&self.seed.to_be_bytes());
        key[8] = seat;
        key[9..13].copy_from_slice(&round.to_be_bytes());
        key[13] = roll;
        ChaCha20Rng::from_seed(key)
    }

    /// Re-roll every die that is not held.
    pub fn roll(&self, dice: &mut [Die; DICE_COUNT], seat: u8, round: u32, roll: u8) {
        let mut rng = self.rng(seat, round, roll);
        for die in dice.iter_mut() {
            // Draw for every die so held dice don't shift later values.
            let value = rng.gen_range(1..=6u8);
            if !die.held {
                die.value = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_position_same_dice() {
        let roller = DiceRoller::new(99);
        let mut a = [Die::default(); DICE_COUNT];
        let mut b = [Die::default(); DICE_COUNT];
        roller.roll(&mut a, 1, 4, 2);
        roller.roll(&mut b, 1, 4, 2);
        assert_eq!(a, b);
        assert!(a.iter().all(|die| (1..=6).contains(&die.value)));
    }

    #[test]
    fn held_dice_keep_their_value() {
        let roller = DiceRoller::new(7);
        let mut dice = [Die::default(); DICE_COUNT];
        roller.roll(&mut dice, 0, 1, 1);
        dice[0].held = true;
        dice[3].held = true;
        let before = dice;
        for roll in 2..=3 {
            roller.roll(&mut dice, 0, 1, roll);
            assert_eq!(dice[0], before[0]);
            assert_eq!(dice[3], before[3]);
        }
    }

    #[test]
    fn positions_produce_distinct_streams() {
        let roller = DiceRoller::new(1);
        let sequences: Vec<[Die; DICE_COUNT]> = (1..=20u32)
            .map(|round| {
                let mut dice = [Die::default(); DICE_COUNT];
                roller.roll(&mut dice, 0, round, 1);
                dice
            })
            .collect();
        let first = sequences[0];
        assert!(sequences.iter().any(|dice| *dice != first));
    }
}

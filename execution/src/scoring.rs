//! Pure Yahtzee category scoring.

use wagerhall_types::constants::{
    CATEGORY_COUNT, FULL_HOUSE_SCORE, LARGE_STRAIGHT_SCORE, SMALL_STRAIGHT_SCORE, YAHTZEE_SCORE,
};
use wagerhall_types::{Category, Dice};

/// Occurrences of each face; index 0 collects anything outside 1..=6.
pub fn face_counts(dice: &Dice) -> [u8; 7] {
    let mut counts = [0u8; 7];
    for &value in dice {
        let slot = if (1..=6).contains(&value) { value } else { 0 };
        counts[slot as usize] += 1;
    }
    counts
}

/// Bitmask with bit `f` set when face `f` is present.
fn faces_present(counts: &[u8; 7]) -> u8 {
    (1..=6).fold(0u8, |mask, face| {
        if counts[face] > 0 {
            mask | (1 << face)
        } else {
            mask
        }
    })
}

fn run_mask(start: u8, len: u8) -> u8 {
    (start..start + len).fold(0u8, |mask, face| mask | (1 << face))
}

fn contains_run(present: u8, len: u8) -> bool {
    (1..=7 - len).any(|start| {
        let run = run_mask(start, len);
        present & run == run
    })
}

fn sum(dice: &Dice) -> u32 {
    dice.iter()
        .filter(|value| (1..=6).contains(*value))
        .map(|&value| value as u32)
        .sum()
}

/// Score `dice` in `category`. Order independent; never panics.
pub fn score(dice: &Dice, category: Category) -> u32 {
    let counts = face_counts(dice);
    let modal = counts[1..].iter().copied().max().unwrap_or(0);
    match category {
        Category::Ones
        | Category::Twos
        | Category::Threes
        | Category::Fours
        | Category::Fives
        | Category::Sixes => {
            let face = category as u8 + 1;
            counts[face as usize] as u32 * face as u32
        }
        Category::ThreeOfAKind if modal >= 3 => sum(dice),
        Category::FourOfAKind if modal >= 4 => sum(dice),
        Category::FullHouse => {
            let has_three = counts[1..].contains(&3);
            let has_pair = counts[1..].contains(&2);
            if has_three && has_pair {
                FULL_HOUSE_SCORE
            } else {
                0
            }
        }
        Category::SmallStraight if contains_run(faces_present(&counts), 4) => SMALL_STRAIGHT_SCORE,
        Category::LargeStraight if contains_run(faces_present(&counts), 5) => LARGE_STRAIGHT_SCORE,
        Category::Yahtzee if modal == 5 => YAHTZEE_SCORE,
        Category::Chance => sum(dice),
        _ => 0,
    }
}

/// Score of `dice` in every category, indexed by [`Category::index`].
pub fn score_all(dice: &Dice) -> [u32; CATEGORY_COUNT] {
    Category::ALL.map(|category| score(dice, category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn upper_section_counts_matching_faces() {
        let dice = [3, 3, 5, 3, 1];
        assert_eq!(score(&dice, Category::Threes), 9);
        assert_eq!(score(&dice, Category::Ones), 1);
        assert_eq!(score(&dice, Category::Sixes), 0);
    }

    #[test]
    fn kinds_need_modal_count() {
        assert_eq!(score(&[4, 4, 4, 2, 1], Category::ThreeOfAKind), 15);
        assert_eq!(score(&[4, 4, 4, 2, 1], Category::FourOfAKind), 0);
        assert_eq!(score(&[6, 6, 6, 6, 2], Category::FourOfAKind), 26);
        assert_eq!(score(&[6, 6, 6, 6, 6], Category::ThreeOfAKind), 30);
    }

    #[test]
    fn full_house_requires_exact_split() {
        assert_eq!(score(&[2, 2, 5, 5, 5], Category::FullHouse), FULL_HOUSE_SCORE);
        assert_eq!(score(&[5, 5, 5, 5, 5], Category::FullHouse), 0);
        assert_eq!(score(&[5, 5, 5, 5, 2], Category::FullHouse), 0);
    }

    #[test]
    fn straights() {
        assert_eq!(score(&[1, 2, 3, 4, 6], Category::SmallStraight), SMALL_STRAIGHT_SCORE);
        assert_eq!(score(&[3, 4, 5, 6, 6], Category::SmallStraight), SMALL_STRAIGHT_SCORE);
        assert_eq!(score(&[1, 2, 3, 5, 6], Category::SmallStraight), 0);
        assert_eq!(score(&[2, 3, 4, 5, 6], Category::LargeStraight), LARGE_STRAIGHT_SCORE);
        assert_eq!(score(&[2, 3, 4, 5, 6], Category::SmallStraight), SMALL_STRAIGHT_SCORE);
        assert_eq!(score(&[1, 2, 3, 4, 4], Category::LargeStraight), 0);
    }

    #[test]
    fn yahtzee_and_chance() {
        assert_eq!(score(&[2, 2, 2, 2, 2], Category::Yahtzee), YAHTZEE_SCORE);
        assert_eq!(score(&[2, 2, 2, 2, 3], Category::Yahtzee), 0);
        assert_eq!(score(&[2, 2, 2, 2, 3], Category::Chance), 11);
    }

    #[test]
    fn unrolled_dice_score_zero() {
        assert_eq!(score_all(&[0; 5]), [0; CATEGORY_COUNT]);
        assert_eq!(score(&[9, 9, 9, 9, 9], Category::Yahtzee), 0);
    }

    proptest! {
        #[test]
        fn order_does_not_matter(dice in prop::array::uniform5(1u8..=6), seed in any::<u64>()) {
            let mut shuffled = dice;
            let rotate = (seed % 5) as usize;
            shuffled.rotate_left(rotate);
            if seed & 1 == 1 {
                shuffled.reverse();
            }
            prop_assert_eq!(score_all(&dice), score_all(&shuffled));
        }

        #[test]
        fn chance_bounds_every_sum_category(dice in prop::array::uniform5(1u8..=6)) {
            let chance = score(&dice, Category::Chance);
            prop_assert!((5..=30).contains(&chance));
            prop_assert!(score(&dice, Category::ThreeOfAKind) <= chance);
            prop_assert!(score(&dice, Category::FourOfAKind) <= chance);
        }
    }
}

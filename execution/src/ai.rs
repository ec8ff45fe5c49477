//! Heuristic bot player for Yahtzee.
//!
//! Decisions come from a fixed priority cascade over the current hand; no
//! lookahead or expected-value tables. The same inputs always produce the same
//! decision.

use crate::scoring::{face_counts, score};
use wagerhall_types::constants::{DICE_COUNT, MAX_ROLLS};
use wagerhall_types::{Category, Dice, PlayerScoreboard};

/// What the bot wants to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Hold the marked dice and roll the rest.
    Hold([bool; DICE_COUNT]),
    /// Finalize a category.
    Score(Category),
}

/// Hands scored the moment they appear.
const MADE_HANDS: [Category; 3] = [
    Category::Yahtzee,
    Category::LargeStraight,
    Category::FullHouse,
];

/// Preferred categories when forced to score.
const FORCED_PREFERENCE: [Category; 4] = [
    Category::Yahtzee,
    Category::LargeStraight,
    Category::FullHouse,
    Category::SmallStraight,
];

/// Categories given up first when nothing scores.
const SACRIFICES: [Category; 3] = [Category::Ones, Category::Twos, Category::Threes];

/// Straight windows: the three small-straight runs, then the two
/// large-straight runs.
const RUNS: [&[u8]; 5] = [
    &[1, 2, 3, 4],
    &[2, 3, 4, 5],
    &[3, 4, 5, 6],
    &[1, 2, 3, 4, 5],
    &[2, 3, 4, 5, 6],
];

pub fn decide(dice: &Dice, roll_count: u8, scoreboard: &PlayerScoreboard) -> Decision {
    if roll_count == 0 {
        return Decision::Hold([false; DICE_COUNT]);
    }
    if roll_count >= MAX_ROLLS {
        return Decision::Score(forced_category(dice, scoreboard));
    }
    if let Some(category) = MADE_HANDS
        .into_iter()
        .find(|category| scoreboard.is_open(*category) && score(dice, *category) > 0)
    {
        return Decision::Score(category);
    }
    if !scoreboard
        .open_categories()
        .any(|category| score(dice, category) > 0)
    {
        return Decision::Score(forced_category(dice, scoreboard));
    }
    Decision::Hold(hold_pattern(dice))
}

/// Category to score when no further roll is taken.
pub fn forced_category(dice: &Dice, scoreboard: &PlayerScoreboard) -> Category {
    let open = |category: &Category| scoreboard.is_open(*category);

    if let Some(category) = FORCED_PREFERENCE
        .into_iter()
        .find(|category| open(category) && score(dice, *category) > 0)
    {
        return category;
    }

    // Highest positive score; earlier categories win ties.
    let best = scoreboard
        .open_categories()
        .map(|category| (score(dice, category), category))
        .filter(|(points, _)| *points > 0)
        .fold(None, |best: Option<(u32, Category)>, candidate| match best {
            Some(current) if current.0 >= candidate.0 => Some(current),
            _ => Some(candidate),
        });
    if let Some((_, category)) = best {
        return category;
    }

    if let Some(category) = SACRIFICES.into_iter().find(open) {
        return category;
    }
    scoreboard.open_categories().next().unwrap_or(Category::Chance)
}

/// Dice to keep for the next roll.
pub fn hold_pattern(dice: &Dice) -> [bool; DICE_COUNT] {
    let counts = face_counts(dice);
    let modal_face = modal_face(&counts);
    let modal_count = modal_face.map(|face| counts[face as usize]).unwrap_or(0);
    let is_full_house = counts[1..].contains(&3) && counts[1..].contains(&2);

    // Three or more of a kind outside a full house.
    if modal_count >= 3 && !is_full_house {
        if let Some(face) = modal_face {
            return keep_faces(dice, &[face], false);
        }
    }
    if is_full_house {
        return [true; DICE_COUNT];
    }
    if let Some(run) = best_run(&counts, 4) {
        return keep_faces(dice, &run, true);
    }
    if let Some(run) = best_run(&counts, 3) {
        return keep_faces(dice, &run, true);
    }
    if modal_count == 2 {
        if let Some(face) = modal_face {
            return keep_faces(dice, &[face], false);
        }
    }
    dice.map(|value| value >= 4)
}

/// Face with the highest count; higher faces win ties.
fn modal_face(counts: &[u8; 7]) -> Option<u8> {
    (1..=6u8)
        .rev()
        .max_by_key(|face| (counts[*face as usize], *face))
        .filter(|face| counts[*face as usize] > 0)
}

/// Faces of the straight window with the most faces present, at least
/// `members` of them and at most one missing. Ties go to a fully present
/// small straight, then to the higher faces.
fn best_run(counts: &[u8; 7], members: usize) -> Option<Vec<u8>> {
    RUNS.iter()
        .filter(|window| window.len() <= members + 1)
        .map(|window| {
            let present = window
                .iter()
                .copied()
                .filter(|face| counts[*face as usize] > 0)
                .collect::<Vec<_>>();
            let complete = present.len() == window.len();
            (present, complete)
        })
        .filter(|(present, _)| present.len() >= members)
        .max_by_key(|(present, complete)| {
            let sum: u32 = present.iter().map(|face| u32::from(*face)).sum();
            (present.len(), *complete, sum)
        })
        .map(|(present, _)| present)
}

/// Hold dice showing any of `faces`; with `once`, at most one die per face.
fn keep_faces(dice: &Dice, faces: &[u8], once: bool) -> [bool; DICE_COUNT] {
    let mut held = [false; DICE_COUNT];
    let mut taken = [false; 7];
    for (index, value) in dice.iter().enumerate() {
        if !faces.contains(value) {
            continue;
        }
        let slot = *value as usize;
        if once && taken[slot] {
            continue;
        }
        taken[slot] = true;
        held[index] = true;
    }
    held
}

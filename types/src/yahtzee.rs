//! Yahtzee hands, categories and scoreboards.

use crate::constants::{
    CATEGORY_COUNT, DICE_COUNT, UNSET_SLOT, UPPER_BONUS, UPPER_BONUS_THRESHOLD,
};
use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Face values of a five-dice hand (each 1..=6 once rolled).
pub type Dice = [u8; DICE_COUNT];

/// Scoring categories, upper section first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    Ones = 0,
    Twos = 1,
    Threes = 2,
    Fours = 3,
    Fives = 4,
    Sixes = 5,
    ThreeOfAKind = 6,
    FourOfAKind = 7,
    FullHouse = 8,
    SmallStraight = 9,
    LargeStraight = 10,
    Yahtzee = 11,
    Chance = 12,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Ones,
        Category::Twos,
        Category::Threes,
        Category::Fours,
        Category::Fives,
        Category::Sixes,
        Category::ThreeOfAKind,
        Category::FourOfAKind,
        Category::FullHouse,
        Category::SmallStraight,
        Category::LargeStraight,
        Category::Yahtzee,
        Category::Chance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn is_upper(self) -> bool {
        self.index() < 6
    }

    /// Face counted by an upper-section category.
    pub fn face(self) -> Option<u8> {
        self.is_upper().then(|| self as u8 + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ones => "ones",
            Category::Twos => "twos",
            Category::Threes => "threes",
            Category::Fours => "fours",
            Category::Fives => "fives",
            Category::Sixes => "sixes",
            Category::ThreeOfAKind => "three_of_a_kind",
            Category::FourOfAKind => "four_of_a_kind",
            Category::FullHouse => "full_house",
            Category::SmallStraight => "small_straight",
            Category::LargeStraight => "large_straight",
            Category::Yahtzee => "yahtzee",
            Category::Chance => "chance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or(())
    }
}

impl Write for Category {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Category {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        Self::from_index(value).ok_or(Error::InvalidEnum(value))
    }
}

impl FixedSize for Category {
    const SIZE: usize = 1;
}

/// A single die on the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Die {
    /// 0 until the first roll of the turn, then 1..=6.
    pub value: u8,
    pub held: bool,
}

/// Per-player turn progress, mutated by every Yahtzee sub-action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnState {
    pub round: u32,
    pub roll_count: u8,
    pub dice: [Die; DICE_COUNT],
    pub is_completed: bool,
}

impl TurnState {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            roll_count: 0,
            dice: [Die::default(); DICE_COUNT],
            is_completed: false,
        }
    }

    pub fn values(&self) -> Dice {
        self.dice.map(|die| die.value)
    }

    pub fn holds(&self) -> [bool; DICE_COUNT] {
        self.dice.map(|die| die.held)
    }

    /// Start a fresh turn in `round`, clearing dice and holds.
    pub fn reset(&mut self, round: u32) {
        *self = Self::new(round);
    }
}

/// Thirteen write-once category slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerScoreboard {
    slots: [Option<u32>; CATEGORY_COUNT],
}

impl PlayerScoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> Option<u32> {
        self.slots[category.index()]
    }

    pub fn is_open(&self, category: Category) -> bool {
        self.get(category).is_none()
    }

    /// Finalize `category`. Returns false (and leaves the slot alone) when it
    /// was already written.
    pub fn record(&mut self, category: Category, score: u32) -> bool {
        let slot = &mut self.slots[category.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(score);
        true
    }

    pub fn open_categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(|category| self.is_open(*category))
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled() == CATEGORY_COUNT
    }

    pub fn upper_subtotal(&self) -> u32 {
        self.slots[..6].iter().flatten().sum()
    }

    pub fn lower_subtotal(&self) -> u32 {
        self.slots[6..].iter().flatten().sum()
    }

    /// Derived from the upper subtotal on every read, never stored.
    pub fn upper_bonus(&self) -> u32 {
        if self.upper_subtotal() >= UPPER_BONUS_THRESHOLD {
            UPPER_BONUS
        } else {
            0
        }
    }

    pub fn total(&self) -> u32 {
        self.upper_subtotal() + self.upper_bonus() + self.lower_subtotal()
    }

    /// Wire form: finalized scores, `-1` for unset slots.
    pub fn to_wire(&self) -> [i32; CATEGORY_COUNT] {
        self.slots
            .map(|slot| slot.map(|score| score as i32).unwrap_or(UNSET_SLOT))
    }

    pub fn from_wire(wire: [i32; CATEGORY_COUNT]) -> Option<Self> {
        let mut slots = [None; CATEGORY_COUNT];
        for (slot, value) in slots.iter_mut().zip(wire) {
            *slot = match value {
                UNSET_SLOT => None,
                v if v >= 0 => Some(v as u32),
                _ => return None,
            };
        }
        Some(Self { slots })
    }
}

#[derive(Serialize)]
struct ScoreboardView {
    slots: [i32; CATEGORY_COUNT],
    upper_subtotal: u32,
    upper_bonus: u32,
    total: u32,
}

impl Serialize for PlayerScoreboard {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ScoreboardView {
            slots: self.to_wire(),
            upper_subtotal: self.upper_subtotal(),
            upper_bonus: self.upper_bonus(),
            total: self.total(),
        }
        .serialize(serializer)
    }
}

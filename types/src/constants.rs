//! Game and money constants shared across the workspace.

/// Dice in a Yahtzee hand.
pub const DICE_COUNT: usize = 5;

/// Rolls allowed per Yahtzee turn.
pub const MAX_ROLLS: u8 = 3;

/// Categories on a Yahtzee scoreboard.
pub const CATEGORY_COUNT: usize = 13;

/// Upper section subtotal required for the bonus.
pub const UPPER_BONUS_THRESHOLD: u32 = 63;
pub const UPPER_BONUS: u32 = 35;

pub const FULL_HOUSE_SCORE: u32 = 25;
pub const SMALL_STRAIGHT_SCORE: u32 = 30;
pub const LARGE_STRAIGHT_SCORE: u32 = 40;
pub const YAHTZEE_SCORE: u32 = 50;

/// Wire sentinel for an unset scoreboard slot.
pub const UNSET_SLOT: i32 = -1;

/// Denominator for fee rates expressed in basis points.
pub const BASIS_POINTS: u64 = 10_000;

/// Default platform fee (5%).
pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 500;

/// Upper bound on the platform fee (50%).
pub const MAX_PLATFORM_FEE_BPS: u16 = 5_000;

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_YAHTZEE_PLAYERS: u8 = 8;
pub const CHESS_PLAYERS: u8 = 2;

/// Largest entry fee (minor units) a match may charge.
pub const MAX_ENTRY_FEE: u64 = 100_000_000;

/// Maximum length of a host platform user id.
pub const MAX_USER_ID_LENGTH: usize = 64;

/// Maximum rows in an encoded match result.
pub const MAX_RESULT_ROWS: usize = MAX_YAHTZEE_PLAYERS as usize;

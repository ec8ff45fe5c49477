use crate::chess::{Promotion, Square};
use crate::constants::DICE_COUNT;
use crate::matches::{GameType, UserId};
use crate::yahtzee::Category;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForfeitReason {
    /// Turn timer expired.
    Timeout,
    /// Player walked away mid-match.
    Left,
}

/// Everything a participant (or the system on their behalf) can do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Roll,
    ToggleHold { die: u8 },
    SetHolds { pattern: [bool; DICE_COUNT] },
    Score { category: Category },
    Move {
        from: Square,
        to: Square,
        #[serde(default)]
        promotion: Option<Promotion>,
    },
    Resign,
    Forfeit { reason: ForfeitReason },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Roll => "roll",
            Action::ToggleHold { .. } => "toggle_hold",
            Action::SetHolds { .. } => "set_holds",
            Action::Score { .. } => "score",
            Action::Move { .. } => "move",
            Action::Resign => "resign",
            Action::Forfeit { .. } => "forfeit",
        }
    }

    /// Game the action belongs to; `None` for game-agnostic actions.
    pub fn game_type(&self) -> Option<GameType> {
        match self {
            Action::Roll
            | Action::ToggleHold { .. }
            | Action::SetHolds { .. }
            | Action::Score { .. } => Some(GameType::Yahtzee),
            Action::Move { .. } => Some(GameType::Chess),
            Action::Resign | Action::Forfeit { .. } => None,
        }
    }

    /// Resign and forfeit may be issued out of turn.
    pub fn ends_participation(&self) -> bool {
        matches!(self, Action::Resign | Action::Forfeit { .. })
    }
}

/// Client or system submission of an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub actor: UserId,
    pub action: Action,
    /// Rejected as stale when the match has moved past this version.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl ActionRequest {
    pub fn new(actor: UserId, action: Action) -> Self {
        Self {
            actor,
            action,
            expected_version: None,
        }
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

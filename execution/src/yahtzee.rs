//! Multiplayer Yahtzee state and rules.

use crate::dice::DiceRoller;
use crate::scoring;
use crate::validator::MoveValidator;
use serde::Serialize;
use wagerhall_types::constants::{DICE_COUNT, MAX_ROLLS};
use wagerhall_types::{Action, Category, PlayerScoreboard, TurnState, ValidationError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct YahtzeeSeat {
    pub scoreboard: PlayerScoreboard,
    pub turn: TurnState,
    /// Set when the participant forfeits; their card is frozen.
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct YahtzeeState {
    pub current_seat: u8,
    pub round: u32,
    pub seats: Vec<YahtzeeSeat>,
}

impl YahtzeeState {
    pub fn new(players: u8) -> Self {
        Self {
            current_seat: 0,
            round: 1,
            seats: (0..players)
                .map(|_| YahtzeeSeat {
                    scoreboard: PlayerScoreboard::new(),
                    turn: TurnState::new(1),
                    active: true,
                })
                .collect(),
        }
    }

    pub fn seat(&self, seat: u8) -> Option<&YahtzeeSeat> {
        self.seats.get(seat as usize)
    }

    pub fn current(&self) -> Option<&YahtzeeSeat> {
        self.seat(self.current_seat)
    }

    fn current_mut(&mut self) -> Option<&mut YahtzeeSeat> {
        self.seats.get_mut(self.current_seat as usize)
    }

    pub fn active_seats(&self) -> usize {
        self.seats.iter().filter(|seat| seat.active).count()
    }

    /// Every active card is full.
    pub fn is_finished(&self) -> bool {
        self.seats
            .iter()
            .filter(|seat| seat.active)
            .all(|seat| seat.scoreboard.is_complete())
    }

    /// Apply an already validated dice or scoring action.
    pub fn apply(&mut self, roller: &DiceRoller, action: &Action) {
        let seat_index = self.current_seat;
        let Some(seat) = self.current_mut() else {
            return;
        };
        match action {
            Action::Roll => {
                if seat.turn.roll_count == 0 {
                    seat.turn.dice.iter_mut().for_each(|die| die.held = false);
                }
                seat.turn.roll_count += 1;
                roller.roll(
                    &mut seat.turn.dice,
                    seat_index,
                    seat.turn.round,
                    seat.turn.roll_count,
                );
            }
            Action::ToggleHold { die } => {
                if let Some(die) = seat.turn.dice.get_mut(*die as usize) {
                    die.held = !die.held;
                }
            }
            Action::SetHolds { pattern } => {
                for (die, held) in seat.turn.dice.iter_mut().zip(pattern) {
                    die.held = *held;
                }
            }
            Action::Score { category } => {
                let points = scoring::score(&seat.turn.values(), *category);
                seat.scoreboard.record(*category, points);
                seat.turn.is_completed = true;
                self.advance();
            }
            Action::Move { .. } | Action::Resign | Action::Forfeit { .. } => {}
        }
    }

    /// Freeze `seat`'s card. Passes the turn on when it was theirs.
    pub fn forfeit(&mut self, seat: u8) {
        let Some(entry) = self.seats.get_mut(seat as usize) else {
            return;
        };
        entry.active = false;
        if seat == self.current_seat && self.active_seats() > 0 {
            self.advance();
        }
    }

    /// Pass the turn round-robin to the next active seat with an open
    /// category; wrapping past the last seat starts a new round. The turn
    /// stays put when no such seat remains.
    fn advance(&mut self) {
        let count = self.seats.len() as u8;
        let mut next = self.current_seat;
        let mut wrapped = 0;
        let found = (0..count).any(|_| {
            next = (next + 1) % count;
            if next == 0 {
                wrapped += 1;
            }
            let candidate = &self.seats[next as usize];
            candidate.active && !candidate.scoreboard.is_complete()
        });
        if !found {
            return;
        }
        self.current_seat = next;
        self.round += wrapped;
        let round = self.round;
        if let Some(seat) = self.current_mut() {
            seat.turn.reset(round);
        }
    }
}

pub struct YahtzeeValidator;

impl MoveValidator for YahtzeeValidator {
    type State = YahtzeeState;

    fn validate(&self, state: &YahtzeeState, seat: u8, action: &Action) -> Result<(), ValidationError> {
        if seat != state.current_seat {
            return Err(ValidationError::NotYourTurn);
        }
        let Some(current) = state.current() else {
            return Err(ValidationError::NotAParticipant);
        };
        let turn = &current.turn;
        match action {
            Action::Roll if turn.roll_count >= MAX_ROLLS => Err(ValidationError::NoRollRemaining),
            Action::Roll => Ok(()),
            Action::ToggleHold { die } if *die as usize >= DICE_COUNT => {
                Err(ValidationError::UnknownDie(*die))
            }
            Action::ToggleHold { .. } | Action::SetHolds { .. } | Action::Score { .. }
                if turn.roll_count == 0 =>
            {
                Err(ValidationError::MustRollFirst)
            }
            Action::Score { category } if !current.scoreboard.is_open(*category) => {
                Err(ValidationError::CategoryAlreadyUsed(*category))
            }
            _ => Ok(()),
        }
    }
}

/// Category a stalled bot falls back to.
pub fn first_open(seat: &YahtzeeSeat) -> Option<Category> {
    seat.scoreboard.open_categories().next()
}

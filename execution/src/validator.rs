use wagerhall_types::{Action, ValidationError};

/// Game-specific legality check for an action by the participant in `seat`.
///
/// Runs before any mutation; a rejection leaves state untouched. Turn
/// ownership is checked here because it differs per game.
pub trait MoveValidator {
    type State;

    fn validate(&self, state: &Self::State, seat: u8, action: &Action)
        -> Result<(), ValidationError>;
}

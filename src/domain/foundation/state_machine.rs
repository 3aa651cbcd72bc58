//! Transition table shared by status enums such as
//! [`InvitationStatus`](crate::domain::call::InvitationStatus).

use super::ValidationError;

/// A status enum whose legal moves are listed by [`valid_transitions`].
///
/// [`valid_transitions`]: StateMachine::valid_transitions
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Every status reachable in one step from `self`.
    fn valid_transitions(&self) -> Vec<Self>;

    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Returns `target` if the move is legal.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if !self.can_transition_to(&target) {
            return Err(ValidationError::invalid_format(
                "status",
                format!("{:?} cannot move to {:?}", self, target),
            ));
        }
        Ok(target)
    }

    /// No outgoing moves.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

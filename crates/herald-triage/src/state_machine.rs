//! Item state machine with validated transitions.
//!
//! Open -> Acted
//! Open -> Skipped
//!
//! Both targets are terminal. The store enforces the same rule with
//! conditional writes; this check lets callers fail fast without side
//! effects.

use uuid::Uuid;

use herald_core::types::ItemState;

use crate::error::TriageError;

/// Validate that `internal_id` may move from `from` to `to`.
pub fn validate_transition(
    internal_id: Uuid,
    from: ItemState,
    to: ItemState,
) -> Result<(), TriageError> {
    let valid = matches!(
        (from, to),
        (ItemState::Open, ItemState::Acted) | (ItemState::Open, ItemState::Skipped)
    );

    if valid {
        Ok(())
    } else if from.is_terminal() {
        Err(TriageError::AlreadyTerminal {
            internal_id,
            state: from,
        })
    } else {
        Err(TriageError::Validation(format!(
            "invalid state transition: {} -> {}",
            from, to
        )))
    }
}

use thiserror::Error;

use crate::window::BookingPhase;

/// Domain outcomes reported synchronously to the caller.
///
/// Everything except `Store` is an expected, recoverable result the UI
/// layer maps to a specific message. `Store` wraps persistence failures,
/// which are retryable and distinct from the domain taxonomy.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("booking window is closed (slot is in the {0} phase)")]
    WindowClosed(BookingPhase),

    #[error("slot is at capacity")]
    SlotFull,

    #[error("member already holds an active reservation for this slot")]
    AlreadyReserved,

    #[error("no active reservation or waiting list entry found")]
    NotFound,

    #[error("waiting list is only available once a slot is full, and only once per member")]
    NotEligible,

    #[error("staff accounts cannot book slots")]
    PermissionDenied,

    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),
}

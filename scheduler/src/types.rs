//! Shared types for the auto-reservation subsystem.

use std::sync::Arc;

use booking::manager::BookingManager;
use booking::model::MemberId;

/// Outcome of one `check_and_run` invocation for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoReserveOutcome {
    /// Preconditions were not met; nothing was written.
    Skipped(SkipReason),
    /// The batch ran (possibly booking nobody) and the executed flag is
    /// now set.
    Executed { reserved: Vec<MemberId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownSlot,
    PriorityDisabled,
    AutoReserveDisabled,
    AlreadyExecuted,
    OutsidePriorityWindow,
}

/// Manager handle shared between the engine and its callers.
pub type SharedBookingManager<S> = Arc<BookingManager<S>>;

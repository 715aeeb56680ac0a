//! Decides which booking phase a slot is in and whether a given actor
//! tier may reserve during that phase.
//
//  This module is deliberately pure: no clocks, no IO. Callers pass `now`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::model::{MemberTier, Slot};

/// Booking phase of a slot at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingPhase {
    /// The access window has not opened yet.
    NotOpen,
    /// First half of the access window, reserved for priority members.
    Priority,
    /// Anyone but staff may book.
    Open,
    /// The slot has ended.
    Passed,
}

impl fmt::Display for BookingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingPhase::NotOpen => "not_open",
            BookingPhase::Priority => "priority",
            BookingPhase::Open => "open",
            BookingPhase::Passed => "passed",
        };
        f.write_str(s)
    }
}

/// Compute the booking phase of `slot` at `now`.
///
/// The priority cutoff is exactly half the access window; at exactly the
/// cutoff the phase is already `Open`. With `priority_enabled = false`
/// the window opens straight into `Open`.
pub fn phase(slot: &Slot, now: DateTime<Utc>) -> BookingPhase {
    if now > slot.end {
        return BookingPhase::Passed;
    }

    let until = slot.start - now;
    let window = Duration::hours(slot.access_opens_hours);

    if until > window {
        return BookingPhase::NotOpen;
    }

    if slot.priority_enabled && until > window / 2 {
        return BookingPhase::Priority;
    }

    BookingPhase::Open
}

/// Whether an actor of `tier` may reserve a spot in `slot` at `now`.
///
/// Staff never book; ordinary members are shut out of the priority phase.
pub fn can_reserve(tier: MemberTier, slot: &Slot, now: DateTime<Utc>) -> bool {
    if tier == MemberTier::Staff {
        return false;
    }

    match phase(slot, now) {
        BookingPhase::NotOpen | BookingPhase::Passed => false,
        BookingPhase::Priority => tier == MemberTier::Priority,
        BookingPhase::Open => true,
    }
}

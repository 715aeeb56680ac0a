//! Determines whether a member's preference record makes them an
//! auto-reservation candidate for a given slot.
//
//  This module is deliberately pure: no async, no IO. Members already
//  holding a reservation are excluded later, inside the manager's
//  critical section, where that check is race-free.

use booking::model::{MemberBookingPreference, MemberTier, Slot};

/// Result of a candidate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoReserveEligibility {
    Eligible,
    NotPriorityTier,
    OptedOut,
    CategoryMismatch,
}

impl AutoReserveEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, AutoReserveEligibility::Eligible)
    }
}

/// Check whether `pref` qualifies its member for automatic booking into
/// `slot`.
///
/// This enforces:
///   - priority tier only
///   - explicit opt-in
///   - category preference (`None` is a wildcard matching every slot)
pub fn check_member_eligibility(
    pref: &MemberBookingPreference,
    slot: &Slot,
) -> AutoReserveEligibility {
    if pref.tier != MemberTier::Priority {
        return AutoReserveEligibility::NotPriorityTier;
    }

    if !pref.auto_reserve_enabled {
        return AutoReserveEligibility::OptedOut;
    }

    if !pref.matches_category(&slot.category) {
        return AutoReserveEligibility::CategoryMismatch;
    }

    AutoReserveEligibility::Eligible
}

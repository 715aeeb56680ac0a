use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

pub type SlotId = uuid::Uuid;
pub type MemberId = uuid::Uuid;

/// Actor classification supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberTier {
    Ordinary,
    Priority,
    Staff,
}

impl fmt::Display for MemberTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberTier::Ordinary => "Ordinary",
            MemberTier::Priority => "Priority",
            MemberTier::Staff => "Staff",
        };
        f.write_str(s)
    }
}

impl FromStr for MemberTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ordinary" => Ok(MemberTier::Ordinary),
            "Priority" => Ok(MemberTier::Priority),
            "Staff" => Ok(MemberTier::Staff),
            other => Err(anyhow::anyhow!("invalid MemberTier value: {}", other)),
        }
    }
}

/// A bookable, time-boxed class instance.
///
/// All fields except `auto_reserve_executed` are owned by the staff-facing
/// CRUD and reach the core through [`upsert_slot`]. The executed flag is
/// monotonic: once flipped it never goes back to `false`.
///
/// [`upsert_slot`]: crate::manager::BookingManager::upsert_slot
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: SlotId,

    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Maximum number of simultaneously active reservations.
    pub capacity: u32,

    /// Hours before `start` at which the booking window opens.
    pub access_opens_hours: i64,

    pub priority_enabled: bool,
    pub auto_reserve_enabled: bool,
    pub auto_reserve_executed: bool,

    /// Opaque tag matched against member category preferences.
    pub category: String,
}

/// A member's claim on one spot in one slot.
///
/// Re-booking after a cancellation reactivates the existing record rather
/// than inserting a second row, so (slot, member) stays unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: uuid::Uuid,
    pub slot_id: SlotId,
    pub member_id: MemberId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// A member's place in line for a full slot.
///
/// Positions grow monotonically per slot and are never compacted or
/// reused after an entry deactivates.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingListEntry {
    pub id: uuid::Uuid,
    pub slot_id: SlotId,
    pub member_id: MemberId,
    pub position: u32,
    pub active: bool,
}

/// Per-member opt-in state for the auto-reservation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberBookingPreference {
    pub member_id: MemberId,
    pub tier: MemberTier,
    pub auto_reserve_enabled: bool,
    /// `None` matches every slot category.
    pub preferred_category: Option<String>,
}

impl MemberBookingPreference {
    pub fn matches_category(&self, category: &str) -> bool {
        match self.preferred_category.as_deref() {
            Some(preferred) => preferred == category,
            None => true,
        }
    }
}

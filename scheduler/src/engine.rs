//! The auto-reservation engine.
//!
//! For each trigger tick (per slot), it:
//!   1. Gates on the slot's flags and its booking phase.
//!   2. Filters the preference snapshot through `eligibility`.
//!   3. Orders candidates deterministically via `selection`.
//!   4. Hands the batch to the manager, which excludes already-booked
//!      members, caps at availability, books, and flips the executed
//!      flag under the slot lock.
//!
//! The external trigger may call `check_and_run` as often as it likes;
//! the manager's compare-and-set makes the batch run at most once per
//! slot, including across restarts and concurrent triggers.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use booking::error::BookingError;
use booking::model::{MemberId, SlotId};
use booking::store::BookingStore;
use booking::window::{BookingPhase, phase};

use super::eligibility::check_member_eligibility;
use super::selection::order_candidates;
use super::types::{AutoReserveOutcome, SharedBookingManager, SkipReason};

pub struct AutoReserveEngine<S: BookingStore> {
    manager: SharedBookingManager<S>,
}

impl<S: BookingStore> AutoReserveEngine<S> {
    pub fn new(manager: SharedBookingManager<S>) -> Self {
        Self { manager }
    }

    /// Handle one trigger tick for `slot_id` at `now`.
    pub async fn check_and_run(
        &self,
        slot_id: SlotId,
        now: DateTime<Utc>,
    ) -> Result<AutoReserveOutcome, BookingError> {
        let Some(slot) = self.manager.get_slot(slot_id).await else {
            debug!(slot_id = %slot_id, "unknown slot, skipping");
            return Ok(AutoReserveOutcome::Skipped(SkipReason::UnknownSlot));
        };

        if !slot.priority_enabled {
            return Ok(AutoReserveOutcome::Skipped(SkipReason::PriorityDisabled));
        }
        if !slot.auto_reserve_enabled {
            return Ok(AutoReserveOutcome::Skipped(SkipReason::AutoReserveDisabled));
        }
        if slot.auto_reserve_executed {
            return Ok(AutoReserveOutcome::Skipped(SkipReason::AlreadyExecuted));
        }
        if phase(&slot, now) != BookingPhase::Priority {
            debug!(slot_id = %slot_id, "slot not in its priority window, skipping");
            return Ok(AutoReserveOutcome::Skipped(SkipReason::OutsidePriorityWindow));
        }

        let prefs = self.manager.preferences_snapshot().await;
        let candidates: Vec<MemberId> = prefs
            .iter()
            .filter(|p| check_member_eligibility(p, &slot).is_eligible())
            .map(|p| p.member_id)
            .collect();
        let candidates = order_candidates(candidates);

        debug!(
            slot_id = %slot_id,
            candidates = candidates.len(),
            "running auto-reservation batch"
        );

        match self.manager.run_auto_reserve(slot_id, &candidates, now).await? {
            // A concurrent trigger flipped the flag between the snapshot
            // above and the locked batch path.
            None => Ok(AutoReserveOutcome::Skipped(SkipReason::AlreadyExecuted)),
            Some(reserved) => {
                info!(
                    slot_id = %slot_id,
                    reserved = reserved.len(),
                    candidates = candidates.len(),
                    "auto-reservation run complete"
                );
                Ok(AutoReserveOutcome::Executed { reserved })
            }
        }
    }
}

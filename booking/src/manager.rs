//! The stateful booking core: capacity ledger and waiting list.
//!
//! Responsibilities:
//! - Own the live Reservation and WaitingListEntry sets and persist every
//!   mutation through a [`BookingStore`].
//! - Enforce the capacity invariant and the one-active-reservation-per-
//!   member rule on `reserve`.
//! - Promote the longest-waiting member inside `cancel`'s critical
//!   section, so a freed spot cannot be raced away before promotion.
//! - Execute the auto-reservation batch path behind a compare-and-set on
//!   `auto_reserve_executed`.
//!
//! Non-responsibilities:
//! - Deciding auto-reservation candidates (the scheduler engine does).
//! - Delivering notifications (intents go out on a channel, fire and
//!   forget).
//!
//! Every mutating operation on a slot runs under that slot's mutex, so
//! all critical sections are short and bounded and two operations on
//! different slots never contend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::logger::warn_if_slow;

use crate::error::BookingError;
use crate::model::{
    MemberBookingPreference, MemberId, MemberTier, Reservation, Slot, SlotId, WaitingListEntry,
};
use crate::notify::{NotificationIntent, NotificationSender};
use crate::store::BookingStore;
use crate::window::{can_reserve, phase};

const STORE_SLOW: Duration = Duration::from_millis(250);

pub struct BookingManager<S: BookingStore> {
    slots: Arc<Mutex<HashMap<SlotId, Slot>>>,
    reservations: Arc<Mutex<HashMap<SlotId, Vec<Reservation>>>>,
    waiting_lists: Arc<Mutex<HashMap<SlotId, Vec<WaitingListEntry>>>>,
    preferences: Arc<Mutex<HashMap<MemberId, MemberBookingPreference>>>,

    /// One mutex per slot, created on first use. Serializes every
    /// mutating operation that touches the same slot.
    slot_locks: Arc<Mutex<HashMap<SlotId, Arc<Mutex<()>>>>>,

    store: Arc<S>,
    notify_tx: NotificationSender,
}

impl<S: BookingStore> BookingManager<S> {
    /// Initialize a fresh manager from the store.
    pub async fn new(store: Arc<S>, notify_tx: NotificationSender) -> Result<Self, BookingError> {
        let manager = Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            reservations: Arc::new(Mutex::new(HashMap::new())),
            waiting_lists: Arc::new(Mutex::new(HashMap::new())),
            preferences: Arc::new(Mutex::new(HashMap::new())),
            slot_locks: Arc::new(Mutex::new(HashMap::new())),
            store,
            notify_tx,
        };

        manager.restore_from_store().await?;
        Ok(manager)
    }

    /// Load all persisted records and rebuild the in-memory sets.
    async fn restore_from_store(&self) -> Result<(), BookingError> {
        let slots = warn_if_slow("load_slots", STORE_SLOW, self.store.load_slots()).await?;
        let reservations =
            warn_if_slow("load_reservations", STORE_SLOW, self.store.load_reservations()).await?;
        let waiting =
            warn_if_slow("load_waiting_list", STORE_SLOW, self.store.load_waiting_list()).await?;
        let prefs =
            warn_if_slow("load_preferences", STORE_SLOW, self.store.load_preferences()).await?;

        {
            let mut guard = self.slots.lock().await;
            for slot in slots {
                guard.insert(slot.id, slot);
            }
        }
        {
            let mut guard = self.reservations.lock().await;
            for r in reservations {
                guard.entry(r.slot_id).or_default().push(r);
            }
        }
        {
            let mut guard = self.waiting_lists.lock().await;
            for e in waiting {
                guard.entry(e.slot_id).or_default().push(e);
            }
        }
        {
            let mut guard = self.preferences.lock().await;
            for p in prefs {
                guard.insert(p.member_id, p);
            }
        }

        Ok(())
    }

    async fn slot_lock(&self, slot_id: SlotId) -> Arc<Mutex<()>> {
        let mut guard = self.slot_locks.lock().await;
        guard.entry(slot_id).or_default().clone()
    }

    async fn slot_snapshot(&self, slot_id: SlotId) -> Option<Slot> {
        self.slots.lock().await.get(&slot_id).cloned()
    }

    /// Fire-and-forget emission toward the notification dispatcher.
    /// Dispatch problems never roll back a committed booking.
    fn emit(&self, intent: NotificationIntent) {
        if let Err(e) = self.notify_tx.try_send(intent) {
            warn!(error = %e, "dropping notification intent");
        }
    }

    /// Reserve a spot for `member_id` in `slot_id`.
    ///
    /// Fails with `PermissionDenied` for staff, `AlreadyReserved` on a
    /// duplicate active booking, `SlotFull` at capacity, and
    /// `WindowClosed` outside the phase permitted for `tier`. Emits a
    /// `SlotFull` intent when this call takes the last spot.
    pub async fn reserve(
        &self,
        member_id: MemberId,
        tier: MemberTier,
        slot_id: SlotId,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let lock = self.slot_lock(slot_id).await;
        let _guard = lock.lock().await;

        if tier == MemberTier::Staff {
            return Err(BookingError::PermissionDenied);
        }

        let slot = self
            .slot_snapshot(slot_id)
            .await
            .ok_or(BookingError::NotFound)?;

        let (already_reserved, active) = {
            let guard = self.reservations.lock().await;
            let list = guard.get(&slot_id);
            let already = list.is_some_and(|v| {
                v.iter().any(|r| r.member_id == member_id && r.active)
            });
            let active = list.map_or(0, |v| v.iter().filter(|r| r.active).count()) as u32;
            (already, active)
        };

        if already_reserved {
            return Err(BookingError::AlreadyReserved);
        }
        if active >= slot.capacity {
            return Err(BookingError::SlotFull);
        }
        if !can_reserve(tier, &slot, now) {
            return Err(BookingError::WindowClosed(phase(&slot, now)));
        }

        let reservation = self.insert_reservation_locked(slot_id, member_id, now).await?;

        info!(slot_id = %slot_id, member_id = %member_id, "reservation created");

        if active + 1 == slot.capacity {
            self.emit(NotificationIntent::SlotFull { slot_id });
        }

        Ok(reservation)
    }

    /// Cancel `member_id`'s active reservation in `slot_id` and promote
    /// the longest-waiting member into the freed spot, if any.
    pub async fn cancel(
        &self,
        member_id: MemberId,
        slot_id: SlotId,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let lock = self.slot_lock(slot_id).await;
        let _guard = lock.lock().await;

        let mut record = {
            let guard = self.reservations.lock().await;
            guard
                .get(&slot_id)
                .and_then(|v| v.iter().find(|r| r.member_id == member_id && r.active).cloned())
        }
        .ok_or(BookingError::NotFound)?;

        record.active = false;
        record.cancelled_at = Some(now);
        self.store.save_reservation(&record).await?;
        self.write_back_reservation(record).await;

        info!(slot_id = %slot_id, member_id = %member_id, "reservation cancelled");

        // Promotion happens inside this critical section: the freed spot
        // cannot be raced away by a fresh reserve before it runs.
        match self.promote_locked(slot_id, now).await? {
            Some(promoted) => self.emit(NotificationIntent::WaitingListPromoted {
                slot_id,
                member_id: promoted,
            }),
            None => self.emit(NotificationIntent::SpotFreed {
                slot_id,
                exclude_member_ids: vec![member_id],
            }),
        }

        Ok(())
    }

    /// Join the waiting list of a full slot.
    ///
    /// `NotEligible` while spots are available, while holding an active
    /// reservation, or while already waiting.
    pub async fn join_waiting_list(
        &self,
        member_id: MemberId,
        slot_id: SlotId,
    ) -> Result<WaitingListEntry, BookingError> {
        let lock = self.slot_lock(slot_id).await;
        let _guard = lock.lock().await;

        let slot = self
            .slot_snapshot(slot_id)
            .await
            .ok_or(BookingError::NotFound)?;

        let (has_reservation, active) = {
            let guard = self.reservations.lock().await;
            let list = guard.get(&slot_id);
            let has = list.is_some_and(|v| {
                v.iter().any(|r| r.member_id == member_id && r.active)
            });
            let active = list.map_or(0, |v| v.iter().filter(|r| r.active).count()) as u32;
            (has, active)
        };

        if active < slot.capacity || has_reservation {
            return Err(BookingError::NotEligible);
        }

        let (already_waiting, next_position) = {
            let guard = self.waiting_lists.lock().await;
            let list = guard.get(&slot_id);
            let waiting = list.is_some_and(|v| {
                v.iter().any(|e| e.member_id == member_id && e.active)
            });
            // Positions are allocated over all entries, active or not, so
            // a number is never handed out twice for the same slot.
            let next = list
                .map_or(0, |v| v.iter().map(|e| e.position).max().unwrap_or(0))
                + 1;
            (waiting, next)
        };

        if already_waiting {
            return Err(BookingError::NotEligible);
        }

        let entry = WaitingListEntry {
            id: Uuid::new_v4(),
            slot_id,
            member_id,
            position: next_position,
            active: true,
        };

        self.store.save_waiting_entry(&entry).await?;
        {
            let mut guard = self.waiting_lists.lock().await;
            guard.entry(slot_id).or_default().push(entry.clone());
        }

        info!(slot_id = %slot_id, member_id = %member_id, position = entry.position, "joined waiting list");

        Ok(entry)
    }

    /// Leave the waiting list. Remaining entries keep their positions.
    pub async fn leave_waiting_list(
        &self,
        member_id: MemberId,
        slot_id: SlotId,
    ) -> Result<(), BookingError> {
        let lock = self.slot_lock(slot_id).await;
        let _guard = lock.lock().await;

        let mut entry = {
            let guard = self.waiting_lists.lock().await;
            guard
                .get(&slot_id)
                .and_then(|v| v.iter().find(|e| e.member_id == member_id && e.active).cloned())
        }
        .ok_or(BookingError::NotFound)?;

        entry.active = false;
        self.store.save_waiting_entry(&entry).await?;
        self.write_back_waiting_entry(entry).await;

        info!(slot_id = %slot_id, member_id = %member_id, "left waiting list");

        Ok(())
    }

    /// Run the auto-reservation batch for `slot_id` over pre-ordered
    /// `candidates`.
    ///
    /// Returns `None` when `auto_reserve_executed` was already set (a
    /// concurrent trigger won the race); otherwise reserves the first
    /// `min(available, |candidates not already booked|)` members, flips
    /// the flag, and returns the reserved member ids. The flag flips even
    /// when the batch reserves nobody, so the periodic trigger scans each
    /// slot at most once.
    pub async fn run_auto_reserve(
        &self,
        slot_id: SlotId,
        candidates: &[MemberId],
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<MemberId>>, BookingError> {
        let lock = self.slot_lock(slot_id).await;
        let _guard = lock.lock().await;

        let mut slot = self
            .slot_snapshot(slot_id)
            .await
            .ok_or(BookingError::NotFound)?;

        if slot.auto_reserve_executed {
            debug!(slot_id = %slot_id, "auto-reservation already executed, skipping");
            return Ok(None);
        }

        let booked: HashSet<MemberId> = {
            let guard = self.reservations.lock().await;
            guard
                .get(&slot_id)
                .map(|v| v.iter().filter(|r| r.active).map(|r| r.member_id).collect())
                .unwrap_or_default()
        };

        let available = slot.capacity.saturating_sub(booked.len() as u32) as usize;

        let selected: Vec<MemberId> = candidates
            .iter()
            .filter(|m| !booked.contains(*m))
            .take(available)
            .copied()
            .collect();

        for member_id in &selected {
            self.insert_reservation_locked(slot_id, *member_id, now).await?;
        }

        slot.auto_reserve_executed = true;
        self.store.save_slot(&slot).await?;
        self.slots.lock().await.insert(slot_id, slot);

        info!(slot_id = %slot_id, reserved = selected.len(), "auto-reservation batch committed");

        self.emit(NotificationIntent::AutoReserved {
            slot_id,
            member_ids: selected.clone(),
        });

        Ok(Some(selected))
    }

    /// Write-through for the staff-facing slot CRUD.
    ///
    /// `auto_reserve_executed` is monotonic; an external edit cannot
    /// reset it once the batch has run.
    pub async fn upsert_slot(&self, mut slot: Slot) -> Result<(), BookingError> {
        let lock = self.slot_lock(slot.id).await;
        let _guard = lock.lock().await;

        let already_executed = self
            .slot_snapshot(slot.id)
            .await
            .map(|s| s.auto_reserve_executed)
            .unwrap_or(false);
        slot.auto_reserve_executed = slot.auto_reserve_executed || already_executed;

        self.store.save_slot(&slot).await?;
        self.slots.lock().await.insert(slot.id, slot);

        Ok(())
    }

    /// Write-through for the member-facing preference CRUD.
    pub async fn upsert_preference(
        &self,
        pref: MemberBookingPreference,
    ) -> Result<(), BookingError> {
        self.store.save_preference(&pref).await?;
        self.preferences.lock().await.insert(pref.member_id, pref);
        Ok(())
    }

    pub async fn get_slot(&self, slot_id: SlotId) -> Option<Slot> {
        self.slot_snapshot(slot_id).await
    }

    /// Spots still open in the slot.
    pub async fn available(&self, slot_id: SlotId) -> Result<u32, BookingError> {
        let slot = self
            .slot_snapshot(slot_id)
            .await
            .ok_or(BookingError::NotFound)?;

        let active = {
            let guard = self.reservations.lock().await;
            guard
                .get(&slot_id)
                .map_or(0, |v| v.iter().filter(|r| r.active).count()) as u32
        };

        Ok(slot.capacity.saturating_sub(active))
    }

    pub async fn preferences_snapshot(&self) -> Vec<MemberBookingPreference> {
        self.preferences.lock().await.values().cloned().collect()
    }

    pub async fn reservations_for(&self, slot_id: SlotId) -> Vec<Reservation> {
        self.reservations
            .lock()
            .await
            .get(&slot_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn waiting_list_for(&self, slot_id: SlotId) -> Vec<WaitingListEntry> {
        self.waiting_lists
            .lock()
            .await
            .get(&slot_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Internal reservation-creation path, shared by `reserve`,
    /// promotion, and the auto-reservation batch. Callers hold the slot
    /// lock and have already justified the insertion; no window or
    /// capacity checks happen here.
    ///
    /// Reactivates a prior inactive record for (slot, member) when one
    /// exists, keeping the pair unique across the booking history.
    async fn insert_reservation_locked(
        &self,
        slot_id: SlotId,
        member_id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let existing = {
            let guard = self.reservations.lock().await;
            guard.get(&slot_id).and_then(|v| {
                v.iter()
                    .find(|r| r.member_id == member_id && !r.active)
                    .cloned()
            })
        };

        let record = match existing {
            Some(mut r) => {
                r.active = true;
                r.created_at = now;
                r.cancelled_at = None;
                r
            }
            None => Reservation {
                id: Uuid::new_v4(),
                slot_id,
                member_id,
                active: true,
                created_at: now,
                cancelled_at: None,
            },
        };

        self.store.save_reservation(&record).await?;
        self.write_back_reservation(record.clone()).await;

        Ok(record)
    }

    async fn write_back_reservation(&self, record: Reservation) {
        let mut guard = self.reservations.lock().await;
        let list = guard.entry(record.slot_id).or_default();
        match list.iter().position(|r| r.id == record.id) {
            Some(idx) => list[idx] = record,
            None => list.push(record),
        }
    }

    async fn write_back_waiting_entry(&self, entry: WaitingListEntry) {
        let mut guard = self.waiting_lists.lock().await;
        let list = guard.entry(entry.slot_id).or_default();
        match list.iter().position(|e| e.id == entry.id) {
            Some(idx) => list[idx] = entry,
            None => list.push(entry),
        }
    }

    /// Move the minimum-position active waiting-list entry into a
    /// reservation. Called only from `cancel`, under the slot lock.
    async fn promote_locked(
        &self,
        slot_id: SlotId,
        now: DateTime<Utc>,
    ) -> Result<Option<MemberId>, BookingError> {
        let next = {
            let guard = self.waiting_lists.lock().await;
            guard.get(&slot_id).and_then(|v| {
                v.iter()
                    .filter(|e| e.active)
                    .min_by_key(|e| e.position)
                    .cloned()
            })
        };

        let Some(mut entry) = next else {
            return Ok(None);
        };

        entry.active = false;
        self.store.save_waiting_entry(&entry).await?;
        self.write_back_waiting_entry(entry.clone()).await;

        self.insert_reservation_locked(slot_id, entry.member_id, now).await?;

        info!(
            slot_id = %slot_id,
            member_id = %entry.member_id,
            position = entry.position,
            "waiting list member promoted"
        );

        Ok(Some(entry.member_id))
    }
}

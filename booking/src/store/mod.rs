pub mod sqlite_store;

use crate::model::{MemberBookingPreference, Reservation, Slot, WaitingListEntry};

/// Persistence boundary for the booking core.
///
/// `load_*` is called once at startup to rebuild the in-memory live sets;
/// every `save_*` has upsert semantics keyed on the record's id.
#[async_trait::async_trait]
pub trait BookingStore: Send + Sync {
    async fn load_slots(&self) -> anyhow::Result<Vec<Slot>>;
    async fn load_reservations(&self) -> anyhow::Result<Vec<Reservation>>;
    async fn load_waiting_list(&self) -> anyhow::Result<Vec<WaitingListEntry>>;
    async fn load_preferences(&self) -> anyhow::Result<Vec<MemberBookingPreference>>;

    async fn save_slot(&self, slot: &Slot) -> anyhow::Result<()>;
    async fn save_reservation(&self, reservation: &Reservation) -> anyhow::Result<()>;
    async fn save_waiting_entry(&self, entry: &WaitingListEntry) -> anyhow::Result<()>;
    async fn save_preference(&self, pref: &MemberBookingPreference) -> anyhow::Result<()>;
}

//! Typed intents handed to the external notification dispatcher.
//!
//! The core only decides *what* happened and *who* should hear about it;
//! channel fan-out, retries, and localization live on the other side of
//! the channel. Emission never blocks and never fails a booking.

use serde::Serialize;
use tokio::sync::mpsc::Sender;

use crate::model::{MemberId, SlotId};

/// One notification-worthy event, carrying only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NotificationIntent {
    /// The last spot was just taken; staff want to know.
    SlotFull { slot_id: SlotId },

    /// A spot freed up and nobody was waiting; broadcast to eligible
    /// members except the canceller.
    SpotFreed {
        slot_id: SlotId,
        exclude_member_ids: Vec<MemberId>,
    },

    /// The longest-waiting member was moved into the freed spot.
    WaitingListPromoted { slot_id: SlotId, member_id: MemberId },

    /// The auto-reservation batch booked these members. An empty list is
    /// a legal emission (the batch ran and found nobody to book).
    AutoReserved {
        slot_id: SlotId,
        member_ids: Vec<MemberId>,
    },
}

/// Dispatcher-facing queue handle.
pub type NotificationSender = Sender<NotificationIntent>;

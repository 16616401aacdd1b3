use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomlyError};
use crate::store::{Booking, BookingStore, Room, RoomStore, WaitlistStore};
use crate::twopc::TxnHooks;

pub const OP_CREATE_BOOKING: &str = "create_booking";

/// Operation payload replicated to 2PC participants, JSON-encoded on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingOp {
    #[serde(rename = "type")]
    pub kind: String,
    pub room_id: String,
    pub user_id: String,
    pub start: String,
    pub end: String,
}

impl BookingOp {
    pub fn create(room_id: &str, user_id: &str, start: &str, end: &str) -> Self {
        Self {
            kind: OP_CREATE_BOOKING.to_string(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

pub struct BookingService {
    rooms: Arc<dyn RoomStore>,
    bookings: Arc<dyn BookingStore>,
    waitlist: Arc<dyn WaitlistStore>,
}

impl BookingService {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        bookings: Arc<dyn BookingStore>,
        waitlist: Arc<dyn WaitlistStore>,
    ) -> Self {
        Self {
            rooms,
            bookings,
            waitlist,
        }
    }

    pub fn create_room(&self, name: &str, capacity: u32) -> Result<String> {
        if name.is_empty() || capacity == 0 {
            return Err(RoomlyError::InvalidInput("invalid room".to_string()));
        }
        self.rooms.create_room(name, capacity)
    }

    pub fn list_rooms(&self) -> Result<Vec<Room>> {
        self.rooms.list_rooms()
    }

    pub fn set_room_schedule(
        &self,
        room_id: &str,
        start: &str,
        end: &str,
        is_open: bool,
    ) -> Result<()> {
        validate_interval(start, end)?;
        self.rooms.set_schedule(room_id, start, end, is_open)
    }

    /// Admission check for a booking request: valid interval, an open
    /// schedule window covering it, and no confirmed-booking overlap.
    pub fn admit_booking(&self, room_id: &str, start: &str, end: &str) -> Result<()> {
        validate_interval(start, end)?;
        if !self.rooms.has_open_window(room_id, start, end)? {
            return Err(RoomlyError::InvalidInput(
                "room not open in this interval".to_string(),
            ));
        }
        if self.bookings.has_overlap(room_id, start, end)? {
            return Err(RoomlyError::Conflict(
                "room already booked in this interval".to_string(),
            ));
        }
        Ok(())
    }

    pub fn create_booking(
        &self,
        room_id: &str,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<String> {
        self.admit_booking(room_id, start, end)?;
        self.bookings.create_booking(room_id, user_id, start, end)
    }

    /// Cancels the caller's confirmed booking, then promotes the waitlist
    /// head for the freed (room, start, end) slot if the slot is still free.
    pub fn cancel_booking(&self, booking_id: &str, user_id: &str) -> Result<()> {
        let booking = self
            .bookings
            .booking(booking_id)?
            .ok_or_else(|| RoomlyError::NotFound(format!("booking {}", booking_id)))?;
        if booking.status != crate::store::BookingStatus::Confirmed {
            // already cancelled: nothing to do
            return Ok(());
        }
        if booking.user_id != user_id {
            return Err(RoomlyError::Forbidden(
                "booking belongs to another user".to_string(),
            ));
        }
        if !self.bookings.cancel_booking(booking_id, user_id)? {
            return Err(RoomlyError::NotFound(format!("booking {}", booking_id)));
        }

        self.promote_waitlist_head(&booking);
        Ok(())
    }

    fn promote_waitlist_head(&self, freed: &Booking) {
        match self
            .waitlist
            .dequeue_first(&freed.room_id, &freed.start, &freed.end)
        {
            Ok(Some(next_user)) => {
                match self
                    .bookings
                    .has_overlap(&freed.room_id, &freed.start, &freed.end)
                {
                    Ok(false) => {
                        match self.bookings.create_booking(
                            &freed.room_id,
                            &next_user,
                            &freed.start,
                            &freed.end,
                        ) {
                            Ok(id) => tracing::info!(
                                booking_id = %id,
                                user_id = %next_user,
                                room_id = %freed.room_id,
                                "Promoted waitlist head"
                            ),
                            Err(e) => tracing::warn!(error = %e, "Waitlist promotion failed"),
                        }
                    }
                    Ok(true) => tracing::debug!(
                        room_id = %freed.room_id,
                        "Slot rebooked before waitlist promotion"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Overlap check failed during promotion"),
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Waitlist dequeue failed"),
        }
    }

    pub fn join_waitlist(&self, room_id: &str, user_id: &str, start: &str, end: &str) -> Result<()> {
        validate_interval(start, end)?;
        self.waitlist.enqueue(room_id, user_id, start, end)
    }

    pub fn booking(&self, booking_id: &str) -> Result<Option<Booking>> {
        self.bookings.booking(booking_id)
    }

    pub fn confirmed_bookings(&self, room_id: &str) -> Result<Vec<Booking>> {
        self.bookings.confirmed_bookings(room_id)
    }
}

/// The 2PC participant hooks: a vote-commit is a promise that the operation
/// passes this node's local admission check. The durable write stays with
/// the coordinator, so commit and abort only acknowledge the decision.
impl TxnHooks for BookingService {
    fn prepare(&self, _operation: &str, data: &serde_json::Value) -> Result<()> {
        let op: BookingOp = serde_json::from_value(data.clone())
            .map_err(|e| RoomlyError::InvalidInput(format!("bad operation payload: {}", e)))?;
        match op.kind.as_str() {
            OP_CREATE_BOOKING => self.admit_booking(&op.room_id, &op.start, &op.end),
            other => Err(RoomlyError::InvalidInput(format!(
                "unknown operation type {}",
                other
            ))),
        }
    }

    fn commit(&self, operation: &str, _data: &serde_json::Value) -> Result<()> {
        tracing::info!(operation, "Committing operation");
        Ok(())
    }

    fn abort(&self, operation: &str, _data: &serde_json::Value) -> Result<()> {
        tracing::info!(operation, "Aborting operation");
        Ok(())
    }
}

/// Interval validity: both bounds parse as RFC3339 and end > start. The
/// RFC3339 UTC form compares lexicographically in chronological order, which
/// is what the store queries rely on.
fn validate_interval(start: &str, end: &str) -> Result<()> {
    DateTime::parse_from_rfc3339(start)
        .map_err(|_| RoomlyError::InvalidInput(format!("invalid start time {}", start)))?;
    DateTime::parse_from_rfc3339(end)
        .map_err(|_| RoomlyError::InvalidInput(format!("invalid end time {}", end)))?;
    if end <= start {
        return Err(RoomlyError::InvalidInput(
            "invalid time range".to_string(),
        ));
    }
    Ok(())
}

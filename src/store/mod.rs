pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    // RFC3339 UTC
    pub expires_at: String,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub room_id: String,
    pub start: String,
    pub end: String,
    pub is_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub start: String,
    pub end: String,
    pub status: BookingStatus,
}

/// Users keyed by id with a unique index on email.
pub trait UserStore: Send + Sync {
    fn create_user(&self, email: &str, password_hash: &str, is_admin: bool) -> Result<String>;
    fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn user_by_id(&self, id: &str) -> Result<Option<User>>;
}

/// Session cache: token -> {user_id, expires_at}. Lookup of an expired
/// session returns None and drops the entry, matching a TTL'd cache.
pub trait SessionStore: Send + Sync {
    fn put_session(&self, token: &str, user_id: &str, expires_at: &str) -> Result<()>;
    fn session(&self, token: &str) -> Result<Option<Session>>;
    fn delete_session(&self, token: &str) -> Result<()>;
}

/// Rooms (unique name) and their admin-declared schedule windows.
pub trait RoomStore: Send + Sync {
    fn create_room(&self, name: &str, capacity: u32) -> Result<String>;
    fn list_rooms(&self) -> Result<Vec<Room>>;
    fn room(&self, room_id: &str) -> Result<Option<Room>>;
    fn set_schedule(&self, room_id: &str, start: &str, end: &str, is_open: bool) -> Result<()>;
    /// True iff some open window has window.start <= start and window.end >= end.
    fn has_open_window(&self, room_id: &str, start: &str, end: &str) -> Result<bool>;
}

pub trait BookingStore: Send + Sync {
    fn create_booking(&self, room_id: &str, user_id: &str, start: &str, end: &str)
        -> Result<String>;
    /// Marks the booking cancelled iff (booking_id, user_id, confirmed)
    /// matches; returns whether a row matched.
    fn cancel_booking(&self, booking_id: &str, user_id: &str) -> Result<bool>;
    /// True iff a confirmed booking on the room overlaps [start, end),
    /// i.e. NOT (existing.end <= start || existing.start >= end).
    fn has_overlap(&self, room_id: &str, start: &str, end: &str) -> Result<bool>;
    fn booking(&self, booking_id: &str) -> Result<Option<Booking>>;
    fn confirmed_bookings(&self, room_id: &str) -> Result<Vec<Booking>>;
}

/// FIFO waitlist keyed by (room_id, start, end), ordered by insertion time.
pub trait WaitlistStore: Send + Sync {
    fn enqueue(&self, room_id: &str, user_id: &str, start: &str, end: &str) -> Result<()>;
    /// Pops the head of the queue for the key, returning its user id.
    fn dequeue_first(&self, room_id: &str, start: &str, end: &str) -> Result<Option<String>>;
    fn waitlist_len(&self, room_id: &str, start: &str, end: &str) -> Result<usize>;
}

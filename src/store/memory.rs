use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Result, RoomlyError};
use crate::store::{
    Booking, BookingStatus, BookingStore, Room, RoomStore, ScheduleWindow, Session, SessionStore,
    User, UserStore, WaitlistStore,
};

#[derive(Debug, Clone)]
struct WaitlistEntry {
    room_id: String,
    user_id: String,
    start: String,
    end: String,
    // RFC3339; insertion order is the FIFO order
    created_at: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    sessions: HashMap<String, Session>,
    rooms: HashMap<String, Room>,
    schedules: Vec<ScheduleWindow>,
    bookings: HashMap<String, Booking>,
    waitlist: Vec<WaitlistEntry>,
}

/// In-memory document store and session cache. Stands in for the external
/// document-store and cache collaborators; the uniqueness checks below play
/// the role of their indexes (unique email, unique room name, unique
/// session token, (room, start, end, created_at) on the waitlist).
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl UserStore for MemoryStore {
    fn create_user(&self, email: &str, password_hash: &str, is_admin: bool) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        if inner.users.values().any(|u| u.email == email) {
            return Err(RoomlyError::Conflict(format!(
                "user {} already exists",
                email
            )));
        }
        let id = new_id();
        inner.users.insert(
            id.clone(),
            User {
                id: id.clone(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                is_admin,
            },
        );
        Ok(id)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.users.get(id).cloned())
    }
}

impl SessionStore for MemoryStore {
    fn put_session(&self, token: &str, user_id: &str, expires_at: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.sessions.insert(
            token.to_string(),
            Session {
                user_id: user_id.to_string(),
                expires_at: expires_at.to_string(),
            },
        );
        Ok(())
    }

    fn session(&self, token: &str) -> Result<Option<Session>> {
        let now = Utc::now().to_rfc3339();
        let mut inner = self.inner.write().unwrap();
        match inner.sessions.get(token) {
            Some(s) if s.expires_at > now => Ok(Some(s.clone())),
            Some(_) => {
                inner.sessions.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.sessions.remove(token);
        Ok(())
    }
}

impl RoomStore for MemoryStore {
    fn create_room(&self, name: &str, capacity: u32) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        if inner.rooms.values().any(|r| r.name == name) {
            return Err(RoomlyError::Conflict(format!(
                "room {} already exists",
                name
            )));
        }
        let id = new_id();
        inner.rooms.insert(
            id.clone(),
            Room {
                id: id.clone(),
                name: name.to_string(),
                capacity,
            },
        );
        Ok(id)
    }

    fn list_rooms(&self) -> Result<Vec<Room>> {
        let inner = self.inner.read().unwrap();
        let mut rooms: Vec<Room> = inner.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    fn room(&self, room_id: &str) -> Result<Option<Room>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.rooms.get(room_id).cloned())
    }

    fn set_schedule(&self, room_id: &str, start: &str, end: &str, is_open: bool) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.rooms.contains_key(room_id) {
            return Err(RoomlyError::NotFound(format!("room {}", room_id)));
        }
        inner.schedules.push(ScheduleWindow {
            room_id: room_id.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            is_open,
        });
        Ok(())
    }

    fn has_open_window(&self, room_id: &str, start: &str, end: &str) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.schedules.iter().any(|w| {
            w.room_id == room_id && w.is_open && w.start.as_str() <= start && w.end.as_str() >= end
        }))
    }
}

impl BookingStore for MemoryStore {
    fn create_booking(
        &self,
        room_id: &str,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<String> {
        let mut inner = self.inner.write().unwrap();
        let id = new_id();
        inner.bookings.insert(
            id.clone(),
            Booking {
                id: id.clone(),
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                start: start.to_string(),
                end: end.to_string(),
                status: BookingStatus::Confirmed,
            },
        );
        Ok(id)
    }

    fn cancel_booking(&self, booking_id: &str, user_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        match inner.bookings.get_mut(booking_id) {
            Some(b)
                if b.user_id == user_id && b.status == BookingStatus::Confirmed =>
            {
                b.status = BookingStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn has_overlap(&self, room_id: &str, start: &str, end: &str) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.bookings.values().any(|b| {
            b.room_id == room_id
                && b.status == BookingStatus::Confirmed
                && !(b.end.as_str() <= start || b.start.as_str() >= end)
        }))
    }

    fn booking(&self, booking_id: &str) -> Result<Option<Booking>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.bookings.get(booking_id).cloned())
    }

    fn confirmed_bookings(&self, room_id: &str) -> Result<Vec<Booking>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.room_id == room_id && b.status == BookingStatus::Confirmed)
            .cloned()
            .collect())
    }
}

impl WaitlistStore for MemoryStore {
    fn enqueue(&self, room_id: &str, user_id: &str, start: &str, end: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.waitlist.push(WaitlistEntry {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            created_at: Utc::now().to_rfc3339(),
        });
        Ok(())
    }

    fn dequeue_first(&self, room_id: &str, start: &str, end: &str) -> Result<Option<String>> {
        let mut inner = self.inner.write().unwrap();
        let pos = inner
            .waitlist
            .iter()
            .enumerate()
            .filter(|(_, e)| e.room_id == room_id && e.start == start && e.end == end)
            .min_by(|(_, a), (_, b)| a.created_at.cmp(&b.created_at))
            .map(|(i, _)| i);
        match pos {
            Some(i) => {
                let entry = inner.waitlist.remove(i);
                Ok(Some(entry.user_id))
            }
            None => Ok(None),
        }
    }

    fn waitlist_len(&self, room_id: &str, start: &str, end: &str) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .waitlist
            .iter()
            .filter(|e| e.room_id == room_id && e.start == start && e.end == end)
            .count())
    }
}

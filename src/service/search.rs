use std::sync::Arc;

use crate::error::Result;
use crate::store::{BookingStore, Room, RoomStore};

pub struct SearchService {
    rooms: Arc<dyn RoomStore>,
    bookings: Arc<dyn BookingStore>,
}

impl SearchService {
    pub fn new(rooms: Arc<dyn RoomStore>, bookings: Arc<dyn BookingStore>) -> Self {
        Self { rooms, bookings }
    }

    /// Rooms with at least `min_capacity` seats that have an open schedule
    /// window covering [start, end) and no conflicting confirmed booking.
    pub fn find_available(&self, min_capacity: u32, start: &str, end: &str) -> Result<Vec<Room>> {
        let mut out = Vec::new();
        for room in self.rooms.list_rooms()? {
            if room.capacity < min_capacity {
                continue;
            }
            if !self.rooms.has_open_window(&room.id, start, end)? {
                continue;
            }
            if self.bookings.has_overlap(&room.id, start, end)? {
                continue;
            }
            out.push(room);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_find_available_filters() {
        let store = Arc::new(MemoryStore::new());
        let rooms: Arc<dyn RoomStore> = store.clone();
        let search = SearchService::new(store.clone(), store.clone());

        let small = rooms.create_room("small", 2).unwrap();
        let large = rooms.create_room("large", 10).unwrap();
        let closed = rooms.create_room("closed", 10).unwrap();
        for id in [&small, &large] {
            rooms
                .set_schedule(id, "2026-09-01T08:00:00Z", "2026-09-01T18:00:00Z", true)
                .unwrap();
        }
        rooms
            .set_schedule(&closed, "2026-09-01T08:00:00Z", "2026-09-01T18:00:00Z", false)
            .unwrap();

        let (s, e) = ("2026-09-01T10:00:00Z", "2026-09-01T11:00:00Z");
        let found = search.find_available(4, s, e).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, large);

        // a conflicting booking removes the room from results
        store.create_booking(&large, "u1", s, e).unwrap();
        assert!(search.find_available(4, s, e).unwrap().is_empty());
    }
}

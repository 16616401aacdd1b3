pub mod auth;
pub mod booking;
pub mod search;

pub use auth::AuthService;
pub use booking::{BookingOp, BookingService, OP_CREATE_BOOKING};
pub use search::SearchService;

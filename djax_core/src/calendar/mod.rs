//! Calendar extension: events and bookable resources backed by the remote calendar.

pub mod engine;
pub mod models;

pub use engine::CalendarSync;
pub use models::{CalendarEvent, CalendarResource};

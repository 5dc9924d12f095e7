pub mod auth;
pub mod backup_exchange;
pub mod bookings;
pub mod core;
pub mod gpa;
pub mod reference;
pub mod timetable;

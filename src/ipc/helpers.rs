use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, OptionalExtension};

use crate::booking::{Actor, BookingError, TimeSlot, DATE_FORMAT, TIME_FORMAT};
use crate::ipc::error::err;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<BookingError> for HandlerErr {
    fn from(e: BookingError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn optional_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| HandlerErr::new("bad_params", "date must be YYYY-MM-DD"))
}

pub fn parse_time(raw: &str, key: &str) -> Result<NaiveTime, HandlerErr> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|_| HandlerErr::new("bad_params", format!("{} must be HH:MM", key)))
}

/// Reads `date`, `startTime` and `endTime` and returns the validated pair.
/// A reversed or empty interval maps to `invalid_interval` before any query
/// runs.
pub fn parse_date_and_slot(
    params: &serde_json::Value,
) -> Result<(NaiveDate, TimeSlot), HandlerErr> {
    let date = parse_date(&required_str(params, "date")?)?;
    let start = parse_time(&required_str(params, "startTime")?, "startTime")?;
    let end = parse_time(&required_str(params, "endTime")?, "endTime")?;
    let slot = TimeSlot::new(start, end)?;
    Ok((date, slot))
}

/// Resolves `studentId` against the users table; the role column decides
/// admin rights.
pub fn load_actor(conn: &Connection, student_id: &str) -> Result<Actor, HandlerErr> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM users WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    match role {
        Some(role) => Ok(Actor {
            id: student_id.to_string(),
            admin: role == "admin",
        }),
        None => Err(HandlerErr::new("not_found", "unknown user")),
    }
}

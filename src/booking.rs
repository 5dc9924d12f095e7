use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booked" => Some(Self::Booked),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum BookingError {
    /// `start >= end`; rejected before any query runs.
    InvalidInterval,
    /// Another active booking holds an overlapping slot.
    SlotUnavailable,
    /// The requested status change violates the lifecycle.
    InvalidTransition { from: BookingStatus },
    NotFound,
    /// The actor is neither the booking's creator nor an admin.
    Forbidden,
    Persistence(rusqlite::Error),
}

impl BookingError {
    /// Stable code surfaced through the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInterval => "invalid_interval",
            Self::SlotUnavailable => "slot_unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Persistence(_) => "db_query_failed",
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval => write!(f, "start time must be before end time"),
            Self::SlotUnavailable => {
                write!(f, "the room is already booked during the selected time")
            }
            Self::InvalidTransition { from } => {
                write!(f, "a {} booking cannot be cancelled", from.as_str())
            }
            Self::NotFound => write!(f, "booking not found"),
            Self::Forbidden => write!(f, "only the booking's creator or an admin may do this"),
            Self::Persistence(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e)
    }
}

/// Half-open interval `[start, end)` within one day. The exclusive end means
/// back-to-back bookings (one ending 12:00, the next starting 12:00) never
/// count as a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidInterval);
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn start_str(&self) -> String {
        self.start.format(TIME_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(TIME_FORMAT).to_string()
    }
}

/// Who is asking. Admins may cancel or delete any booking.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub admin: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub location_id: i64,
    pub capacity: i64,
    pub feature_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub student_id: String,
    pub student_name: String,
}

#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub id: i64,
    pub participants: Vec<Participant>,
    /// Participant ids that matched no known user and were skipped.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub id: i64,
    pub room_name: String,
    pub location_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub start_time: String,
    pub end_time: String,
    pub created_by: String,
}

/// Scans the room's active bookings for the date and checks each against the
/// requested slot. Rows with times this store didn't write (unparseable or
/// reversed) are ignored rather than treated as blockers.
fn has_conflict(
    conn: &Connection,
    room_id: i64,
    date: NaiveDate,
    slot: &TimeSlot,
) -> Result<bool, BookingError> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time FROM bookings
         WHERE room_id = ?1 AND date = ?2 AND status = 'booked'",
    )?;
    let rows = stmt
        .query_map(
            params![room_id, date.format(DATE_FORMAT).to_string()],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    for (start_raw, end_raw) in rows {
        let (Ok(start), Ok(end)) = (
            NaiveTime::parse_from_str(&start_raw, TIME_FORMAT),
            NaiveTime::parse_from_str(&end_raw, TIME_FORMAT),
        ) else {
            continue;
        };
        let Ok(existing) = TimeSlot::new(start, end) else {
            continue;
        };
        if existing.overlaps(slot) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// All booking reads and writes go through here. The connection is injected
/// so tests can run against an in-memory database.
pub struct BookingStore<'a> {
    conn: &'a Connection,
}

impl<'a> BookingStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// True iff no active booking for the room on the date overlaps the slot.
    /// Cancelled and completed bookings never block.
    pub fn is_available(
        &self,
        room_id: i64,
        date: NaiveDate,
        slot: &TimeSlot,
    ) -> Result<bool, BookingError> {
        has_conflict(self.conn, room_id, date, slot).map(|c| !c)
    }

    /// Creates a booking plus its participant rows in one transaction. The
    /// availability check runs again inside the transaction, so two callers
    /// racing for the same slot cannot both win: the loser sees
    /// `SlotUnavailable` instead of a silent double-booking.
    pub fn create_booking(
        &self,
        creator: &str,
        room_id: i64,
        date: NaiveDate,
        slot: &TimeSlot,
        participant_ids: &[String],
    ) -> Result<CreatedBooking, BookingError> {
        let room_exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM rooms WHERE id = ?", [room_id], |r| r.get(0))
            .optional()?;
        if room_exists.is_none() {
            return Err(BookingError::NotFound);
        }

        let tx = self.conn.unchecked_transaction()?;

        if has_conflict(&tx, room_id, date, slot)? {
            return Err(BookingError::SlotUnavailable);
        }

        tx.execute(
            "INSERT INTO bookings(room_id, date, start_time, end_time, status, created_by)
             VALUES(?1, ?2, ?3, ?4, 'booked', ?5)",
            params![
                room_id,
                date.format(DATE_FORMAT).to_string(),
                slot.start_str(),
                slot.end_str(),
                creator,
            ],
        )?;
        let booking_id = tx.last_insert_rowid();

        // Unknown ids are skipped, not fatal: the booking still stands for
        // the participants that resolved. Skipped ids are reported back so
        // the UI can tell the user.
        let mut participants = Vec::new();
        let mut skipped = Vec::new();
        for student_id in participant_ids {
            let name: Option<String> = tx
                .query_row("SELECT name FROM users WHERE id = ?", [student_id], |r| {
                    r.get(0)
                })
                .optional()?;
            match name {
                Some(student_name) => {
                    tx.execute(
                        "INSERT OR IGNORE INTO booking_participants(booking_id, student_id, student_name)
                         VALUES(?1, ?2, ?3)",
                        params![booking_id, student_id, student_name],
                    )?;
                    participants.push(Participant {
                        student_id: student_id.clone(),
                        student_name,
                    });
                }
                None => skipped.push(student_id.clone()),
            }
        }

        tx.commit()?;
        Ok(CreatedBooking {
            id: booking_id,
            participants,
            skipped,
        })
    }

    /// Idempotent: cancelling an already-cancelled booking is a no-op.
    /// Cancelling a completed booking is an `InvalidTransition`.
    pub fn cancel_booking(
        &self,
        booking_id: i64,
        actor: &Actor,
    ) -> Result<BookingStatus, BookingError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT status, created_by FROM bookings WHERE id = ?",
                [booking_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((status_raw, created_by)) = row else {
            return Err(BookingError::NotFound);
        };
        if created_by != actor.id && !actor.admin {
            return Err(BookingError::Forbidden);
        }

        let status = BookingStatus::parse(&status_raw).ok_or(BookingError::NotFound)?;
        match status {
            BookingStatus::Cancelled => Ok(BookingStatus::Cancelled),
            BookingStatus::Completed => Err(BookingError::InvalidTransition { from: status }),
            BookingStatus::Booked => {
                self.conn.execute(
                    "UPDATE bookings SET status = 'cancelled' WHERE id = ?",
                    [booking_id],
                )?;
                Ok(BookingStatus::Cancelled)
            }
        }
    }

    /// Removes the booking and its participant rows. Only the creator or an
    /// admin may delete.
    pub fn delete_booking(&self, booking_id: i64, actor: &Actor) -> Result<(), BookingError> {
        let created_by: Option<String> = self
            .conn
            .query_row(
                "SELECT created_by FROM bookings WHERE id = ?",
                [booking_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(created_by) = created_by else {
            return Err(BookingError::NotFound);
        };
        if created_by != actor.id && !actor.admin {
            return Err(BookingError::Forbidden);
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM booking_participants WHERE booking_id = ?",
            [booking_id],
        )?;
        tx.execute("DELETE FROM bookings WHERE id = ?", [booking_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Moves booked rows whose end has passed to `completed`. Safe to call
    /// on every view refresh; already-completed rows never match again.
    /// Returns the number of rows transitioned.
    pub fn expire_completed_bookings(&self, now: NaiveDateTime) -> Result<usize, BookingError> {
        let today = now.date().format(DATE_FORMAT).to_string();
        let time_of_day = now.time().format(TIME_FORMAT).to_string();
        let changed = self.conn.execute(
            "UPDATE bookings SET status = 'completed'
             WHERE status = 'booked'
               AND (date < ?1 OR (date = ?1 AND end_time <= ?2))",
            params![today, time_of_day],
        )?;
        Ok(changed)
    }

    /// Smallest room in the location with the feature that seats at least
    /// `min_capacity` and is free for the slot. Ties break by room name so
    /// identical inputs always pick the same room. `None` means no room
    /// matches; the caller should ask the user to relax the constraints.
    /// Candidates go through the same `has_conflict` check as
    /// `is_available`, so the two can never disagree about a room.
    pub fn find_best_room(
        &self,
        location_id: i64,
        feature_id: i64,
        min_capacity: i64,
        date: NaiveDate,
        slot: &TimeSlot,
    ) -> Result<Option<Room>, BookingError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, location_id, capacity, feature_id
             FROM rooms
             WHERE location_id = ?1 AND feature_id = ?2 AND capacity >= ?3
             ORDER BY capacity, name",
        )?;
        let candidates = stmt
            .query_map(params![location_id, feature_id, min_capacity], |r| {
                Ok(Room {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    location_id: r.get(2)?,
                    capacity: r.get(3)?,
                    feature_id: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for room in candidates {
            if !has_conflict(self.conn, room.id, date, slot)? {
                return Ok(Some(room));
            }
        }
        Ok(None)
    }

    /// Bookings where the user is creator or participant, deduplicated.
    /// Active bookings surface first, then completed, then cancelled;
    /// within a status, newest date and latest start first.
    pub fn list_bookings_for_user(
        &self,
        user_id: &str,
        location_id: Option<i64>,
    ) -> Result<Vec<BookingSummary>, BookingError> {
        // LEFT JOIN: a booking with no participant rows must still show up
        // for its creator.
        let base = "SELECT DISTINCT b.id, r.name, l.name, b.date, b.start_time, b.end_time, b.status
             FROM bookings b
             JOIN rooms r ON b.room_id = r.id
             JOIN locations l ON r.location_id = l.id
             LEFT JOIN booking_participants bp ON bp.booking_id = b.id
             WHERE (b.created_by = ?1 OR bp.student_id = ?1)";
        let order = " ORDER BY
               CASE b.status
                 WHEN 'booked' THEN 1
                 WHEN 'completed' THEN 2
                 WHEN 'cancelled' THEN 3
               END,
               b.date DESC,
               b.start_time DESC";

        let map_row = |r: &rusqlite::Row| -> rusqlite::Result<BookingSummary> {
            Ok(BookingSummary {
                id: r.get(0)?,
                room_name: r.get(1)?,
                location_name: r.get(2)?,
                date: r.get(3)?,
                start_time: r.get(4)?,
                end_time: r.get(5)?,
                status: r.get(6)?,
            })
        };

        let rows = match location_id {
            Some(loc) => {
                let sql = format!("{} AND r.location_id = ?2{}", base, order);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![user_id, loc], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("{}{}", base, order);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![user_id], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn participants(&self, booking_id: i64) -> Result<Vec<Participant>, BookingError> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, student_name FROM booking_participants
             WHERE booking_id = ?
             ORDER BY student_name",
        )?;
        let rows = stmt
            .query_map([booking_id], |r| {
                Ok(Participant {
                    student_id: r.get(0)?,
                    student_name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active bookings for one room on one date, ordered by start time.
    /// Feeds the timetable grid.
    pub fn bookings_for_day(
        &self,
        room_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<TimetableEntry>, BookingError> {
        let mut stmt = self.conn.prepare(
            "SELECT start_time, end_time, created_by FROM bookings
             WHERE room_id = ?1 AND date = ?2 AND status = 'booked'
             ORDER BY start_time",
        )?;
        let rows = stmt
            .query_map(
                params![room_id, date.format(DATE_FORMAT).to_string()],
                |r| {
                    Ok(TimetableEntry {
                        start_time: r.get(0)?,
                        end_time: r.get(1)?,
                        created_by: r.get(2)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

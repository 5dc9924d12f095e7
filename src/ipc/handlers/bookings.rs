use chrono::NaiveDateTime;
use rusqlite::OptionalExtension;
use serde_json::json;

use crate::booking::BookingStore;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    load_actor, optional_i64, optional_str, parse_date_and_slot, required_i64, required_str,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn participant_ids(params: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    let Some(raw) = params.get("participantIds") else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Some(items) = raw.as_array() else {
        return Err(HandlerErr::new(
            "bad_params",
            "participantIds must be an array of strings",
        ));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(HandlerErr::new(
                "bad_params",
                "participantIds must be an array of strings",
            ));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn handle_check_availability(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let room_id = match required_i64(&req.params, "roomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (date, slot) = match parse_date_and_slot(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let store = BookingStore::new(conn);
    match store.is_available(room_id, date, &slot) {
        Ok(available) => ok(&req.id, json!({ "available": available })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let room_id = match required_i64(&req.params, "roomId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (date, slot) = match parse_date_and_slot(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let participants = match participant_ids(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // The creator must be a known user; participants are lenient, the
    // creator is not.
    if let Err(e) = load_actor(conn, &student_id) {
        return e.response(&req.id);
    }

    let store = BookingStore::new(conn);
    match store.create_booking(&student_id, room_id, date, &slot, &participants) {
        Ok(created) => ok(
            &req.id,
            json!({
                "bookingId": created.id,
                "participants": created.participants,
                "skippedParticipantIds": created.skipped
            }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let booking_id = match required_i64(&req.params, "bookingId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let actor = match load_actor(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let store = BookingStore::new(conn);
    match store.cancel_booking(booking_id, &actor) {
        Ok(status) => ok(
            &req.id,
            json!({ "bookingId": booking_id, "status": status.as_str() }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let booking_id = match required_i64(&req.params, "bookingId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let actor = match load_actor(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let store = BookingStore::new(conn);
    match store.delete_booking(booking_id, &actor) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_expire(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // The UI calls this on view refresh with no argument; tests pin the
    // clock through the override.
    let now = match optional_str(&req.params, "now") {
        Some(raw) => match NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M") {
            Ok(v) => v,
            Err(_) => {
                return err(
                    &req.id,
                    "bad_params",
                    "now must be YYYY-MM-DD HH:MM",
                    None,
                )
            }
        },
        None => chrono::Local::now().naive_local(),
    };

    let store = BookingStore::new(conn);
    match store.expire_completed_bookings(now) {
        Ok(count) => ok(&req.id, json!({ "expired": count })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_find_best_room(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let location_id = match required_i64(&req.params, "locationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let feature_id = match required_i64(&req.params, "featureId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let min_capacity = match required_i64(&req.params, "minCapacity") {
        Ok(v) if v >= 1 => v,
        Ok(_) => return err(&req.id, "bad_params", "minCapacity must be positive", None),
        Err(e) => return e.response(&req.id),
    };
    let (date, slot) = match parse_date_and_slot(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let store = BookingStore::new(conn);
    match store.find_best_room(location_id, feature_id, min_capacity, date, &slot) {
        // "room": null is the no-match outcome, not an error.
        Ok(room) => ok(&req.id, json!({ "room": room })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_list_for_user(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let location_id = optional_i64(&req.params, "locationId");

    let store = BookingStore::new(conn);
    match store.list_bookings_for_user(&student_id, location_id) {
        Ok(bookings) => ok(&req.id, json!({ "bookings": bookings })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_participants(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let booking_id = match required_i64(&req.params, "bookingId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM bookings WHERE id = ?", [booking_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "booking not found", None);
    }

    let store = BookingStore::new(conn);
    match store.participants(booking_id) {
        Ok(participants) => ok(&req.id, json!({ "participants": participants })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bookings.checkAvailability" => Some(handle_check_availability(state, req)),
        "bookings.create" => Some(handle_create(state, req)),
        "bookings.cancel" => Some(handle_cancel(state, req)),
        "bookings.delete" => Some(handle_delete(state, req)),
        "bookings.expire" => Some(handle_expire(state, req)),
        "bookings.findBestRoom" => Some(handle_find_best_room(state, req)),
        "bookings.listForUser" => Some(handle_list_for_user(state, req)),
        "bookings.participants" => Some(handle_participants(state, req)),
        _ => None,
    }
}

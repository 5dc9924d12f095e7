use serde_json::json;

use crate::booking::BookingStore;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_date, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

/// One day, one location: every room with its active bookings, ready for
/// the timetable grid.
fn handle_day(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let location_id = match required_i64(&req.params, "locationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let date = match required_str(&req.params, "date").and_then(|raw| parse_date(&raw)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, capacity FROM rooms WHERE location_id = ? ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rooms = match stmt
        .query_map([location_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let store = BookingStore::new(conn);
    let mut day = Vec::with_capacity(rooms.len());
    for (room_id, name, capacity) in rooms {
        let entries = match store.bookings_for_day(room_id, date) {
            Ok(v) => v,
            Err(e) => return HandlerErr::from(e).response(&req.id),
        };
        day.push(json!({
            "roomId": room_id,
            "roomName": name,
            "capacity": capacity,
            "bookings": entries
        }));
    }

    ok(&req.id, json!({ "date": req.params["date"], "rooms": day }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.day" => Some(handle_day(state, req)),
        _ => None,
    }
}

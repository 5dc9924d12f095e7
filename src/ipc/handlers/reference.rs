use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_i64, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_locations_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if let Err(e) = conn.execute("INSERT INTO locations(name) VALUES(?)", [&name]) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "locations" })),
        );
    }
    ok(
        &req.id,
        json!({ "locationId": conn.last_insert_rowid(), "name": name }),
    )
}

fn handle_locations_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "locations": [] }));
    };

    let mut stmt = match conn.prepare("SELECT id, name FROM locations ORDER BY name") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(locations) => ok(&req.id, json!({ "locations": locations })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_features_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if let Err(e) = conn.execute("INSERT INTO features(name) VALUES(?)", [&name]) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "features" })),
        );
    }
    ok(
        &req.id,
        json!({ "featureId": conn.last_insert_rowid(), "name": name }),
    )
}

fn handle_features_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "features": [] }));
    };
    let mut stmt = match conn.prepare("SELECT id, name FROM features ORDER BY name") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(features) => ok(&req.id, json!({ "features": features })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let location_id = match required_i64(&req.params, "locationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let capacity = match required_i64(&req.params, "capacity") {
        Ok(v) if v >= 1 => v,
        Ok(_) => return err(&req.id, "bad_params", "capacity must be positive", None),
        Err(e) => return e.response(&req.id),
    };
    let feature_id = optional_i64(&req.params, "featureId");

    let location_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM locations WHERE id = ?", [location_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if location_exists.is_none() {
        return err(&req.id, "not_found", "location not found", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO rooms(name, location_id, capacity, feature_id) VALUES(?, ?, ?, ?)",
        (&name, location_id, capacity, feature_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "rooms" })),
        );
    }
    ok(
        &req.id,
        json!({
            "roomId": conn.last_insert_rowid(),
            "name": name,
            "locationId": location_id,
            "capacity": capacity,
            "featureId": feature_id
        }),
    )
}

fn handle_rooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "rooms": [] }));
    };
    let location_id = match required_i64(&req.params, "locationId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, capacity, feature_id FROM rooms
         WHERE location_id = ?
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([location_id], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let capacity: i64 = row.get(2)?;
            let feature_id: Option<i64> = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "capacity": capacity,
                "featureId": feature_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(rooms) => ok(&req.id, json!({ "rooms": rooms })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "locations.create" => Some(handle_locations_create(state, req)),
        "locations.list" => Some(handle_locations_list(state, req)),
        "features.create" => Some(handle_features_create(state, req)),
        "features.list" => Some(handle_features_list(state, req)),
        "rooms.create" => Some(handle_rooms_create(state, req)),
        "rooms.list" => Some(handle_rooms_list(state, req)),
        _ => None,
    }
}

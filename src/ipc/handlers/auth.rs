use crate::auth;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let (student_id, name, password) = match (
        required_str(&req.params, "studentId"),
        required_str(&req.params, "name"),
        required_str(&req.params, "password"),
    ) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_some() {
        return err(
            &req.id,
            "user_exists",
            "a user with this id is already registered",
            Some(json!({ "studentId": student_id })),
        );
    }

    let salt = auth::new_salt();
    let hash = auth::hash_password(&password, &salt);
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, name, password_hash, password_salt) VALUES(?, ?, ?, ?)",
        (&student_id, &name, &hash, &salt),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let (student_id, password) = match (
        required_str(&req.params, "studentId"),
        required_str(&req.params, "password"),
    ) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return e.response(&req.id),
    };

    let row: Option<(String, String, String, String)> = match conn
        .query_row(
            "SELECT name, password_hash, password_salt, role FROM users WHERE id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Unknown id and wrong password produce the same code so the login form
    // can't be used to probe which ids exist.
    let Some((name, hash, salt, role)) = row else {
        return err(&req.id, "invalid_credentials", "wrong id or password", None);
    };
    if !auth::verify_password(&hash, &salt, &password) {
        return err(&req.id, "invalid_credentials", "wrong id or password", None);
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "name": name, "role": role }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        _ => None,
    }
}

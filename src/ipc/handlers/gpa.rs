use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;

use crate::gpa::{compute_summary, required_gpa, CourseEntry, PriorStanding};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    load_actor, optional_i64, optional_str, required_f64, required_i64, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn parse_courses(params: &serde_json::Value) -> Result<Vec<CourseEntry>, HandlerErr> {
    let raw = params.get("courses").cloned().unwrap_or(json!([]));
    serde_json::from_value(raw).map_err(|_| {
        HandlerErr::new(
            "bad_params",
            "courses must be an array of {name, credits, grade}",
        )
    })
}

fn parse_prior(params: &serde_json::Value) -> Result<Option<PriorStanding>, HandlerErr> {
    let cgpa = params.get("currentCgpa").and_then(|v| v.as_f64());
    let completed = params.get("completedCredits").and_then(|v| v.as_i64());
    match (cgpa, completed) {
        (Some(cgpa), Some(completed_credits)) => {
            if !(0.0..=4.0).contains(&cgpa) || completed_credits < 0 {
                return Err(HandlerErr::new(
                    "bad_params",
                    "currentCgpa must be 0..=4 and completedCredits non-negative",
                ));
            }
            Ok(Some(PriorStanding {
                cgpa,
                completed_credits,
            }))
        }
        (None, None) => Ok(None),
        _ => Err(HandlerErr::new(
            "bad_params",
            "currentCgpa and completedCredits must be given together",
        )),
    }
}

fn handle_calculate(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let courses = match parse_courses(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let prior = match parse_prior(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let summary = compute_summary(&courses, prior);
    ok(&req.id, json!({ "summary": summary }))
}

fn handle_goal(_state: &mut AppState, req: &Request) -> serde_json::Value {
    // The goal form needs the current standing; there is no "no prior" case.
    let prior = match parse_prior(&req.params) {
        Ok(Some(p)) => p,
        Ok(None) => {
            return err(
                &req.id,
                "bad_params",
                "currentCgpa and completedCredits are required",
                None,
            )
        }
        Err(e) => return e.response(&req.id),
    };
    let target_cgpa = match required_f64(&req.params, "targetCgpa") {
        Ok(v) if (0.0..=4.0).contains(&v) => v,
        Ok(_) => return err(&req.id, "bad_params", "targetCgpa must be 0..=4", None),
        Err(e) => return e.response(&req.id),
    };
    let planned_credits = match required_i64(&req.params, "plannedCredits") {
        Ok(v) if v >= 1 => v,
        Ok(_) => {
            return err(
                &req.id,
                "bad_params",
                "plannedCredits must be positive",
                None,
            )
        }
        Err(e) => return e.response(&req.id),
    };

    let outcome = required_gpa(prior, target_cgpa, planned_credits);
    ok(&req.id, json!({ "goal": outcome }))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = load_actor(conn, &student_id) {
        return e.response(&req.id);
    }
    let courses = match parse_courses(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let prior = match parse_prior(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let saved_at = optional_str(&req.params, "savedAt")
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d %H:%M").to_string());

    let summary = compute_summary(&courses, prior);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO gpa_history(student_id, saved_at, semester_credits, gpa,
                                 total_credits, cgpa, current_cgpa, completed_credits)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            student_id,
            saved_at,
            summary.semester_credits,
            summary.gpa,
            summary.total_credits,
            summary.cgpa,
            prior.map(|p| p.cgpa),
            prior.map(|p| p.completed_credits),
        ],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "gpa_history" })),
        );
    }
    let history_id = tx.last_insert_rowid();

    for course in &courses {
        if let Err(e) = tx.execute(
            "INSERT INTO gpa_courses(history_id, name, credits, grade) VALUES(?1, ?2, ?3, ?4)",
            params![history_id, course.name, course.credits, course.grade],
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "gpa_courses" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "historyId": history_id, "savedAt": saved_at, "summary": summary }),
    )
}

fn history_courses(conn: &Connection, history_id: i64) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT name, credits, grade FROM gpa_courses
             WHERE history_id = ?
             ORDER BY name",
        )
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    stmt.query_map([history_id], |r| {
        let name: String = r.get(0)?;
        let credits: i64 = r.get(1)?;
        let grade: String = r.get(2)?;
        Ok(json!({ "name": name, "credits": credits, "grade": grade }))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn history_record_json(row: &rusqlite::Row) -> rusqlite::Result<(i64, serde_json::Value)> {
    let id: i64 = row.get(0)?;
    let saved_at: String = row.get(1)?;
    let semester_credits: i64 = row.get(2)?;
    let gpa: f64 = row.get(3)?;
    let total_credits: i64 = row.get(4)?;
    let cgpa: f64 = row.get(5)?;
    let current_cgpa: Option<f64> = row.get(6)?;
    let completed_credits: Option<i64> = row.get(7)?;
    Ok((
        id,
        json!({
            "id": id,
            "savedAt": saved_at,
            "semesterCredits": semester_credits,
            "gpa": gpa,
            "totalCredits": total_credits,
            "cgpa": cgpa,
            "currentCgpa": current_cgpa,
            "completedCredits": completed_credits
        }),
    ))
}

fn handle_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let limit = optional_i64(&req.params, "limit").unwrap_or(10).max(1);

    let mut stmt = match conn.prepare(
        "SELECT id, saved_at, semester_credits, gpa, total_credits, cgpa,
                current_cgpa, completed_credits
         FROM gpa_history
         WHERE student_id = ?1
         ORDER BY saved_at DESC, id DESC
         LIMIT ?2",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let records = match stmt
        .query_map(params![student_id, limit], history_record_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut history = Vec::with_capacity(records.len());
    for (id, mut record) in records {
        match history_courses(conn, id) {
            Ok(courses) => {
                record["courses"] = json!(courses);
                history.push(record);
            }
            Err(e) => return e.response(&req.id),
        }
    }

    ok(&req.id, json!({ "history": history }))
}

fn handle_history_details(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let history_id = match required_i64(&req.params, "historyId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let record = match conn
        .query_row(
            "SELECT id, saved_at, semester_credits, gpa, total_credits, cgpa,
                    current_cgpa, completed_credits
             FROM gpa_history WHERE id = ?",
            [history_id],
            history_record_json,
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((id, mut record)) = record else {
        return err(&req.id, "not_found", "gpa record not found", None);
    };

    match history_courses(conn, id) {
        Ok(courses) => {
            record["courses"] = json!(courses);
            ok(&req.id, json!({ "record": record }))
        }
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gpa.calculate" => Some(handle_calculate(state, req)),
        "gpa.goal" => Some(handle_goal(state, req)),
        "gpa.save" => Some(handle_save(state, req)),
        "gpa.history" => Some(handle_history(state, req)),
        "gpa.historyDetails" => Some(handle_history_details(state, req)),
        _ => None,
    }
}

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studyhubd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studyhubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or("")
}

fn seed_room(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> i64 {
    let workspace = temp_dir("studyhub-conflict");
    request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "s2",
        "auth.register",
        json!({ "studentId": "1001", "name": "Alice Tan", "password": "pass123" }),
    );
    request_ok(
        stdin,
        reader,
        "s3",
        "auth.register",
        json!({ "studentId": "1002", "name": "Bob Lee", "password": "mypassword" }),
    );
    let loc = request_ok(stdin, reader, "s4", "locations.create", json!({ "name": "Arena" }));
    let location_id = loc["locationId"].as_i64().expect("location id");
    let room = request_ok(
        stdin,
        reader,
        "s5",
        "rooms.create",
        json!({ "name": "Room A012", "locationId": location_id, "capacity": 4 }),
    );
    room["roomId"].as_i64().expect("room id")
}

#[test]
fn second_overlapping_create_gets_slot_unavailable() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let room_id = seed_room(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bookings.create",
        json!({
            "studentId": "1001",
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "10:00",
            "endTime": "12:00"
        }),
    );

    let losing = request(
        &mut stdin,
        &mut reader,
        "2",
        "bookings.create",
        json!({
            "studentId": "1002",
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "11:00",
            "endTime": "13:00"
        }),
    );
    assert_eq!(error_code(&losing), "slot_unavailable");

    // The losing attempt must leave nothing behind.
    let bobs = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bookings.listForUser",
        json!({ "studentId": "1002" }),
    );
    assert_eq!(bobs["bookings"].as_array().expect("array").len(), 0);

    // Back-to-back succeeds.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "bookings.create",
        json!({
            "studentId": "1002",
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "12:00",
            "endTime": "13:00"
        }),
    );
}

#[test]
fn cancel_frees_slot_and_is_idempotent() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let room_id = seed_room(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bookings.create",
        json!({
            "studentId": "1001",
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "10:00",
            "endTime": "12:00"
        }),
    );
    let booking_id = created["bookingId"].as_i64().expect("booking id");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "bookings.cancel",
        json!({ "studentId": "1001", "bookingId": booking_id }),
    );
    assert_eq!(first["status"], json!("cancelled"));

    // Second cancel is a no-op, not an error.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bookings.cancel",
        json!({ "studentId": "1001", "bookingId": booking_id }),
    );
    assert_eq!(second["status"], json!("cancelled"));

    // The exact interval is bookable again.
    let freed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "bookings.checkAvailability",
        json!({
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "10:00",
            "endTime": "12:00"
        }),
    );
    assert_eq!(freed["available"], json!(true));
}

#[test]
fn only_creator_may_cancel_and_completed_is_terminal() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let room_id = seed_room(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bookings.create",
        json!({
            "studentId": "1001",
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "10:00",
            "endTime": "12:00"
        }),
    );
    let booking_id = created["bookingId"].as_i64().expect("booking id");

    let stranger = request(
        &mut stdin,
        &mut reader,
        "2",
        "bookings.cancel",
        json!({ "studentId": "1002", "bookingId": booking_id }),
    );
    assert_eq!(error_code(&stranger), "forbidden");

    // Let it expire, then try to cancel the completed booking.
    let expired = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bookings.expire",
        json!({ "now": "2025-08-01 12:00" }),
    );
    assert_eq!(expired["expired"], json!(1));

    let too_late = request(
        &mut stdin,
        &mut reader,
        "4",
        "bookings.cancel",
        json!({ "studentId": "1001", "bookingId": booking_id }),
    );
    assert_eq!(error_code(&too_late), "invalid_transition");
}

#[test]
fn delete_requires_creator_and_removes_participants() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let room_id = seed_room(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bookings.create",
        json!({
            "studentId": "1001",
            "roomId": room_id,
            "date": "2025-08-01",
            "startTime": "10:00",
            "endTime": "12:00",
            "participantIds": ["1002"]
        }),
    );
    let booking_id = created["bookingId"].as_i64().expect("booking id");

    let stranger = request(
        &mut stdin,
        &mut reader,
        "2",
        "bookings.delete",
        json!({ "studentId": "1002", "bookingId": booking_id }),
    );
    assert_eq!(error_code(&stranger), "forbidden");

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bookings.delete",
        json!({ "studentId": "1001", "bookingId": booking_id }),
    );

    let gone = request(
        &mut stdin,
        &mut reader,
        "4",
        "bookings.participants",
        json!({ "bookingId": booking_id }),
    );
    assert_eq!(error_code(&gone), "not_found");
}

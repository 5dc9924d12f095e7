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

fn request_ok(
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Seeded {
    location_id: i64,
    room_a: i64,
    room_b: i64,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seeded {
    let workspace = temp_dir("studyhub-timetable");
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
    let loc = request_ok(stdin, reader, "s3", "locations.create", json!({ "name": "Library" }));
    let location_id = loc["locationId"].as_i64().expect("location id");
    // Created out of name order on purpose; the grid sorts by room name.
    let b = request_ok(
        stdin,
        reader,
        "s4",
        "rooms.create",
        json!({ "name": "Room B", "locationId": location_id, "capacity": 8 }),
    );
    let a = request_ok(
        stdin,
        reader,
        "s5",
        "rooms.create",
        json!({ "name": "Room A", "locationId": location_id, "capacity": 4 }),
    );
    Seeded {
        location_id,
        room_a: a["roomId"].as_i64().expect("room id"),
        room_b: b["roomId"].as_i64().expect("room id"),
    }
}

fn create(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    room_id: i64,
    date: &str,
    start: &str,
    end: &str,
) -> i64 {
    let created = request_ok(
        stdin,
        reader,
        id,
        "bookings.create",
        json!({
            "studentId": "1001",
            "roomId": room_id,
            "date": date,
            "startTime": start,
            "endTime": end
        }),
    );
    created["bookingId"].as_i64().expect("booking id")
}

#[test]
fn day_grid_orders_rooms_by_name_and_entries_by_start() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed(&mut stdin, &mut reader);

    create(&mut stdin, &mut reader, "1", seeded.room_a, "2025-09-01", "14:00", "16:00");
    create(&mut stdin, &mut reader, "2", seeded.room_a, "2025-09-01", "09:00", "10:00");
    create(&mut stdin, &mut reader, "3", seeded.room_b, "2025-09-01", "11:00", "12:00");
    // A different day stays off this grid.
    create(&mut stdin, &mut reader, "4", seeded.room_a, "2025-09-02", "09:00", "10:00");

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.day",
        json!({ "locationId": seeded.location_id, "date": "2025-09-01" }),
    );
    assert_eq!(grid["date"], json!("2025-09-01"));
    let rooms = grid["rooms"].as_array().expect("rooms");
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0]["roomName"], json!("Room A"));
    assert_eq!(rooms[1]["roomName"], json!("Room B"));

    let room_a_bookings = rooms[0]["bookings"].as_array().expect("bookings");
    assert_eq!(room_a_bookings.len(), 2);
    assert_eq!(room_a_bookings[0]["startTime"], json!("09:00"));
    assert_eq!(room_a_bookings[1]["startTime"], json!("14:00"));
    assert_eq!(room_a_bookings[0]["createdBy"], json!("1001"));

    let room_b_bookings = rooms[1]["bookings"].as_array().expect("bookings");
    assert_eq!(room_b_bookings.len(), 1);
    assert_eq!(room_b_bookings[0]["endTime"], json!("12:00"));
}

#[test]
fn cancelled_bookings_drop_off_the_grid() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seeded = seed(&mut stdin, &mut reader);

    let keep = create(&mut stdin, &mut reader, "1", seeded.room_a, "2025-09-01", "09:00", "10:00");
    let drop = create(&mut stdin, &mut reader, "2", seeded.room_a, "2025-09-01", "11:00", "12:00");
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bookings.cancel",
        json!({ "studentId": "1001", "bookingId": drop }),
    );
    let _ = keep;

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.day",
        json!({ "locationId": seeded.location_id, "date": "2025-09-01" }),
    );
    let rooms = grid["rooms"].as_array().expect("rooms");
    let room_a_bookings = rooms[0]["bookings"].as_array().expect("bookings");
    assert_eq!(room_a_bookings.len(), 1);
    assert_eq!(room_a_bookings[0]["startTime"], json!("09:00"));
}

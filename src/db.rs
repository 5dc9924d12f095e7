use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "studyhub.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates the schema idempotently and migrates older workspaces.
/// Split out from `open_db` so unit tests can run against an
/// in-memory connection.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS locations(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS features(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            location_id INTEGER NOT NULL,
            capacity INTEGER NOT NULL,
            feature_id INTEGER,
            FOREIGN KEY(location_id) REFERENCES locations(id),
            FOREIGN KEY(feature_id) REFERENCES features(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rooms_location ON rooms(location_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookings(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'booked'
                CHECK(status IN ('booked', 'cancelled', 'completed')),
            created_by TEXT NOT NULL,
            FOREIGN KEY(room_id) REFERENCES rooms(id),
            FOREIGN KEY(created_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_room_date ON bookings(room_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_created_by ON bookings(created_by)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS booking_participants(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            booking_id INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            UNIQUE(booking_id, student_id),
            FOREIGN KEY(booking_id) REFERENCES bookings(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_booking_participants_booking
         ON booking_participants(booking_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_booking_participants_student
         ON booking_participants(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS gpa_history(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            semester_credits INTEGER NOT NULL,
            gpa REAL NOT NULL,
            total_credits INTEGER NOT NULL,
            cgpa REAL NOT NULL,
            current_cgpa REAL,
            completed_credits INTEGER,
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_gpa_history_student ON gpa_history(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gpa_courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            history_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            credits INTEGER NOT NULL,
            grade TEXT NOT NULL,
            FOREIGN KEY(history_id) REFERENCES gpa_history(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_gpa_courses_history ON gpa_courses(history_id)",
        [],
    )?;

    // Workspaces created by earlier app revisions may predate the status
    // column or still use the old approval vocabulary. Bring both up to date.
    ensure_bookings_status(conn)?;
    migrate_booking_statuses(conn)?;

    Ok(())
}

fn ensure_bookings_status(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "bookings", "status")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE bookings ADD COLUMN status TEXT NOT NULL DEFAULT 'booked'",
        [],
    )?;
    Ok(())
}

fn migrate_booking_statuses(conn: &Connection) -> anyhow::Result<()> {
    // Old vocabulary -> current one:
    // - "pending" and "approved" were both live reservations => "booked"
    // - "rejected" never held the slot => "cancelled"
    conn.execute(
        "UPDATE bookings SET status = 'booked' WHERE status IN ('pending', 'approved')",
        [],
    )?;
    conn.execute(
        "UPDATE bookings SET status = 'cancelled' WHERE status = 'rejected'",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

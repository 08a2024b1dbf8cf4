use rusqlite::Connection;
use tempfile::TempDir;

pub const USERS: [(&str, &str); 10] = [
    ("Alice Johnson", "alice@example.com"),
    ("Bob Smith", "bob@example.com"),
    ("Carol White", "carol@example.com"),
    ("David Brown", "david@example.com"),
    ("Eve Davis", "eve@example.com"),
    ("Frank Miller", "frank@example.com"),
    ("Grace Wilson", "grace@example.com"),
    ("Henry Moore", "henry@example.com"),
    ("Ivy Taylor", "ivy@example.com"),
    ("Jack Thomas", "jack@example.com"),
];

pub fn seed_users(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT NOT NULL)",
    )
    .unwrap();
    for (name, email) in USERS {
        conn.execute("INSERT INTO users (name, email) VALUES (?1, ?2)", [name, email])
            .unwrap();
    }
}

pub fn users_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    seed_users(&conn);
    conn
}

/// Writes the users fixture to `users.db` inside a fresh temp dir.
pub fn users_file() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open(dir.path().join("users.db")).unwrap();
    seed_users(&conn);
    drop(conn);
    (dir, "users.db".to_string())
}

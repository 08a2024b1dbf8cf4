use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};

use rusqlite::{Connection, OpenFlags};

use crate::error::{AppError, AppResult};

/// Resolves upload identifiers to files under one directory and hands out
/// short-lived read-only handles.
///
/// Nothing is cached between requests. Every call opens its own handle and
/// drops it when the closure returns, whatever the outcome; concurrent access
/// to a file is left to SQLite's own locking.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    data_dir: PathBuf,
    busy_timeout: Duration,
}

impl DatabaseStore {
    pub fn new(data_dir: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            data_dir: data_dir.into(),
            busy_timeout,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Maps a bare filename to its path. Anything that could name a file
    /// outside the data directory is a request error.
    pub fn resolve(&self, filename: &str) -> AppResult<PathBuf> {
        if !is_bare_filename(filename) {
            return Err(AppError::InvalidRequest(format!("invalid filename: {filename:?}")));
        }
        let path = self.data_dir.join(filename);
        if !path.is_file() {
            return Err(AppError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    /// Opens `filename`, runs `f` on the blocking pool, and closes the handle.
    pub async fn with_database<T, F>(&self, filename: &str, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let path = self.resolve(filename)?;
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let conn = open_readonly(&path, busy_timeout)?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Internal(format!("db task failed: {e}")))?
    }
}

pub fn open_readonly(path: &Path, busy_timeout: Duration) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::NotADatabase) => AppError::CorruptDatabase(path.display().to_string()),
        _ => AppError::Internal(format!("failed to open database {}: {e}", path.display())),
    })?;
    if let Err(e) = conn.busy_timeout(busy_timeout) {
        tracing::warn!(error = %e, path = %path.display(), "could not set busy timeout");
    }
    Ok(conn)
}

fn is_bare_filename(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut comps = Path::new(name).components();
    matches!((comps.next(), comps.next()), (Some(Component::Normal(_)), None))
}

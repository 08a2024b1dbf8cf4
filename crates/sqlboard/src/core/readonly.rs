use rusqlite::Statement;

use crate::error::{AppError, AppResult};

/// Engine-side check behind the lexical allow-list: refuse any prepared
/// statement SQLite reports as able to write.
pub fn ensure_readonly(stmt: &Statement<'_>) -> AppResult<()> {
    if stmt.readonly() {
        Ok(())
    } else {
        Err(AppError::NotReadonly)
    }
}

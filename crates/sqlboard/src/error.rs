use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Carries the user-facing rejection reason verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("database not found: {0}")]
    NotFound(String),

    #[error("file is not a valid SQLite database: {0}")]
    CorruptDatabase(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("query is not read-only")]
    NotReadonly,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::NotADatabase) => AppError::CorruptDatabase(e.to_string()),
            _ => AppError::Query(e.to_string()),
        }
    }
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::CorruptDatabase(_) => "CORRUPT_DATABASE",
            AppError::Query(_) => "QUERY_FAILED",
            AppError::NotReadonly => "NOT_READONLY",
            AppError::Io(_) => "IO_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP-style status class. A corrupt upload is the caller's to fix, so it
    /// stays in the 400 range alongside validation failures.
    pub fn status(&self) -> u16 {
        match self {
            AppError::InvalidRequest(_)
            | AppError::Validation(_)
            | AppError::CorruptDatabase(_)
            | AppError::NotReadonly => 400,
            AppError::NotFound(_) => 404,
            AppError::Query(_) | AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

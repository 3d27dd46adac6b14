use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition request timed out")]
    Timeout,
    #[error("recognition request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("recognition service returned {status}: {body}")]
    Service { status: StatusCode, body: String },
    #[error("malformed recognition response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for RecognitionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RecognitionError::Timeout
        } else {
            RecognitionError::Http(e)
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("registry request timed out")]
    Timeout,
    #[error("registry request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("registry has no page for plate {0}")]
    NotFound(String),
    #[error("registry returned {0}")]
    Service(StatusCode),
    #[error("registry page has no vehicle table")]
    NoTable,
    #[error("registry table has {found} rows, expected at least {expected}")]
    MissingRows { expected: usize, found: usize },
    #[error("registry table has no {0} value")]
    MissingField(&'static str),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else {
            LookupError::Http(e)
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("plate {0} is already stored")]
    DuplicateKey(String),
    #[error("existing plates table has columns [{}], rerun with RESET_DB=1 to recreate it", .found.join(", "))]
    Schema { found: Vec<String> },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

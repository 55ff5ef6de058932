//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Rate limited by remote classifier: {0}")]
    RateLimited(String),

    #[error("Remote classifier unavailable: {0}")]
    Transient(String),

    #[error("Remote classifier returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Retry budget exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<Error> },
}

impl Error {
    /// Whether retrying the same request could succeed
    ///
    /// Rate limits, 5xx responses, timeouts and connection failures are
    /// transient. Everything else (bad credentials, malformed requests,
    /// local I/O) is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RateLimited(_) | Error::Transient(_) => true,
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Error::RateLimited(body),
            500..=599 => Error::Transient(format!("HTTP {}: {}", status, body)),
            _ => Error::Api { status, body },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

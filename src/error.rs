use std::fmt;

use thiserror::Error;

/// Failure of a single request against a remote source.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Timeout, connection failure, HTTP 5xx or 429. Retried.
    #[error("transient transport error: {message}")]
    Transient { message: String },

    /// HTTP 4xx other than 429. Never retried.
    #[error("request rejected with status {status}: {message}")]
    Permanent { status: u16, message: String },

    /// The response arrived but its body could not be understood. Never retried.
    #[error("malformed response body: {message}")]
    MalformedResponse { message: String },

    #[error("retrieval cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body.chars().take(200).collect()
        };
        if status == 429 || status >= 500 {
            Self::Transient { message }
        } else {
            Self::Permanent { status, message }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::MalformedResponse {
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), "");
        }
        // timeouts, refused connections and anything else that never produced a response
        Self::Transient {
            message: err.to_string(),
        }
    }
}

/// The unit of work a retrieval error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchUnit {
    IdQuery,
    Chunk(usize),
    Page(usize),
}

impl fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchUnit::IdQuery => write!(f, "id query"),
            FetchUnit::Chunk(i) => write!(f, "chunk {i}"),
            FetchUnit::Page(i) => write!(f, "page {i}"),
        }
    }
}

/// A fetch failure that aborted a project's retrieval.
#[derive(Debug, Clone, Error)]
#[error("project '{project}', {unit}: {source}")]
pub struct RetrievalError {
    pub project: String,
    pub unit: FetchUnit,
    #[source]
    pub source: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("malformed {source_kind} record in project '{project}' (id: {}): {reason}", record_id.as_deref().unwrap_or("unknown"))]
    MalformedRecord {
        source_kind: &'static str,
        project: String,
        record_id: Option<String>,
        reason: String,
    },
}

/// A statistics table handed to the reconciler is missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("statistics table '{table}': {reason}")]
pub struct ReconciliationInputError {
    pub table: String,
    pub reason: String,
}

impl ReconciliationInputError {
    pub fn new(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

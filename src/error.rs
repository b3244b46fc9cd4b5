//! The closed error taxonomy shared by every Core API operation (spec §7).

use serde::Serialize;

/// The closed set of error kinds every fallible Core API operation can
/// produce. Adapters map each kind to a protocol-specific status
/// (HTTP status code, MCP error code) — see [`ErrorKind::http_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Unauthorized,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// The HTTP status the REST adapter should respond with.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

/// A Core API error: a closed `kind` plus a human-readable `reason`.
///
/// `Timeout` is deliberately absent — the Wait Coordinator converts
/// timeouts and cancellations into an empty result, never an error
/// (spec §4.4, §7).
#[derive(Debug, thiserror::Error, Serialize)]
#[error("{kind:?}: {reason}")]
pub struct BusError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl BusError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            reason: reason.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for BusError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => BusError::not_found("row not found"),
            other => BusError::internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

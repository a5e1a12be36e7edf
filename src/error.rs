//! Error types for telemetry queries
//!
//! Three kinds of failure flow through this crate:
//!
//! - **Request errors** ([`TimeBoundRequestError`]): a malformed request or a
//!   class sub-query that found no rows in its window. Each carries a
//!   machine-readable [`ReasonCode`].
//! - **Backend errors**: driver failures, deadline expiry and cancellation.
//!   These are always surfaced and map to [`ReasonCode::PsqlFailure`].
//! - **Combined errors**: both hardware classes failed for reasons that are
//!   not "no data", reported as a single value embedding both messages.

use crate::types::TimeBoundRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message attached to every "no rows in window" outcome
pub const NO_DATA_MESSAGE: &str = "No data in the time window";

/// Machine-readable reason attached to a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// The query succeeded but the window produced no matching rows
    NoData,
    /// Start time could not be parsed or is not acceptable
    BadStartTime,
    /// End time could not be parsed or is not acceptable
    BadEndTime,
    /// Window length could not be parsed
    BadWindowLen,
    /// Required request fields are missing or contradictory
    InvalidArguments,
    /// Window length is outside the accepted range
    WindowLenOutOfRange,
    /// The request carries options this service does not support
    BadOptions,
    /// The query returned no results at all
    NoResults,
    /// The backing store failed to answer
    PsqlFailure,
}

impl ReasonCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NoData => "NO_DATA",
            ReasonCode::BadStartTime => "BAD_START_TIME",
            ReasonCode::BadEndTime => "BAD_END_TIME",
            ReasonCode::BadWindowLen => "BAD_WINDOW_LEN",
            ReasonCode::InvalidArguments => "INVALID_ARGUMENTS",
            ReasonCode::WindowLenOutOfRange => "WINDOW_LEN_OUT_OF_RANGE",
            ReasonCode::BadOptions => "BAD_OPTIONS",
            ReasonCode::NoResults => "NO_RESULTS",
            ReasonCode::PsqlFailure => "PSQL_FAILURE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request-level failure tied to a time window
///
/// Built once where the failure is detected and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBoundRequestError {
    window: Option<TimeBoundRequest>,
    reason: ReasonCode,
    message: String,
}

impl TimeBoundRequestError {
    /// Create an error that is not tied to a window
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            window: None,
            reason,
            message: message.into(),
        }
    }

    /// Create an error for the given window
    pub fn for_window(
        window: TimeBoundRequest,
        reason: ReasonCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            window: Some(window),
            reason,
            message: message.into(),
        }
    }

    /// "No data in the time window" for the given window
    pub fn no_data(window: TimeBoundRequest) -> Self {
        Self::for_window(window, ReasonCode::NoData, NO_DATA_MESSAGE)
    }

    /// The offending window, when one is known
    pub fn window(&self) -> Option<&TimeBoundRequest> {
        self.window.as_ref()
    }

    /// Machine-readable reason
    pub fn reason(&self) -> ReasonCode {
        self.reason
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TimeBoundRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.window {
            Some(window) => write!(
                f,
                "Error: {}, Start Time: {}, End Time: {}",
                self.message,
                window.start.to_rfc3339(),
                window.end.to_rfc3339()
            ),
            None => write!(f, "Error: {}", self.message),
        }
    }
}

impl std::error::Error for TimeBoundRequestError {}

/// Main error type for telemetry queries
#[derive(Error, Debug)]
pub enum Error {
    /// Validation failure or "no data in window" outcome
    #[error(transparent)]
    Request(#[from] TimeBoundRequestError),

    /// Driver or statement failure reported by the store
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The request deadline expired before the query finished
    #[error("Query timed out: {0}")]
    Timeout(String),

    /// The request was cancelled by the caller
    #[error("Query cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Both hardware classes failed and at least one failure is not "no data"
    #[error("TSDB errors- Mountain query: {mountain}, River query: {river}")]
    Combined {
        /// Failure of the mountain sub-query
        mountain: Box<Error>,
        /// Failure of the river sub-query
        river: Box<Error>,
    },
}

impl Error {
    /// Shorthand for a "no data in window" error
    pub fn no_data(window: TimeBoundRequest) -> Self {
        Error::Request(TimeBoundRequestError::no_data(window))
    }

    /// Shorthand for a validation error
    pub fn invalid(reason: ReasonCode, message: impl Into<String>) -> Self {
        Error::Request(TimeBoundRequestError::new(reason, message))
    }

    /// True when this is the distinguished "no rows in window" outcome
    pub fn is_no_data(&self) -> bool {
        matches!(self, Error::Request(e) if e.reason() == ReasonCode::NoData)
    }

    /// True when the deadline fired or the caller cancelled
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Cancelled(_))
    }

    /// HTTP-style status code for reporting this error
    ///
    /// Request problems are 400, unsupported filters 501 and backend
    /// failures 500.
    pub fn status_code(&self) -> u16 {
        match self.reason() {
            ReasonCode::PsqlFailure => 500,
            ReasonCode::BadOptions => 501,
            _ => 400,
        }
    }

    /// Reason code reported to callers
    pub fn reason(&self) -> ReasonCode {
        match self {
            Error::Request(e) => e.reason(),
            Error::Configuration(_) => ReasonCode::InvalidArguments,
            Error::Database(_) | Error::Timeout(_) | Error::Cancelled(_) | Error::Combined { .. } => {
                ReasonCode::PsqlFailure
            },
        }
    }
}

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeBoundRequest {
        TimeBoundRequest::new(
            Utc.with_ymd_and_hms(2021, 3, 1, 13, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 3, 1, 14, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::no_data(window()).status_code(), 400);
        assert_eq!(
            Error::invalid(ReasonCode::WindowLenOutOfRange, "too long").status_code(),
            400
        );
        assert_eq!(Error::invalid(ReasonCode::BadOptions, "job id").status_code(), 501);
        assert_eq!(Error::Database(sqlx::Error::PoolTimedOut).status_code(), 500);
        assert_eq!(Error::Timeout("node energy".to_string()).status_code(), 500);
        let combined = Error::Combined {
            mountain: Box::new(Error::no_data(window())),
            river: Box::new(Error::Cancelled("river".to_string())),
        };
        assert_eq!(combined.status_code(), 500);
    }

    #[test]
    fn test_reason_code_wire_strings() {
        assert_eq!(ReasonCode::NoData.as_str(), "NO_DATA");
        assert_eq!(
            ReasonCode::WindowLenOutOfRange.to_string(),
            "WINDOW_LEN_OUT_OF_RANGE"
        );
        let json = serde_json::to_string(&ReasonCode::BadOptions).unwrap();
        assert_eq!(json, "\"BAD_OPTIONS\"");
    }

    #[test]
    fn test_no_data_display_includes_window() {
        let err = TimeBoundRequestError::no_data(window());
        let text = err.to_string();
        assert!(text.starts_with("Error: No data in the time window, Start Time: 2021-03-01T13:00:00"));
        assert!(text.contains("End Time: 2021-03-01T14:00:00"));
    }

    #[test]
    fn test_classification_helpers() {
        let no_data = Error::no_data(window());
        assert!(no_data.is_no_data());
        assert_eq!(no_data.reason(), ReasonCode::NoData);

        let timeout = Error::Timeout("mountain node energy".to_string());
        assert!(!timeout.is_no_data());
        assert!(timeout.is_interrupted());
        assert_eq!(timeout.reason(), ReasonCode::PsqlFailure);

        let invalid = Error::invalid(ReasonCode::InvalidArguments, "missing nodes");
        assert!(!invalid.is_no_data());
        assert_eq!(invalid.to_string(), "Error: missing nodes");
    }

    #[test]
    fn test_combined_message_embeds_both() {
        let err = Error::Combined {
            mountain: Box::new(Error::Timeout("mountain".to_string())),
            river: Box::new(Error::no_data(window())),
        };
        let text = err.to_string();
        assert!(text.starts_with("TSDB errors- Mountain query: Query timed out: mountain"));
        assert!(text.contains("River query: Error: No data in the time window"));
        assert_eq!(err.reason(), ReasonCode::PsqlFailure);
    }
}

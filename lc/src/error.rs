//! LMS client error types

use thiserror::Error;

/// Errors that can occur while talking to the LMS REST API
#[derive(Debug, Error)]
pub enum LmsError {
    #[error("LMS token not set")]
    MissingToken,

    #[error("LMS API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response shape from {endpoint}: expected {expected}")]
    UnexpectedShape { endpoint: String, expected: &'static str },

    #[error("{endpoint} still had more pages after {pages}")]
    PageLimit { endpoint: String, pages: usize },

    #[error("Invalid course id: {0:?}")]
    InvalidCourseId(String),
}

impl LmsError {
    /// HTTP status of the failed request, if the LMS answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            LmsError::Api { status, .. } => Some(*status),
            LmsError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if the LMS reported the resource as missing or disabled for this course
    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }
}

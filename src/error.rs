use thiserror::Error;

/// The language model's completion did not contain a usable JSON document.
#[derive(Debug, Error)]
#[error("failed to parse model response into work items: {source}")]
pub struct ParseError {
    /// The full completion text, kept for diagnostics.
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

/// Errors returned by the issue tracker or the completion endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The remote service answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failure or an undecodable response body.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Success status, but the body lacks what the caller needs.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Malformed(_) => None,
        }
    }
}

/// The caller has no usable Jira credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required. Please connect to JIRA first.")]
    MissingToken,

    #[error("JIRA session expired. Please reconnect to JIRA.")]
    Expired { expired_at: i64 },

    #[error("Failed to retrieve JIRA cloud ID")]
    NoAccessibleResources,
}

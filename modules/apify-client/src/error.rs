use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run failed with status: {0}")]
    RunFailed(String),

    #[error("Profile not found: {0}")]
    NotFound(String),
}

impl ApifyError {
    /// Throttling, timeouts and server-side failures. Retrying may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApifyError::Network { .. } => true,
            ApifyError::Api { status, .. } => *status == 429 || *status >= 500,
            ApifyError::RunFailed(status) => status == "TIMED-OUT",
            ApifyError::Parse(_) | ApifyError::NotFound(_) => false,
        }
    }

    /// Rate-limit responses specifically, for callers that count them.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApifyError::Api { status: 429, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApifyError::NotFound(_) | ApifyError::Api { status: 404, .. }
        )
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        ApifyError::Network {
            timeout: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Parse(err.to_string())
    }
}

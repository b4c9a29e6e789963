use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("Rate limited (status {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No structured output in response")]
    NoOutput,
}

impl AiError {
    /// Worth retrying after a backoff: throttling, overload, timeouts and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::RateLimited { .. } => true,
            AiError::Network { timeout, .. } => *timeout,
            AiError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classify a non-success HTTP status returned by the API.
    pub fn from_status(status: u16, message: String) -> Self {
        // 529 is Anthropic's "overloaded" status.
        if status == 429 || status == 529 {
            AiError::RateLimited { status, message }
        } else {
            AiError::Api { status, message }
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Network {
            timeout: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_overload_are_transient() {
        assert!(AiError::from_status(429, "slow down".into()).is_transient());
        assert!(AiError::from_status(529, "overloaded".into()).is_transient());
        assert!(AiError::from_status(503, "unavailable".into()).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!AiError::from_status(400, "bad request".into()).is_transient());
        assert!(!AiError::from_status(401, "bad key".into()).is_transient());
        assert!(!AiError::Parse("eof".into()).is_transient());
        assert!(!AiError::NoOutput.is_transient());
    }
}

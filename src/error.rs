use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),

    #[error("Counter unavailable: {0}")]
    Counter(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Compact form stored as a worker's last error.
    pub fn short_description(&self) -> String {
        match self {
            Error::Status(status) => format!("HTTP {}", status.as_u16()),
            Error::Http(e) if e.is_timeout() => "timeout".to_string(),
            Error::Http(e) if e.is_connect() => "connection failed".to_string(),
            Error::Http(e) => match e.status() {
                Some(status) => format!("HTTP {}", status.as_u16()),
                None => "request failed".to_string(),
            },
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_shortened() {
        let err = Error::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.short_description(), "HTTP 503");
    }

    #[test]
    fn other_errors_use_display() {
        let err = Error::Internal("boom".to_string());
        assert_eq!(err.short_description(), "Internal error: boom");
    }
}

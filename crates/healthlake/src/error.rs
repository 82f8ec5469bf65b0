use thiserror::Error;

/// Main error type for healthlake
#[derive(Error, Debug)]
pub enum HealthlakeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown time zone '{0}'. Expected an IANA zone name such as Australia/Melbourne")]
    TimeZone(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, HealthlakeError>;

impl HealthlakeError {
    /// Create a storage error from a message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Render an error for terminal output, with a hint where one helps
pub fn format_user_error(err: &HealthlakeError) -> String {
    match err {
        HealthlakeError::TimeZone(_) => format!(
            "{}\nHint: set --timezone or HEALTHLAKE_TZ to a valid zone",
            err
        ),
        HealthlakeError::NotFound(_) => {
            format!("{}\nHint: run 'healthlake stage' and then 'healthlake transform' first", err)
        }
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HealthlakeError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_time_zone_error() {
        let err = HealthlakeError::TimeZone("Mars/Olympus".to_string());
        assert!(err.to_string().contains("Mars/Olympus"));
        assert!(format_user_error(&err).contains("HEALTHLAKE_TZ"));
    }

    #[test]
    fn test_invalid_date_format_error() {
        let err = HealthlakeError::InvalidDateFormat("not-a-date".to_string());
        assert!(err.to_string().contains("not-a-date"));
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_error_constructors() {
        let storage_err = HealthlakeError::storage("bad write");
        assert!(matches!(storage_err, HealthlakeError::Storage(_)));

        let config_err = HealthlakeError::config("test config");
        assert!(matches!(config_err, HealthlakeError::Config(_)));

        let param_err = HealthlakeError::invalid_param("bad param");
        assert!(matches!(param_err, HealthlakeError::InvalidParameter(_)));
    }
}

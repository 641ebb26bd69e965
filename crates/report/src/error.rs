use std::fmt;

/// Run-aborting failures. Per-row problems never surface here; they are
/// dropped and counted instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportError {
    /// Missing or contradictory source settings.
    Configuration(String),
    /// No dated artifact or no result rows for the target date.
    NotFound(String),
    /// Relational source unreachable or rejected the login.
    Connection(String),
    /// Required field malformed beyond tolerance.
    DataShape(String),
    /// Destination workbook not writable or missing sections.
    Write(String),
}

impl ReportError {
    /// Stable identifier for machine output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::NotFound(_) => "not_found",
            Self::Connection(_) => "connection",
            Self::DataShape(_) => "data_shape",
            Self::Write(_) => "write",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(msg)
            | Self::NotFound(msg)
            | Self::Connection(msg)
            | Self::DataShape(msg)
            | Self::Write(msg) => msg,
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Connection(msg) => write!(f, "connection error: {msg}"),
            Self::DataShape(msg) => write!(f, "data shape error: {msg}"),
            Self::Write(msg) => write!(f, "write error: {msg}"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<rentab_config::ConfigError> for ReportError {
    fn from(err: rentab_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ReportError::Configuration("x".into()).kind(), "configuration");
        assert_eq!(ReportError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(ReportError::Connection("x".into()).kind(), "connection");
        assert_eq!(ReportError::DataShape("x".into()).kind(), "data_shape");
        assert_eq!(ReportError::Write("x".into()).kind(), "write");
    }

    #[test]
    fn display_carries_cause() {
        let err = ReportError::NotFound("no EXCZ980 export for 2024-03-03".into());
        assert_eq!(err.to_string(), "not found: no EXCZ980 export for 2024-03-03");
        assert_eq!(err.message(), "no EXCZ980 export for 2024-03-03");
    }
}

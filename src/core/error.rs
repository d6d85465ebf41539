use thiserror::Error;

/// Errors surfaced by the telemetry SDK.
///
/// Recording hot paths never return these to the application; they are
/// reported through diagnostics counters instead. The variants here cover
/// configuration, pipeline control and collaborator failures.
#[derive(Error, Debug)]
pub enum KerroError {
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("duplicate instrument registration: {name}")]
    DuplicateInstrument { name: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sampling rate must be between 0.0 and 1.0, got {0}")]
    InvalidSamplingRate(f64),

    #[error("export failed: {0}")]
    Export(String),

    #[error("timeout: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("pipeline is shutting down")]
    ShuttingDown,

    #[error("channel send error")]
    ChannelSend,

    #[error("channel receive error")]
    ChannelReceive,

    #[error("async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, KerroError>;

impl KerroError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Creates a new invalid-attribute error
    pub fn invalid_attribute<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAttribute(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Export(_) => true,
            Self::Timeout { .. } => true,
            Self::ChannelSend | Self::ChannelReceive => true,
            Self::DuplicateInstrument { .. } => true,
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidAttribute(_) => "validation",
            Self::DuplicateInstrument { .. } => "registration",
            Self::Config(_) | Self::InvalidSamplingRate(_) => "config",
            Self::Export(_) => "export",
            Self::Timeout { .. } => "timeout",
            Self::ShuttingDown => "lifecycle",
            Self::ChannelSend | Self::ChannelReceive => "channel",
            Self::Join(_) => "async",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = KerroError::config("bad interval");
        assert_eq!(err.to_string(), "configuration error: bad interval");
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(KerroError::export("exporter unreachable").is_recoverable());
        assert!(KerroError::Timeout { timeout_ms: 5000 }.is_recoverable());
        assert!(!KerroError::config("invalid").is_recoverable());
        assert!(!KerroError::ShuttingDown.is_recoverable());
    }

    #[test]
    fn test_duplicate_instrument_is_warning_grade() {
        let err = KerroError::DuplicateInstrument {
            name: "http.requests".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "registration");
    }
}

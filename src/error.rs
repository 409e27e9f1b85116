use thiserror::Error;

/// Unified error type for the stealth egress layer
#[derive(Error, Debug)]
pub enum StealthError {
    // Pool errors
    #[error("No endpoint in the pool is currently available")]
    PoolExhausted,

    #[error("No proxy available for {domain}")]
    NoProxyAvailable { domain: String },

    #[error("All {attempts} attempts failed, last error: {last_error}")]
    AllAttemptsFailed {
        attempts: u32,
        #[source]
        last_error: AttemptError,
    },

    // Input errors
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Collaborator errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for stealth egress operations
pub type Result<T> = std::result::Result<T, StealthError>;

impl StealthError {
    /// Whether this error ends a `Session::request` call
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StealthError::PoolExhausted
                | StealthError::NoProxyAvailable { .. }
                | StealthError::AllAttemptsFailed { .. }
        )
    }

    /// Whether the pool had nothing selectable
    pub fn is_pool_exhaustion(&self) -> bool {
        matches!(
            self,
            StealthError::PoolExhausted | StealthError::NoProxyAvailable { .. }
        )
    }
}

impl From<url::ParseError> for StealthError {
    fn from(err: url::ParseError) -> Self {
        StealthError::InvalidUrl(err.to_string())
    }
}

/// Failure reported by an injected HTTP client for a single attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("failed to build request: {0}")]
    Build(String),
}

impl TransportError {
    /// Network-level failures (timeouts and connect errors)
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

/// Why a single attempt did not produce a usable response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("response matched block signature {signature:?} (HTTP {status})")]
    Blocked { status: u16, signature: String },

    #[error("no attempt was made")]
    NotAttempted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert!(StealthError::PoolExhausted.is_terminal());
        assert!(StealthError::NoProxyAvailable {
            domain: "example.com".to_string()
        }
        .is_terminal());
        assert!(StealthError::AllAttemptsFailed {
            attempts: 3,
            last_error: AttemptError::Status(503),
        }
        .is_terminal());

        assert!(!StealthError::InvalidUrl("bad".to_string()).is_terminal());
        assert!(!StealthError::InvalidConfig("bad".to_string()).is_terminal());
    }

    #[test]
    fn test_pool_exhaustion_helper() {
        assert!(StealthError::PoolExhausted.is_pool_exhaustion());
        assert!(StealthError::NoProxyAvailable {
            domain: "example.com".to_string()
        }
        .is_pool_exhaustion());
        assert!(!StealthError::AllAttemptsFailed {
            attempts: 1,
            last_error: AttemptError::NotAttempted,
        }
        .is_pool_exhaustion());
    }

    #[test]
    fn test_all_attempts_failed_message_and_source() {
        let err = StealthError::AllAttemptsFailed {
            attempts: 3,
            last_error: AttemptError::Transport(TransportError::Timeout),
        };
        assert_eq!(
            err.to_string(),
            "All 3 attempts failed, last error: request timed out"
        );

        let source = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(source.as_deref(), Some("request timed out"));
    }

    #[test]
    fn test_transport_error_is_network() {
        assert!(TransportError::Timeout.is_network());
        assert!(TransportError::Connect("refused".to_string()).is_network());
        assert!(!TransportError::Protocol("bad frame".to_string()).is_network());
        assert!(!TransportError::Build("bad header".to_string()).is_network());
    }

    #[test]
    fn test_url_parse_error_conversion() {
        let err: StealthError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, StealthError::InvalidUrl(_)));
    }
}

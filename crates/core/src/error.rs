//! Unified error types for the ResqPulse gateway.
//!
//! Error codes:
//! - VALID_001-004: Sample validation errors
//! - SEQ_001: Out-of-order samples
//! - AUTH_001-003: Token verification errors
//! - STORE_001-003: Persistence errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Sample validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleErrorCode {
    /// VALID_001: Required field is absent
    MissingField,
    /// VALID_002: Numeric field is NaN or infinite
    NonFinite,
    /// VALID_003: Numeric field outside its hard bounds
    OutOfRange,
    /// VALID_004: Field has the wrong type or the payload is malformed
    Malformed,
}

impl SampleErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField => "VALID_001",
            Self::NonFinite => "VALID_002",
            Self::OutOfRange => "VALID_003",
            Self::Malformed => "VALID_004",
        }
    }
}

/// Authentication error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// AUTH_001: Authorization header is required
    MissingToken,
    /// AUTH_002: Authorization header is not a bearer token
    InvalidFormat,
    /// AUTH_003: Token was rejected by the verifier
    InvalidToken,
}

impl AuthErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "AUTH_001",
            Self::InvalidFormat => "AUTH_002",
            Self::InvalidToken => "AUTH_003",
        }
    }
}

/// Store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Write (set/update/delete) failed
    WriteFailed,
    /// STORE_002: Read or query failed
    ReadFailed,
    /// STORE_003: Store unreachable
    Unavailable,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed => "STORE_001",
            Self::ReadFailed => "STORE_002",
            Self::Unavailable => "STORE_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::WriteFailed | Self::ReadFailed => 500,
            Self::Unavailable => 503,
        }
    }
}

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range sample. Dropped by the engine, never fatal.
    #[error("[{code}] {message}")]
    InvalidSample {
        code: &'static str,
        field: Option<String>,
        message: String,
    },

    /// Sample older than the device's last accepted sample.
    #[error("[SEQ_001] stale sample for device {device_id}: timestamp {timestamp} precedes {last_sample_time}")]
    StaleSample {
        device_id: String,
        timestamp: i64,
        last_sample_time: i64,
    },

    #[error("[{code}] {message}")]
    Unauthorized { code: &'static str, message: String },

    /// Downstream persistence failure. Never rolls back in-memory state.
    #[error("[{code}] {message}")]
    Persistence {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a sample validation error bound to a field.
    pub fn invalid_sample(
        code: SampleErrorCode,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::InvalidSample {
            code: code.code(),
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Create a sample validation error that is not tied to one field.
    pub fn malformed_sample(msg: impl Into<String>) -> Self {
        Self::InvalidSample {
            code: SampleErrorCode::Malformed.code(),
            field: None,
            message: msg.into(),
        }
    }

    pub fn stale(device_id: impl Into<String>, timestamp: i64, last_sample_time: i64) -> Self {
        Self::StaleSample {
            device_id: device_id.into(),
            timestamp,
            last_sample_time,
        }
    }

    /// Create an authentication error.
    pub fn unauthorized(code: AuthErrorCode, msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(code: StoreErrorCode, msg: impl Into<String>) -> Self {
        Self::Persistence {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn device_unavailable(device_id: impl Into<String>) -> Self {
        Self::DeviceUnavailable(device_id.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidSample { .. } => 400,
            Self::StaleSample { .. } => 409,
            Self::Unauthorized { .. } => 401,
            Self::Persistence { http_status, .. } => *http_status,
            Self::Config(_) => 500,
            Self::DeviceUnavailable(_) => 503,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSample { code, .. } => Some(code),
            Self::StaleSample { .. } => Some("SEQ_001"),
            Self::Unauthorized { code, .. } => Some(code),
            Self::Persistence { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::DeviceUnavailable(_))
    }
}

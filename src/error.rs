use std::fmt;
use thiserror::Error;

/// Type alias for results returned by the admin client
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the admin client
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Refresh rejected or absent, or authorization failed after the retry.
    /// Always resolved by a forced logout.
    #[error("Authorization failed: {reason}")]
    Auth { reason: String },

    /// Network failure or server fault, surfaced verbatim
    #[error("Request failed: {reason}")]
    Transient {
        reason: String,
        status: Option<u16>,
    },

    /// Required input missing before dispatch
    #[error("Invalid input for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Business-rule rejection reported by the remote side
    #[error("{message}")]
    Domain { status: u16, message: String },

    /// Response payload did not have the expected shape
    #[error("Unexpected response payload: {reason}")]
    Decode { reason: String },

    /// Credential file could not be read or written
    #[error("Credential storage error: {reason}")]
    Storage { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {reason}")]
    Config { key: String, reason: String },
}

impl Error {
    pub fn auth(reason: impl Into<String>) -> Self {
        Error::Auth {
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Error::Transient {
            reason: reason.into(),
            status: None,
        }
    }

    pub fn server(status: u16, reason: impl Into<String>) -> Self {
        Error::Transient {
            reason: reason.into(),
            status: Some(status),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn domain(status: u16, message: impl Into<String>) -> Self {
        Error::Domain {
            status,
            message: message.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Error::Decode {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Error::Storage {
            reason: reason.into(),
        }
    }

    /// Error code for categorization and identification
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Auth { .. } => ErrorCode::AuthorizationFailed,
            Error::Transient { status: Some(_), .. } => ErrorCode::ApiServerFault,
            Error::Transient { status: None, .. } => ErrorCode::NetworkFailure,
            Error::Validation { .. } => ErrorCode::InputInvalid,
            Error::Domain { .. } => ErrorCode::ApiRequestRejected,
            Error::Decode { .. } => ErrorCode::ApiResponseInvalid,
            Error::Storage { .. } => ErrorCode::CredentialStorageFailed,
            Error::Config { .. } => ErrorCode::ConfigInvalid,
        }
    }

    /// Error category for handling strategies in the calling view
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Auth { .. } => ErrorCategory::Authentication,
            Error::Transient { .. } => ErrorCategory::Network,
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::Domain { .. } => ErrorCategory::Service,
            Error::Decode { .. } | Error::Storage { .. } => ErrorCategory::Internal,
            Error::Config { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error ended the authenticated session
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::transient(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::decode(err.to_string())
    }
}

/// Enumeration of error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AuthorizationFailed,
    NetworkFailure,
    ApiServerFault,
    ApiRequestRejected,
    ApiResponseInvalid,
    InputInvalid,
    CredentialStorageFailed,
    ConfigInvalid,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::AuthorizationFailed => "AUTH_FAILED",
            ErrorCode::NetworkFailure => "NETWORK_FAILURE",
            ErrorCode::ApiServerFault => "API_SERVER_FAULT",
            ErrorCode::ApiRequestRejected => "API_REQUEST_REJECTED",
            ErrorCode::ApiResponseInvalid => "API_RESPONSE_INVALID",
            ErrorCode::InputInvalid => "INPUT_INVALID",
            ErrorCode::CredentialStorageFailed => "CREDENTIAL_STORAGE_FAILED",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        };
        write!(f, "{}", code_str)
    }
}

/// Error category for filtering and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (connection, server fault)
    Network,
    /// Authentication-related errors
    Authentication,
    /// Input rejected before any call was made
    Validation,
    /// Remote business-rule rejections
    Service,
    /// Configuration-related errors
    Configuration,
    /// Internal errors
    Internal,
}

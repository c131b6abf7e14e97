//! Centralized error types for WeatherWatch.
//!
//! This module provides a typed error hierarchy that:
//! - Separates transient network failures from malformed payloads
//! - Keeps storage and notification failures non-fatal for a cycle
//! - Provides short operator-facing messages for log summaries

use thiserror::Error;

/// Top-level application error type.
///
/// `Config` only comes out of startup. The rest are cycle failures: logged
/// at the cycle boundary, after which the monitor keeps going.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a short operator-facing summary of the failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Data(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Other(_) => "An unexpected error occurred.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Unable to reach the weather service.",
            NetworkError::Timeout => "The weather service did not answer in time.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The weather service is experiencing issues."
            }
            NetworkError::ServerError { .. } => "The weather service rejected the request.",
            NetworkError::InvalidResponse(_) => "The weather service sent an unreadable response.",
        }
    }

    /// Classify this failure for the retry loop.
    ///
    /// Timeouts, connection failures and every non-2xx status are transient.
    /// A body that is not JSON at all will not improve on retry.
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            NetworkError::Timeout
            | NetworkError::ConnectionFailed(_)
            | NetworkError::ServerError { .. } => RetryDecision::Retry,
            NetworkError::InvalidResponse(_) => RetryDecision::NoRetry,
        }
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Should retry the request
    Retry,
    /// Should not retry - permanent failure
    NoRetry,
}

/// Malformed payload errors. Never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid field {field}: {message}")]
    InvalidField { field: String, message: String },
}

impl DataError {
    pub fn missing(field: impl Into<String>) -> Self {
        DataError::MissingField(field.into())
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        "The weather payload was not in the expected shape."
    }
}

/// Storage errors (SQLite, in-memory store).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Storage task failed: {0}")]
    TaskFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::ConnectionFailed(_) => "Unable to open the observation store.",
            StorageError::QueryFailed(_) | StorageError::TaskFailed(_) => {
                "A storage operation failed."
            }
            StorageError::Corruption(_) => "The observation store may be corrupted.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed.",
            ConfigError::MissingSetting(_) => "A required setting is missing.",
        }
    }
}

/// Alert delivery errors. Best-effort, never escalated.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Endpoint rejected alerts with status {status}")]
    Rejected { status: u16 },
}

impl NotifyError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NotifyError::Delivery(_) => "Alert delivery failed.",
            NotifyError::Rejected { .. } => "The alert endpoint rejected the alerts.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_storage_error(self) -> StorageError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_storage_error(self) -> StorageError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                StorageError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                StorageError::ConnectionFailed(self.to_string())
            }
            _ => StorageError::QueryFailed(self.to_string()),
        }
    }
}

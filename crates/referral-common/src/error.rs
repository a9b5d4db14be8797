//! Error types for the referral metrics engine
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for referral operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for referral operations
#[derive(Debug, Error)]
pub enum Error {
    // Record errors
    #[error("partner not found: {0}")]
    PartnerNotFound(String),

    #[error("invalid partner id: {0:?}")]
    InvalidPartnerId(String),

    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),

    // Store errors
    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PartnerNotFound(_))
    }

    /// Check if the failure came from the backing store and may succeed on retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Self::Deserialization(e.to_string())
        } else {
            Self::Serialization(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::PartnerNotFound("p1".into()).is_not_found());
        assert!(!Error::store("down").is_not_found());
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::store("timeout").is_retryable());
        assert!(!Error::PartnerNotFound("p1".into()).is_retryable());
    }

    #[test]
    fn test_json_error_maps_to_deserialization() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        assert!(matches!(Error::from(err), Error::Deserialization(_)));
    }
}

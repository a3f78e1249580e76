//! Error types
//!
//! A single crate-wide [`enum@Error`] is used by every provider, the codec and the
//! transport, so a failure can travel through the dispatcher unchanged and be
//! wrapped with the registration that produced it.

use std::fmt;
use thiserror::Error;

use crate::policy::Operation;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Alias kept for call sites that read better with a domain name
pub type AuditError = Error;

/// Why a certificate bundle was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateErrorKind {
    /// File missing, unreadable, or no certificate inside the bundle
    NotFound,
    /// `NotAfter` is in the past
    Expired,
    /// `NotBefore` is in the future
    NotYetValid,
    /// Certificate key algorithm does not fit the requested mode
    WrongKeyType,
    /// PEM/DER content could not be parsed
    Malformed,
}

impl fmt::Display for CertificateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Expired => write!(f, "expired"),
            Self::NotYetValid => write!(f, "not_yet_valid"),
            Self::WrongKeyType => write!(f, "wrong_key_type"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Main error type for the crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// A provider call failed; carries the registration name for diagnosis
    #[error("Provider '{registration}' failed during {operation}: {source}")]
    Provider {
        /// Registration name
        registration: String,
        /// Operation that was being dispatched
        operation: Operation,
        /// Underlying failure
        source: Box<Error>,
    },

    /// Certificate missing, expired, not yet valid, or of the wrong type
    #[error("Certificate invalid ({kind}): {message}")]
    CertificateInvalid {
        /// Diagnostic sub-kind
        kind: CertificateErrorKind,
        /// Human-readable detail
        message: String,
    },

    /// Key half required by the algorithm mode is missing, or present when it must not be
    #[error("Invalid key configuration: {0}")]
    InvalidKeyConfiguration(String),

    /// Socket connect or write failure
    #[error("Transport to {target} failed: {source}")]
    Transport {
        /// `host:port` of the remote collector
        target: String,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Malformed host, port, path or identifier supplied at construction
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration could not be loaded or extracted
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Relational backend failure
    #[error("Database error: {0}")]
    Database(Box<sqlx::Error>),

    /// Event (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Signing, encryption or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Record to replace does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller cancelled the dispatch before every registration finished
    #[error("Dispatch cancelled")]
    Cancelled,

    /// A provider task panicked or was aborted
    #[error("Provider task failed: {0}")]
    TaskFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a certificate error of the given kind
    pub fn certificate(kind: CertificateErrorKind, message: impl Into<String>) -> Self {
        Self::CertificateInvalid {
            kind,
            message: message.into(),
        }
    }

    /// Create a transport error for the given target
    pub fn transport(target: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Transport {
            target: target.to_string(),
            source,
        }
    }

    /// Certificate sub-kind, if this is a certificate error
    pub fn certificate_kind(&self) -> Option<CertificateErrorKind> {
        match self {
            Self::CertificateInvalid { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Name of the registration that produced this error, if it came through a dispatcher
    pub fn registration(&self) -> Option<&str> {
        match self {
            Self::Provider { registration, .. } => Some(registration),
            _ => None,
        }
    }

    /// Configuration bugs that must not be retried
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::CertificateInvalid { .. }
            | Self::InvalidKeyConfiguration(_)
            | Self::Configuration(_)
            | Self::Config(_) => true,
            Self::Provider { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_names_registration() {
        let err = Error::Provider {
            registration: "siem".to_string(),
            operation: Operation::Insert,
            source: Box::new(Error::Crypto("boom".to_string())),
        };
        assert_eq!(err.registration(), Some("siem"));
        assert!(err.to_string().contains("'siem'"));
        assert!(err.to_string().contains("insert"));
    }

    #[test]
    fn configuration_errors_are_classified() {
        let cert = Error::certificate(CertificateErrorKind::Expired, "expired yesterday");
        assert!(cert.is_configuration());
        assert_eq!(cert.certificate_kind(), Some(CertificateErrorKind::Expired));

        let wrapped = Error::Provider {
            registration: "db".to_string(),
            operation: Operation::Get,
            source: Box::new(Error::InvalidKeyConfiguration("no key".to_string())),
        };
        assert!(wrapped.is_configuration());

        let transient = Error::transport(
            "127.0.0.1:514",
            std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        );
        assert!(!transient.is_configuration());
        assert!(transient.to_string().contains("127.0.0.1:514"));
    }
}

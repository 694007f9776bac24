//! Error types for the push core.

use std::fmt::{self, Display};

use backtrace::Backtrace;
use thiserror::Error;
use trailpush_common::errors::ApcError;

/// Common `Result` type.
pub type PushResult<T> = Result<T, PushError>;

/// Top-level error type for key handling, signing and configuration.
///
/// Delivery problems for a single subscriber are not errors, see
/// [`crate::routers::DeliveryFailure`].
#[derive(Debug)]
pub struct PushError {
    pub kind: PushErrorKind,
    pub backtrace: Box<Backtrace>,
}

impl Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        // Go down the chain of errors
        let mut error: &dyn std::error::Error = &self.kind;
        while let Some(source) = error.source() {
            write!(f, "\n\nCaused by: {source}")?;
            error = source;
        }

        Ok(())
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// Forward From impls to PushError from PushErrorKind. Because From is reflexive,
// this impl also takes care of From<PushErrorKind>.
impl<T> From<T> for PushError
where
    PushErrorKind: From<T>,
{
    fn from(item: T) -> Self {
        PushError {
            kind: PushErrorKind::from(item),
            backtrace: Box::new(Backtrace::new()),
        }
    }
}

/// Messages in this enum must never carry raw key material.
#[derive(Debug, Error)]
pub enum PushErrorKind {
    #[error("Unable to generate a VAPID key pair: {0}")]
    KeyGeneration(String),

    #[error("Invalid VAPID key: {0}")]
    InvalidKeyFormat(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(&'static str),

    #[error("Error while signing VAPID token")]
    Signing(#[source] openssl::error::ErrorStack),

    #[error("Invalid VAPID token: {0}")]
    InvalidToken(String),

    #[error("Invalid push endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] ApcError),
}

impl PushErrorKind {
    pub fn as_metric(&self) -> &'static str {
        match self {
            Self::KeyGeneration(_) => "key_generation",
            Self::InvalidKeyFormat(_) => "invalid_key_format",
            Self::MalformedSignature(_) => "malformed_signature",
            Self::Signing(_) => "signing",
            Self::InvalidToken(_) => "invalid_token",
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::Configuration(_) => "configuration",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Common(e) => e.kind.as_metric(),
        }
    }
}

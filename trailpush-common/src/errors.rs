//! Error handling for Rust
//!

use std::fmt::{self, Display};

use backtrace::Backtrace;
use thiserror::Error;

/// Common error (To distinguish from the push core's `PushError`)
#[derive(Debug)]
pub struct ApcError {
    pub kind: ApcErrorKind,
    pub backtrace: Box<Backtrace>,
}

// Print out the error and backtrace, including source errors
impl Display for ApcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}\nBacktrace: \n{:?}", self.kind, self.backtrace)?;

        // Go down the chain of errors
        let mut error: &dyn std::error::Error = &self.kind;
        while let Some(source) = error.source() {
            write!(f, "\n\nCaused by: {source}")?;
            error = source;
        }

        Ok(())
    }
}

impl std::error::Error for ApcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// Forward From impls to ApcError from ApcErrorKind. Because From is reflexive,
// this impl also takes care of From<ApcErrorKind>.
impl<T> From<T> for ApcError
where
    ApcErrorKind: From<T>,
{
    fn from(item: T) -> Self {
        ApcError {
            kind: ApcErrorKind::from(item),
            backtrace: Box::new(Backtrace::new()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApcErrorKind {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("General Error: {0}")]
    GeneralError(String),
}

impl ApcErrorKind {
    /// A short, low cardinality label for metrics and log tags
    pub fn as_metric(&self) -> &'static str {
        match self {
            Self::Base64(_) => "base64",
            Self::GeneralError(_) => "general",
        }
    }
}

pub type Result<T> = std::result::Result<T, ApcError>;

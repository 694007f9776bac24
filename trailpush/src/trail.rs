//! Trail records as supplied by the status board.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PushError, PushErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailStatus {
    Open,
    Caution,
    Closed,
}

impl TrailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Caution => "caution",
            Self::Closed => "closed",
        }
    }

    /// Capitalized form used in notification text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Caution => "Caution",
            Self::Closed => "Closed",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Open => "🟢",
            Self::Caution => "🟡",
            Self::Closed => "🔴",
        }
    }
}

impl fmt::Display for TrailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrailStatus {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "caution" => Ok(Self::Caution),
            "closed" => Ok(Self::Closed),
            other => Err(PushErrorKind::Configuration(format!(
                "unknown trail status {other:?}, expected open, caution or closed"
            ))
            .into()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    pub id: u64,
    pub name: String,
    pub status: TrailStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

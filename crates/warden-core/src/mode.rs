//! Quorum encryption modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Encryption mode of the quorum peer transport.
///
/// Stored in the application scope under [`crate::keys::QUORUM`] and echoed
/// back by each unit after it restarts with the matching transport config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuorumMode {
    /// Bootstrap default before the first reconciliation settles.
    DefaultNonSsl,
    /// Plaintext peer transport.
    NonSsl,
    /// Encrypted peer transport.
    Ssl,
}

impl QuorumMode {
    /// True for either plaintext variant.
    pub fn is_plaintext(self) -> bool {
        !matches!(self, QuorumMode::Ssl)
    }

    /// The string form persisted in the shared store.
    pub fn as_str(self) -> &'static str {
        match self {
            QuorumMode::DefaultNonSsl => "default-non-ssl",
            QuorumMode::NonSsl => "non-ssl",
            QuorumMode::Ssl => "ssl",
        }
    }
}

impl fmt::Display for QuorumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a quorum mode string.
#[derive(Debug, thiserror::Error)]
#[error("unknown quorum mode '{0}'. valid options: default-non-ssl, non-ssl, ssl")]
pub struct ParseModeError(String);

impl FromStr for QuorumMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default-non-ssl" => Ok(QuorumMode::DefaultNonSsl),
            "non-ssl" => Ok(QuorumMode::NonSsl),
            "ssl" => Ok(QuorumMode::Ssl),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

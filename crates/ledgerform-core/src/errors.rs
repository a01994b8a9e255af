//! Shared error types
//!
//! `LedgerError` is the single failure type every `LedgerClient` call returns.
//! Its variants carry enough classification for the engine to tell an
//! unreachable node from one that refused the request; callers above the
//! client decide what a given class means for their step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Coarse classification of a ledger client failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerErrorKind {
    /// Transport level failure: connection refused, timeout, unavailable
    Unreachable,
    /// The remote node authenticated us and refused the request
    AccessDenied,
    /// The remote node processed the request and rejected it
    Rejected,
    /// The request was malformed before reaching the network
    InvalidArgument,
    /// The referenced object does not exist remotely
    NotFound,
    /// Anything the client could not classify
    Other,
}

impl fmt::Display for LedgerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LedgerErrorKind::Unreachable => "unreachable",
            LedgerErrorKind::AccessDenied => "access denied",
            LedgerErrorKind::Rejected => "rejected",
            LedgerErrorKind::InvalidArgument => "invalid argument",
            LedgerErrorKind::NotFound => "not found",
            LedgerErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Failure reported by a `LedgerClient` implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum LedgerError {
    /// Node could not be reached
    #[error("{target} unreachable: {reason}")]
    Unreachable {
        /// Node or endpoint that failed
        target: String,
        /// Transport failure description
        reason: String,
    },
    /// Node refused the request for the presented identity
    #[error("access denied by {target}: {reason}")]
    AccessDenied {
        /// Node that refused
        target: String,
        /// Refusal description
        reason: String,
    },
    /// Node processed and rejected the request
    #[error("{target} rejected request: {reason}")]
    Rejected {
        /// Node that rejected
        target: String,
        /// Rejection description
        reason: String,
    },
    /// Request could not be built
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong
        message: String,
    },
    /// Remote object does not exist
    #[error("not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },
    /// Unclassified client failure
    #[error("ledger client error: {message}")]
    Other {
        /// Failure description
        message: String,
    },
}

impl LedgerError {
    /// Transport failure towards `target`
    pub fn unreachable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Authorization failure from `target`
    pub fn access_denied(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Request rejected by `target`
    pub fn rejected(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Malformed request
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Missing remote object
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Unclassified failure
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classification of this failure
    pub fn kind(&self) -> LedgerErrorKind {
        match self {
            LedgerError::Unreachable { .. } => LedgerErrorKind::Unreachable,
            LedgerError::AccessDenied { .. } => LedgerErrorKind::AccessDenied,
            LedgerError::Rejected { .. } => LedgerErrorKind::Rejected,
            LedgerError::InvalidArgument { .. } => LedgerErrorKind::InvalidArgument,
            LedgerError::NotFound { .. } => LedgerErrorKind::NotFound,
            LedgerError::Other { .. } => LedgerErrorKind::Other,
        }
    }

    /// Whether the node refused the presented identity
    pub fn is_access_denied(&self) -> bool {
        self.kind() == LedgerErrorKind::AccessDenied
    }
}

/// A key referenced by the engine is not declared in the topology
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} '{key}' is not declared in the topology")]
pub struct TopologyLookupError {
    /// Category of the missing entry (channel, peer, orderer, ...)
    pub kind: &'static str,
    /// Key that was looked up
    pub key: String,
}

impl TopologyLookupError {
    /// Build a lookup failure
    pub fn new(kind: &'static str, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// Failure resolving an admin key to signing material
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No admin is declared under this key
    #[error("unknown admin '{admin}'")]
    UnknownAdmin {
        /// Requested admin key
        admin: String,
    },
    /// Identity material could not be read
    #[error("cannot read identity material {path}: {source}")]
    Material {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// Identity material was read but is unusable
    #[error("invalid identity material for '{admin}': {reason}")]
    Invalid {
        /// Admin key
        admin: String,
        /// What was wrong
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            LedgerError::unreachable("peer0", "connection refused").kind(),
            LedgerErrorKind::Unreachable
        );
        assert!(LedgerError::access_denied("peer0", "creator not in MSP").is_access_denied());
        assert!(!LedgerError::rejected("orderer0", "BAD_REQUEST").is_access_denied());
    }

    #[test]
    fn test_display_names_target() {
        let err = LedgerError::unreachable("peer1.org1", "deadline exceeded");
        assert_eq!(err.to_string(), "peer1.org1 unreachable: deadline exceeded");

        let lookup = TopologyLookupError::new("peer", "peer9");
        assert_eq!(lookup.to_string(), "peer 'peer9' is not declared in the topology");
    }
}

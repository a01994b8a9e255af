//! Chaincode identifiers
//!
//! A chaincode is identified on the network by its name and version. Every
//! "is it installed", "is it instantiated" and "has it converged" comparison
//! in the engine is made on the full pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version assigned to chaincodes declared without one
pub const DEFAULT_CHAINCODE_VERSION: &str = "0";

/// `(name, version)` pair identifying a chaincode
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChaincodeId {
    /// Chaincode name as registered on the network
    pub name: String,
    /// Chaincode version
    pub version: String,
}

impl ChaincodeId {
    /// Create a new identifier
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Identifier with the default version
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_CHAINCODE_VERSION)
    }

    /// Whether `other` names the same chaincode, regardless of version
    pub fn same_name(&self, other: &ChaincodeId) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for ChaincodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

//! Topology loading errors

use std::path::PathBuf;

/// Failure loading a declared topology
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Topology file could not be read
    #[error("cannot read topology {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File extension does not name a supported format
    #[error("unsupported topology format for {path} (expected .toml, .json, .yaml or .yml)")]
    UnsupportedFormat {
        /// Offending file
        path: PathBuf,
    },

    /// Content does not match the topology schema
    #[error("invalid {format} topology: {message}")]
    Parse {
        /// Format that was parsed
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// A glob file reference is malformed
    #[error("invalid file pattern {pattern}: {message}")]
    FilePattern {
        /// Pattern as resolved
        pattern: String,
        /// Parser message
        message: String,
    },

    /// A glob file reference does not match exactly one file
    #[error("file reference {reference} matched {matches} files, expected exactly one")]
    AmbiguousFileReference {
        /// Reference as declared
        reference: PathBuf,
        /// Number of matching files
        matches: usize,
    },

    /// Cross references or required entries are missing
    #[error("invalid topology: {}", .issues.join("; "))]
    Invalid {
        /// Every problem found
        issues: Vec<String>,
    },
}

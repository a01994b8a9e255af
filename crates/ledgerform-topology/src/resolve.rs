//! File reference resolution
//!
//! References in a topology are relative to the directory of the file that
//! declared them. A reference containing glob metacharacters (typical for
//! key stores whose file names are generated) must match exactly one file.

use crate::errors::TopologyError;
use std::path::{Path, PathBuf};

/// Resolves topology file references against a base directory
#[derive(Debug, Clone)]
pub struct FileResolver {
    base_dir: PathBuf,
}

impl FileResolver {
    /// Resolver for references declared in a file located in `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory references are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve one reference
    pub fn resolve(&self, reference: &Path) -> Result<PathBuf, TopologyError> {
        let joined = if reference.is_absolute() {
            reference.to_path_buf()
        } else {
            self.base_dir.join(reference)
        };

        let Some(pattern) = joined.to_str().filter(|p| is_pattern(p)) else {
            return Ok(joined);
        };

        let entries = glob::glob(pattern).map_err(|e| TopologyError::FilePattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let matches: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        match matches.as_slice() {
            [single] => Ok(single.clone()),
            _ => Err(TopologyError::AmbiguousFileReference {
                reference: reference.to_path_buf(),
                matches: matches.len(),
            }),
        }
    }

    /// Resolve an optional reference
    pub fn resolve_opt(&self, reference: Option<&Path>) -> Result<Option<PathBuf>, TopologyError> {
        reference.map(|r| self.resolve(r)).transpose()
    }
}

fn is_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

//! File-backed identity provider
//!
//! Builds signing identities from the certificate and private key PEM files
//! referenced by the topology's admin entries.

use async_trait::async_trait;
use indexmap::IndexMap;
use ledgerform_core::{AdminSpec, IdentityError, IdentityProvider, SigningIdentity, Topology};
use std::path::Path;
use tracing::debug;

const PEM_MARKER: &str = "-----BEGIN";

/// `IdentityProvider` reading admin material from disk
#[derive(Debug, Clone, Default)]
pub struct FileIdentityProvider {
    admins: IndexMap<String, AdminSpec>,
}

impl FileIdentityProvider {
    /// Provider for every admin declared in `topology`
    pub fn new(topology: &Topology) -> Self {
        Self {
            admins: topology.admins.clone(),
        }
    }
}

fn read_pem(admin: &str, path: &Path) -> Result<String, IdentityError> {
    let contents = std::fs::read_to_string(path).map_err(|source| IdentityError::Material {
        path: path.to_path_buf(),
        source,
    })?;
    if !contents.contains(PEM_MARKER) {
        return Err(IdentityError::Invalid {
            admin: admin.to_string(),
            reason: format!("{} is not PEM encoded", path.display()),
        });
    }
    Ok(contents)
}

#[async_trait]
impl IdentityProvider for FileIdentityProvider {
    async fn signing_identity(&self, admin: &str) -> Result<SigningIdentity, IdentityError> {
        let spec = self
            .admins
            .get(admin)
            .ok_or_else(|| IdentityError::UnknownAdmin {
                admin: admin.to_string(),
            })?;

        let certificate = read_pem(admin, &spec.certificate)?;
        let private_key = read_pem(admin, &spec.private_key)?;
        debug!(admin = %admin, msp = %spec.msp_id, "loaded admin identity");

        Ok(SigningIdentity::new(
            spec.name.clone(),
            spec.msp_id.clone(),
            certificate,
            private_key,
        ))
    }
}

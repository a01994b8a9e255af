//! Identity interfaces
//!
//! Every remote call is made on behalf of a channel admin. Rather than
//! switching a shared client between users, the engine resolves the admin once
//! per channel and threads the resulting `ClientContext` through every call.

use crate::errors::IdentityError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Enrolled identity able to sign proposals and configuration
#[derive(Clone)]
pub struct SigningIdentity {
    /// Enrollment name
    pub name: String,
    /// Membership service provider id
    pub msp_id: String,
    /// Signing certificate, PEM encoded
    pub certificate_pem: String,
    private_key_pem: Zeroizing<String>,
}

impl SigningIdentity {
    /// Assemble an identity from its parts
    pub fn new(
        name: impl Into<String>,
        msp_id: impl Into<String>,
        certificate_pem: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            msp_id: msp_id.into(),
            certificate_pem: certificate_pem.into(),
            private_key_pem: Zeroizing::new(private_key_pem.into()),
        }
    }

    /// Private key, PEM encoded
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("name", &self.name)
            .field("msp_id", &self.msp_id)
            .field("private_key_pem", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Identity on whose behalf a sequence of calls is made
#[derive(Debug, Clone)]
pub struct ClientContext {
    admin: String,
    identity: Arc<SigningIdentity>,
}

impl ClientContext {
    /// Context for `identity`, resolved from admin key `admin`
    pub fn new(admin: impl Into<String>, identity: SigningIdentity) -> Self {
        Self {
            admin: admin.into(),
            identity: Arc::new(identity),
        }
    }

    /// Admin key this context was resolved from
    pub fn admin(&self) -> &str {
        &self.admin
    }

    /// Signing identity
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }
}

/// Resolves admin keys to signing identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Signing identity of the admin declared under `admin`
    async fn signing_identity(&self, admin: &str) -> Result<SigningIdentity, IdentityError>;

    /// Convenience wrapper producing a ready `ClientContext`
    async fn client_context(&self, admin: &str) -> Result<ClientContext, IdentityError> {
        let identity = self.signing_identity(admin).await?;
        Ok(ClientContext::new(admin, identity))
    }
}

use serde::Deserialize;

use crate::types::{Role, Uid};

/// Identity proven by a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: Uid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
}

impl VerifiedIdentity {
    #[must_use]
    pub fn new(uid: impl Into<Uid>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            name: None,
            phone: None,
            email_verified: false,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Account data for [`AccountStore::create`](super::AccountStore::create).
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub uid: Uid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl NewAccount {
    /// Tenant account built from token claims, used by auto-provisioning.
    pub(super) fn from_identity(identity: &VerifiedIdentity) -> Self {
        let email = identity.email.clone().unwrap_or_default();
        let name = identity
            .name
            .clone()
            .or_else(|| email.split('@').next().map(str::to_owned))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "DreamBig user".to_owned());
        Self {
            uid: identity.uid.clone(),
            email,
            name,
            phone: identity.phone.clone(),
            role: Role::Tenant,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DevLoginParams {
    pub(super) uid: Option<String>,
}

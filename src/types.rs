use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identity provider user id (the `sub` / `user_id` claim of an ID token).
///
/// This is the only link between a backend account and its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Backend account identifier (ULID).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct AccountId(pub Ulid);

impl AccountId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

/// Account role on the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    #[display("tenant")]
    Tenant,
    #[display("owner")]
    Owner,
    #[display("service_provider")]
    ServiceProvider,
    #[display("investor")]
    Investor,
    #[display("admin")]
    Admin,
}

/// Denormalized user snapshot cached on the client next to the session token.
///
/// Ephemeral: the backend and the identity provider stay the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: Uid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub kyc_verified: bool,
}

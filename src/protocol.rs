//! JSON bodies exchanged between the client and the `/api/v1/auth` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::fraud::FraudAnalysis;
use crate::types::{AccountId, Role, Uid, UserRecord};

/// Token type reported alongside every issued session token.
pub const TOKEN_TYPE: &str = "bearer";

/// Backend account, as returned in `user` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    #[serde(rename = "firebase_uid")]
    pub uid: Uid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub is_active: bool,
    pub kyc_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Account {
    /// Client-side snapshot of this account.
    #[must_use]
    pub fn to_record(&self) -> UserRecord {
        UserRecord {
            uid: self.uid.clone(),
            email: Some(self.email.clone()),
            display_name: Some(self.name.clone()),
            kyc_verified: self.kyc_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: Account,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub preferences: Option<JsonValue>,
    #[serde(default)]
    pub location: Option<String>,
}

impl RegisterRequest {
    /// Field-level validation. Returns the first problem found.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if !is_plausible_email(&self.email) {
            return Err("email: value is not a valid email address".into());
        }
        let name_len = self.name.trim().chars().count();
        if !(2..=100).contains(&name_len) {
            return Err("name: must be between 2 and 100 characters".into());
        }
        if let Some(phone) = self.normalized_phone() {
            if !(10..=15).contains(&phone.chars().count()) {
                return Err("phone: must be between 10 and 15 characters".into());
            }
        }
        if !(6..=100).contains(&self.password.chars().count()) {
            return Err("password: must be between 6 and 100 characters".into());
        }
        Ok(())
    }

    /// Trimmed phone number; blank numbers count as absent.
    #[must_use]
    pub fn normalized_phone(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: Account,
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub fraud_score: Option<FraudAnalysis>,
    #[serde(default)]
    pub recommendations: Vec<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: Account,
    #[serde(rename = "firebase_uid")]
    pub uid: Uid,
    pub token_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycResponse {
    pub user: Account,
    pub fraud_analysis: FraudAnalysis,
    pub message: String,
}

/// Error body of every non-2xx auth response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

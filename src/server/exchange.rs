//! ID token → session token exchange, registration with compensation, and
//! bearer authentication for the protected endpoints.

use serde_json::Value as JsonValue;

use super::config::ExchangeSettings;
use super::error::ExchangeError;
use super::traits::{AccountStore, CreatedIdentity, IdTokenVerifier, IdentityAdmin, StoreError};
use super::types::{NewAccount, VerifiedIdentity};
use crate::fraud::{self, UserSignals};
use crate::protocol::{
    Account, KycResponse, LoginResponse, RegisterRequest, RegisterResponse, TOKEN_TYPE,
};
use crate::token::{self, SessionTokenIssuer, TokenKind};
use crate::types::Uid;

pub struct TokenExchange<V, A, S> {
    verifier: V,
    admin: A,
    accounts: S,
    issuer: SessionTokenIssuer,
    settings: ExchangeSettings,
}

impl<V, A, S> TokenExchange<V, A, S>
where
    V: IdTokenVerifier,
    A: IdentityAdmin,
    S: AccountStore,
{
    pub(crate) fn new(
        verifier: V,
        admin: A,
        accounts: S,
        issuer: SessionTokenIssuer,
        settings: ExchangeSettings,
    ) -> Self {
        Self {
            verifier,
            admin,
            accounts,
            issuer,
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    /// Verify an ID token and mint a session token for its account.
    ///
    /// # Errors
    ///
    /// - [`ExchangeError::TokenType`] for a custom token
    /// - [`ExchangeError::TokenExpired`] / [`ExchangeError::InvalidToken`] from verification
    /// - [`ExchangeError::UserUnknown`] if no account exists and auto-provisioning is off
    /// - [`ExchangeError::Inactive`] if the account is deactivated
    pub async fn login(&self, id_token: &str) -> Result<LoginResponse, ExchangeError> {
        let identity = self.verify_id_token(id_token).await?;

        let account = match self.accounts.find_by_uid(&identity.uid).await? {
            Some(account) => account,
            None if self.settings.auto_provision => self.provision(&identity).await?,
            None => {
                tracing::info!(uid = %identity.uid, "Login for identity without account");
                return Err(ExchangeError::UserUnknown);
            }
        };
        ensure_active(&account)?;

        let response = self.session_for(account)?;
        tracing::info!(uid = %identity.uid, account_id = %response.user.id, "Login successful");
        Ok(response)
    }

    /// Check the email and phone are free, create the identity, then the
    /// account. If anything fails after the identity exists, the identity is
    /// deleted again.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Validation`] for bad fields, [`ExchangeError::Conflict`]
    /// for a duplicate email or phone, [`ExchangeError::Provider`] if the
    /// identity provider fails.
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ExchangeError> {
        req.validate().map_err(ExchangeError::Validation)?;
        self.ensure_unclaimed(&req).await?;

        let created = self
            .admin
            .create_identity(&req.email, &req.password, req.name.trim())
            .await?;
        tracing::info!(uid = %created.uid, "Identity created for registration");

        let account = match self.create_account(&created, &req).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(uid = %created.uid, error = %e, "Account creation failed after identity creation");
                self.compensate(&created).await;
                return Err(e);
            }
        };

        let fraud_score = fraud::analyze_user(&UserSignals {
            email: &account.email,
            properties_posted: 0,
            kyc_verified: account.kyc_verified,
        });

        let session = self.session_for(account)?;
        tracing::info!(uid = %created.uid, account_id = %session.user.id, "Registration successful");

        Ok(RegisterResponse {
            user: session.user,
            access_token: session.access_token,
            token_type: session.token_type,
            expires_in: session.expires_in,
            fraud_score: Some(fraud_score),
            recommendations: Vec::new(),
        })
    }

    /// Resolve a bearer credential: a session token, or as fallback a
    /// verified ID token whose uid maps to an account.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::InvalidToken`] / [`ExchangeError::TokenExpired`] for bad
    /// credentials, [`ExchangeError::UserUnknown`] for a valid credential
    /// without account, [`ExchangeError::Inactive`] for deactivated accounts.
    pub async fn authenticate(&self, bearer: &str) -> Result<Account, ExchangeError> {
        let account = match token::classify(bearer) {
            TokenKind::Session => {
                let claims = self
                    .issuer
                    .verify(bearer)
                    .map_err(|e| ExchangeError::InvalidToken(e.to_string()))?;
                let account = self
                    .accounts
                    .find(claims.account_id)
                    .await?
                    .ok_or(ExchangeError::UserUnknown)?;
                if account.uid != claims.uid {
                    tracing::warn!(account_id = %account.id, "Session token uid does not match account");
                    return Err(ExchangeError::InvalidToken("token subject mismatch".into()));
                }
                account
            }
            _ => {
                let identity = self.verify_id_token(bearer).await?;
                self.accounts
                    .find_by_uid(&identity.uid)
                    .await?
                    .ok_or(ExchangeError::UserUnknown)?
            }
        };

        ensure_active(&account)?;
        Ok(account)
    }

    /// Run the fraud heuristics and, unless flagged, store the KYC details.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Conflict`] if the analysis requires manual review.
    pub async fn submit_kyc(
        &self,
        account: &Account,
        details: JsonValue,
    ) -> Result<KycResponse, ExchangeError> {
        if !details.is_object() {
            return Err(ExchangeError::Validation(
                "KYC details must be a JSON object".into(),
            ));
        }

        let properties_posted = self.accounts.listings_posted(account.id).await?;
        let analysis = fraud::analyze_user(&UserSignals {
            email: &account.email,
            properties_posted,
            kyc_verified: account.kyc_verified,
        });

        if analysis.requires_review() {
            tracing::warn!(
                account_id = %account.id,
                confidence = analysis.confidence,
                "KYC submission flagged for review"
            );
            return Err(ExchangeError::Conflict(
                "KYC verification failed. Please contact support.".into(),
            ));
        }

        let user = self.accounts.complete_kyc(account.id, details).await?;
        tracing::info!(account_id = %user.id, "KYC verified");

        Ok(KycResponse {
            user,
            fraud_analysis: analysis,
            message: "KYC verification completed successfully".into(),
        })
    }

    /// Issue a session token for an existing account without identity verification.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::UserUnknown`] if no account has this uid,
    /// [`ExchangeError::Inactive`] if it is deactivated.
    pub async fn dev_login(&self, uid: &Uid) -> Result<LoginResponse, ExchangeError> {
        let account = self
            .accounts
            .find_by_uid(uid)
            .await?
            .ok_or(ExchangeError::UserUnknown)?;
        ensure_active(&account)?;
        tracing::info!(uid = %uid, "Dev login successful");
        self.session_for(account)
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, ExchangeError> {
        match token::classify(id_token) {
            TokenKind::Custom => {
                tracing::warn!("Custom token presented where an ID token is required");
                Err(ExchangeError::TokenType)
            }
            TokenKind::Session => Err(ExchangeError::InvalidToken(
                "expected an identity provider ID token, got a session token".into(),
            )),
            TokenKind::Id | TokenKind::Unknown => self.verifier.verify(id_token).await,
        }
    }

    async fn provision(&self, identity: &VerifiedIdentity) -> Result<Account, ExchangeError> {
        let account = self
            .accounts
            .create(NewAccount::from_identity(identity))
            .await?;
        tracing::info!(uid = %identity.uid, account_id = %account.id, "Account auto-provisioned");
        Ok(account)
    }

    /// Fail with a duplicate error if the email or phone already belongs to
    /// an account.
    async fn ensure_unclaimed(&self, req: &RegisterRequest) -> Result<(), ExchangeError> {
        if self.accounts.find_by_email(&req.email).await?.is_some() {
            return Err(StoreError::Duplicate("email").into());
        }
        if let Some(phone) = req.normalized_phone() {
            if self.accounts.find_by_phone(phone).await?.is_some() {
                return Err(StoreError::Duplicate("phone number").into());
            }
        }
        Ok(())
    }

    async fn create_account(
        &self,
        created: &CreatedIdentity,
        req: &RegisterRequest,
    ) -> Result<Account, ExchangeError> {
        // Checked again: a concurrent registration may have claimed them meanwhile.
        self.ensure_unclaimed(req).await?;
        let phone = req.normalized_phone();

        let account = self
            .accounts
            .create(NewAccount {
                uid: created.uid.clone(),
                email: req.email.clone(),
                name: req.name.trim().to_owned(),
                phone: phone.map(str::to_owned),
                role: req.role,
            })
            .await?;
        Ok(account)
    }

    async fn compensate(&self, created: &CreatedIdentity) {
        match self.admin.delete_identity(created).await {
            Ok(()) => tracing::info!(uid = %created.uid, "Orphaned identity deleted"),
            Err(e) => tracing::error!(
                uid = %created.uid,
                error = %e,
                "Failed to delete orphaned identity"
            ),
        }
    }

    fn session_for(&self, account: Account) -> Result<LoginResponse, ExchangeError> {
        let issued = self.issuer.issue(account.id, &account.uid)?;
        Ok(LoginResponse {
            access_token: issued.token,
            token_type: TOKEN_TYPE.into(),
            expires_in: Some(issued.expires_in.as_secs()),
            user: account,
        })
    }
}

fn ensure_active(account: &Account) -> Result<(), ExchangeError> {
    if account.is_active {
        Ok(())
    } else {
        tracing::info!(account_id = %account.id, "Rejected deactivated account");
        Err(ExchangeError::Inactive)
    }
}

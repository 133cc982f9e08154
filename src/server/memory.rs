use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use super::traits::{AccountStore, StoreError};
use super::types::NewAccount;
use crate::protocol::Account;
use crate::types::{AccountId, Uid};

#[derive(Default)]
struct Accounts {
    by_id: HashMap<AccountId, Account>,
    kyc: HashMap<AccountId, JsonValue>,
    listings: HashMap<AccountId, u32>,
}

/// Process-local [`AccountStore`]. Used by the binary when no database is
/// wired in, and by tests.
#[derive(Default)]
pub struct InMemoryAccountStore {
    inner: RwLock<Accounts>,
    #[cfg(test)]
    fail_writes: std::sync::atomic::AtomicBool,
}

impl InMemoryAccountStore {
    /// Record how many listings an account has posted.
    pub fn set_listings(&self, id: AccountId, count: u32) {
        self.inner.write().listings.insert(id, count);
    }

    /// Activate or deactivate an account. Returns `false` if it does not exist.
    pub fn set_active(&self, id: AccountId, active: bool) -> bool {
        match self.inner.write().by_id.get_mut(&id) {
            Some(account) => {
                account.is_active = active;
                true
            }
            None => false,
        }
    }

    /// KYC details stored for an account, if any.
    #[must_use]
    pub fn kyc_details(&self, id: AccountId) -> Option<JsonValue> {
        self.inner.read().kyc.get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        #[cfg(test)]
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".into()));
        }
        Ok(())
    }

    fn find_where(&self, pred: impl Fn(&Account) -> bool) -> Option<Account> {
        self.inner.read().by_id.values().find(|a| pred(a)).cloned()
    }
}

impl AccountStore for InMemoryAccountStore {
    async fn find(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }

    async fn find_by_uid(&self, uid: &Uid) -> Result<Option<Account>, StoreError> {
        Ok(self.find_where(|a| &a.uid == uid))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.find_where(|a| a.email.eq_ignore_ascii_case(email)))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.find_where(|a| a.phone.as_deref() == Some(phone)))
    }

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write();

        for existing in inner.by_id.values() {
            if existing.uid == new.uid {
                return Err(StoreError::Duplicate("identity"));
            }
            if !new.email.is_empty() && existing.email.eq_ignore_ascii_case(&new.email) {
                return Err(StoreError::Duplicate("email"));
            }
            if new.phone.is_some() && existing.phone == new.phone {
                return Err(StoreError::Duplicate("phone number"));
            }
        }

        let account = Account {
            id: AccountId::generate(),
            uid: new.uid,
            email: new.email,
            name: new.name,
            phone: new.phone,
            role: new.role,
            is_active: true,
            kyc_verified: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        inner.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    async fn complete_kyc(&self, id: AccountId, details: JsonValue) -> Result<Account, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write();
        let account = inner.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.kyc_verified = true;
        account.updated_at = Some(OffsetDateTime::now_utc());
        let account = account.clone();
        inner.kyc.insert(id, details);
        Ok(account)
    }

    async fn listings_posted(&self, id: AccountId) -> Result<u32, StoreError> {
        Ok(self.inner.read().listings.get(&id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Role;

    fn new_account(uid: &str, email: &str, phone: Option<&str>) -> NewAccount {
        NewAccount {
            uid: Uid::from(uid),
            email: email.into(),
            name: "Test".into(),
            phone: phone.map(str::to_owned),
            role: Role::Tenant,
        }
    }

    #[tokio::test]
    async fn uid_email_and_phone_are_unique() {
        let store = InMemoryAccountStore::default();
        store
            .create(new_account("u1", "a@b.com", Some("9876543210")))
            .await
            .unwrap();

        let dup_uid = store.create(new_account("u1", "x@b.com", None)).await;
        assert!(matches!(dup_uid, Err(StoreError::Duplicate("identity"))));

        let dup_email = store.create(new_account("u2", "A@B.com", None)).await;
        assert!(matches!(dup_email, Err(StoreError::Duplicate("email"))));

        let dup_phone = store
            .create(new_account("u3", "c@b.com", Some("9876543210")))
            .await;
        assert!(matches!(dup_phone, Err(StoreError::Duplicate("phone number"))));

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn lookups() {
        let store = InMemoryAccountStore::default();
        let account = store
            .create(new_account("u1", "a@b.com", Some("9876543210")))
            .await
            .unwrap();

        assert_eq!(store.find(account.id).await.unwrap(), Some(account.clone()));
        assert_eq!(
            store.find_by_uid(&Uid::from("u1")).await.unwrap(),
            Some(account.clone())
        );
        assert!(store.find_by_email("a@b.com").await.unwrap().is_some());
        assert!(store.find_by_phone("9876543210").await.unwrap().is_some());
        assert!(store.find_by_phone("0000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn kyc_completion() {
        let store = InMemoryAccountStore::default();
        let account = store.create(new_account("u1", "a@b.com", None)).await.unwrap();

        let updated = store
            .complete_kyc(account.id, json!({"document_type": "passport"}))
            .await
            .unwrap();
        assert!(updated.kyc_verified);
        assert!(updated.updated_at.is_some());
        assert_eq!(
            store.kyc_details(account.id).unwrap()["document_type"],
            "passport"
        );

        let missing = store.complete_kyc(AccountId::generate(), json!({})).await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }
}

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ConflictKind, MerchantError, MerchantResult};
use crate::models::{
    ChainRegistration, Merchant, MerchantId, NewRegistration, OutboxMessage, User, UserStatus,
};

/// Merchant and user persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MerchantRepository: Send + Sync {
    /// Commit the merchant, its owner and the outbox row together.
    ///
    /// A uniqueness violation rolls everything back and surfaces as
    /// [`MerchantError::Conflict`].
    async fn create_with_owner(&self, registration: NewRegistration) -> MerchantResult<Merchant>;

    /// Insert a user that owns no merchant.
    async fn create_admin(&self, user: User) -> MerchantResult<User>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> MerchantResult<Option<User>>;
}

/// Merchants the chain has already accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrationLedger: Send + Sync {
    async fn find(&self, merchant_id: &MerchantId) -> MerchantResult<Option<ChainRegistration>>;

    /// Recording an already-recorded merchant is a no-op.
    async fn record(&self, merchant_id: &MerchantId, txid: &str) -> MerchantResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Unpublished rows, oldest first.
    async fn fetch_pending(&self, limit: u64) -> MerchantResult<Vec<OutboxMessage>>;

    async fn mark_published(&self, id: Uuid) -> MerchantResult<()>;

    /// Bump `attempts` and keep the row pending.
    async fn mark_failed(&self, id: Uuid, error: &str) -> MerchantResult<()>;
}

#[derive(Debug, Default)]
struct Store {
    merchants: HashMap<MerchantId, Merchant>,
    users: HashMap<Uuid, User>,
    outbox: Vec<(OutboxMessage, Option<String>)>,
    ledger: HashMap<MerchantId, ChainRegistration>,
}

impl Store {
    fn email_taken(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.users.values().any(|u| u.email.to_lowercase() == email)
    }
}

/// Single-lock implementation of all three stores, for development and
/// tests. Holding one write lock per registration gives the same
/// all-or-nothing outcome as the database transaction.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMerchantRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryMerchantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn merchant_count(&self) -> usize {
        self.store.read().await.merchants.len()
    }

    pub async fn user_count(&self) -> usize {
        self.store.read().await.users.len()
    }

    pub async fn pending_outbox(&self) -> Vec<OutboxMessage> {
        self.store
            .read()
            .await
            .outbox
            .iter()
            .filter(|(row, _)| row.published_at.is_none())
            .map(|(row, _)| row.clone())
            .collect()
    }

    pub async fn last_outbox_error(&self, id: Uuid) -> Option<String> {
        self.store
            .read()
            .await
            .outbox
            .iter()
            .find(|(row, _)| row.id == id)
            .and_then(|(_, error)| error.clone())
    }

    /// Returns false when no user has that email.
    pub async fn set_user_status(&self, email: &str, status: UserStatus) -> bool {
        let email = email.to_lowercase();
        let mut store = self.store.write().await;
        match store.users.values_mut().find(|u| u.email == email) {
            Some(user) => {
                user.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MerchantRepository for InMemoryMerchantRepository {
    async fn create_with_owner(&self, registration: NewRegistration) -> MerchantResult<Merchant> {
        let NewRegistration {
            merchant,
            owner,
            event,
        } = registration;
        let mut store = self.store.write().await;

        if store.email_taken(&owner.email) {
            return Err(MerchantError::Conflict(ConflictKind::DuplicateEmail));
        }
        if store
            .merchants
            .values()
            .any(|m| m.wallet_address == merchant.wallet_address)
        {
            return Err(MerchantError::Conflict(ConflictKind::DuplicateWallet));
        }
        if store.merchants.values().any(|m| m.name == merchant.name) {
            return Err(MerchantError::Conflict(ConflictKind::DuplicateName));
        }
        if store.merchants.contains_key(&merchant.merchant_id) {
            return Err(MerchantError::Conflict(ConflictKind::Other));
        }

        store.merchants.insert(merchant.merchant_id, merchant.clone());
        store.users.insert(owner.user_uid, owner);
        store.outbox.push((event, None));

        tracing::info!(merchant_id = %merchant.merchant_id, "Created merchant");
        Ok(merchant)
    }

    async fn create_admin(&self, user: User) -> MerchantResult<User> {
        let mut store = self.store.write().await;
        if store.email_taken(&user.email) {
            return Err(MerchantError::Conflict(ConflictKind::DuplicateEmail));
        }
        store.users.insert(user.user_uid, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> MerchantResult<Option<User>> {
        let email = email.to_lowercase();
        let store = self.store.read().await;
        Ok(store
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }
}

#[async_trait]
impl RegistrationLedger for InMemoryMerchantRepository {
    async fn find(&self, merchant_id: &MerchantId) -> MerchantResult<Option<ChainRegistration>> {
        Ok(self.store.read().await.ledger.get(merchant_id).cloned())
    }

    async fn record(&self, merchant_id: &MerchantId, txid: &str) -> MerchantResult<()> {
        let mut store = self.store.write().await;
        store
            .ledger
            .entry(*merchant_id)
            .or_insert_with(|| ChainRegistration {
                merchant_id: *merchant_id,
                txid: txid.to_string(),
                registered_at: Utc::now(),
            });
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryMerchantRepository {
    async fn fetch_pending(&self, limit: u64) -> MerchantResult<Vec<OutboxMessage>> {
        let store = self.store.read().await;
        let mut pending: Vec<OutboxMessage> = store
            .outbox
            .iter()
            .filter(|(row, _)| row.published_at.is_none())
            .map(|(row, _)| row.clone())
            .collect();
        pending.sort_by_key(|row| (row.created_at, row.id));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_published(&self, id: Uuid) -> MerchantResult<()> {
        let mut store = self.store.write().await;
        if let Some((row, _)) = store.outbox.iter_mut().find(|(row, _)| row.id == id) {
            row.published_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> MerchantResult<()> {
        let mut store = self.store.write().await;
        if let Some((row, last_error)) = store.outbox.iter_mut().find(|(row, _)| row.id == id) {
            row.attempts += 1;
            *last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MerchantCreated;
    use crate::models::{MerchantStatus, Role};

    fn registration(email: &str, wallet: &str, name: &str) -> NewRegistration {
        let merchant = Merchant {
            merchant_id: MerchantId::generate(),
            name: name.into(),
            wallet_address: wallet.into(),
            status: MerchantStatus::Pending,
            created_at: Utc::now(),
        };
        let owner = User {
            user_uid: Uuid::now_v7(),
            merchant_id: Some(merchant.merchant_id),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::Merchant,
            status: UserStatus::Active,
            created_at: merchant.created_at,
        };
        let event = MerchantCreated::new(&merchant, email).to_outbox().unwrap();
        NewRegistration {
            merchant,
            owner,
            event,
        }
    }

    #[tokio::test]
    async fn test_create_with_owner_writes_all_three() {
        let repo = InMemoryMerchantRepository::new();
        repo.create_with_owner(registration("a@x.com", "T1", "Acme"))
            .await
            .unwrap();

        assert_eq!(repo.merchant_count().await, 1);
        assert_eq!(repo.user_count().await, 1);
        assert_eq!(repo.pending_outbox().await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_classified_and_write_nothing() {
        let repo = InMemoryMerchantRepository::new();
        repo.create_with_owner(registration("a@x.com", "T1", "Acme"))
            .await
            .unwrap();

        let email = repo
            .create_with_owner(registration("A@X.com", "T2", "Other"))
            .await
            .unwrap_err();
        let wallet = repo
            .create_with_owner(registration("b@x.com", "T1", "Other"))
            .await
            .unwrap_err();
        let name = repo
            .create_with_owner(registration("c@x.com", "T3", "Acme"))
            .await
            .unwrap_err();

        assert_eq!(email.conflict_kind(), Some(ConflictKind::DuplicateEmail));
        assert_eq!(wallet.conflict_kind(), Some(ConflictKind::DuplicateWallet));
        assert_eq!(name.conflict_kind(), Some(ConflictKind::DuplicateName));
        assert_eq!(repo.merchant_count().await, 1);
        assert_eq!(repo.user_count().await, 1);
        assert_eq!(repo.pending_outbox().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_keeps_first_txid() {
        let repo = InMemoryMerchantRepository::new();
        let id = MerchantId::generate();

        repo.record(&id, "tx-1").await.unwrap();
        repo.record(&id, "tx-2").await.unwrap();

        assert_eq!(repo.find(&id).await.unwrap().unwrap().txid, "tx-1");
    }

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let repo = InMemoryMerchantRepository::new();
        repo.create_with_owner(registration("a@x.com", "T1", "Acme"))
            .await
            .unwrap();
        let row = repo.fetch_pending(10).await.unwrap().remove(0);

        repo.mark_failed(row.id, "broker down").await.unwrap();
        let retried = repo.fetch_pending(10).await.unwrap();
        assert_eq!(retried[0].attempts, 1);
        assert_eq!(repo.last_outbox_error(row.id).await.as_deref(), Some("broker down"));

        repo.mark_published(row.id).await.unwrap();
        assert!(repo.fetch_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_user_status() {
        let repo = InMemoryMerchantRepository::new();
        repo.create_with_owner(registration("a@x.com", "T1", "Acme"))
            .await
            .unwrap();

        assert!(repo.set_user_status("a@x.com", UserStatus::Disabled).await);
        assert!(!repo.set_user_status("nobody@x.com", UserStatus::Disabled).await);

        let user = repo.find_user_by_email("A@x.com").await.unwrap().unwrap();
        assert!(!user.is_active());
    }
}

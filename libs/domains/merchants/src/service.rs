use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum_helpers::{Claims, TokenIssuer};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::chain::{ChainRegistrar, RegistrationRequest};
use crate::error::{ConflictKind, MerchantError, MerchantResult};
use crate::events::MerchantCreated;
use crate::models::{
    ChainStatus, LoginRequest, LoginResponse, MeResponse, Merchant, MerchantId, MerchantStatus,
    MerchantView, NewRegistration, RegisterRequest, RegisterResponse, Role, User, UserStatus,
    UserView,
};
use crate::repository::{MerchantRepository, RegistrationLedger};

pub const DEFAULT_CHAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Registration, login and admin bootstrap.
#[derive(Clone)]
pub struct OnboardingService {
    merchants: Arc<dyn MerchantRepository>,
    ledger: Arc<dyn RegistrationLedger>,
    registrar: Arc<dyn ChainRegistrar>,
    tokens: TokenIssuer,
    outbox_signal: Arc<Notify>,
    chain_timeout: Duration,
}

impl OnboardingService {
    pub fn new(
        merchants: Arc<dyn MerchantRepository>,
        ledger: Arc<dyn RegistrationLedger>,
        registrar: Arc<dyn ChainRegistrar>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            merchants,
            ledger,
            registrar,
            tokens,
            outbox_signal: Arc::new(Notify::new()),
            chain_timeout: DEFAULT_CHAIN_TIMEOUT,
        }
    }

    pub fn with_chain_timeout(mut self, timeout: Duration) -> Self {
        self.chain_timeout = timeout;
        self
    }

    /// Share the relay's wake-up signal.
    pub fn with_outbox_signal(mut self, signal: Arc<Notify>) -> Self {
        self.outbox_signal = signal;
        self
    }

    pub fn outbox_signal(&self) -> Arc<Notify> {
        self.outbox_signal.clone()
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Commit merchant, owner and `merchant.created` outbox row, then try
    /// the chain once. The chain outcome never fails the request.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> MerchantResult<RegisterResponse> {
        let request = normalize_register(request);
        request
            .validate()
            .map_err(|e| MerchantError::Validation(e.to_string()))?;

        let password_hash = hash_password(request.password).await?;
        let now = Utc::now();

        let merchant = Merchant {
            merchant_id: MerchantId::generate(),
            name: request.name,
            wallet_address: request.wallet_address,
            status: MerchantStatus::Pending,
            created_at: now,
        };
        let owner = User {
            user_uid: Uuid::now_v7(),
            merchant_id: Some(merchant.merchant_id),
            email: request.email,
            password_hash,
            role: Role::Merchant,
            status: UserStatus::Active,
            created_at: now,
        };
        let event = MerchantCreated::new(&merchant, &owner.email)
            .to_outbox()
            .map_err(|e| MerchantError::Internal(format!("event encoding failed: {e}")))?;

        let merchant = self
            .merchants
            .create_with_owner(NewRegistration {
                merchant,
                owner,
                event,
            })
            .await?;

        self.outbox_signal.notify_one();
        info!(merchant_id = %merchant.merchant_id, "Merchant registered");

        let chain = self.attempt_chain(&merchant).await;
        Ok(RegisterResponse {
            merchant: MerchantView::from(&merchant),
            chain,
        })
    }

    async fn attempt_chain(&self, merchant: &Merchant) -> ChainStatus {
        let request = RegistrationRequest::new(merchant.merchant_id, &merchant.wallet_address);

        match tokio::time::timeout(self.chain_timeout, self.registrar.register(&request)).await {
            Ok(Ok(txid)) => {
                if let Err(e) = self.ledger.record(&merchant.merchant_id, &txid).await {
                    warn!(merchant_id = %merchant.merchant_id, error = %e, "Failed to record chain registration");
                }
                ChainStatus::registered(txid)
            }
            Ok(Err(e)) => {
                warn!(
                    merchant_id = %merchant.merchant_id,
                    registrar = self.registrar.name(),
                    error = %e,
                    "Synchronous chain registration failed"
                );
                ChainStatus::failed(e.to_string())
            }
            Err(_) => {
                warn!(merchant_id = %merchant.merchant_id, "Synchronous chain registration timed out");
                ChainStatus::failed(format!(
                    "chain registration timed out after {}ms",
                    self.chain_timeout.as_millis()
                ))
            }
        }
    }

    /// Unknown email, wrong password and disabled account all fail the same way.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> MerchantResult<LoginResponse> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .merchants
            .find_user_by_email(&email)
            .await?
            .ok_or(MerchantError::InvalidCredentials)?;

        if !verify_password(request.password, user.password_hash.clone()).await? {
            return Err(MerchantError::InvalidCredentials);
        }
        if !user.is_active() {
            info!(user_uid = %user.user_uid, "Login refused for disabled account");
            return Err(MerchantError::InvalidCredentials);
        }

        let merchant_hex = user.merchant_id.map(|id| id.to_hex());
        let issued = self.tokens.sign(
            user.user_uid,
            &user.email,
            &user.role.to_string(),
            merchant_hex.as_deref(),
        )?;

        Ok(LoginResponse {
            access_token: issued.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in(Utc::now()),
            user: UserView::from(&user),
        })
    }

    pub fn me(&self, claims: &Claims) -> MerchantResult<MeResponse> {
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| MerchantError::Internal(format!("bad exp claim {}", claims.exp)))?;
        Ok(MeResponse {
            uid: claims.uid,
            email: claims.email.clone(),
            role: claims.role.clone(),
            merchant_id: claims.merchant_id.clone(),
            expires_at,
        })
    }

    /// Create the ADMIN user unless one with that email exists. Returns
    /// whether a user was created.
    #[instrument(skip(self, password))]
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> MerchantResult<bool> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(MerchantError::Validation(
                "admin email and password must not be empty".to_string(),
            ));
        }

        if self.merchants.find_user_by_email(&email).await?.is_some() {
            info!("Admin user already present");
            return Ok(false);
        }

        let admin = User {
            user_uid: Uuid::now_v7(),
            merchant_id: None,
            email,
            password_hash: hash_password(password.to_string()).await?,
            role: Role::Admin,
            status: UserStatus::Active,
            created_at: Utc::now(),
        };

        match self.merchants.create_admin(admin).await {
            Ok(user) => {
                info!(user_uid = %user.user_uid, "Admin user created");
                Ok(true)
            }
            // Another instance won the race.
            Err(MerchantError::Conflict(ConflictKind::DuplicateEmail)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn normalize_register(request: RegisterRequest) -> RegisterRequest {
    RegisterRequest {
        email: request.email.trim().to_lowercase(),
        password: request.password,
        wallet_address: request.wallet_address.trim().to_string(),
        name: request.name.trim().to_string(),
    }
}

async fn hash_password(password: String) -> MerchantResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| MerchantError::PasswordHash(e.to_string()))
    })
    .await
    .map_err(|e| MerchantError::Internal(format!("hashing task failed: {e}")))?
}

async fn verify_password(password: String, hash: String) -> MerchantResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash).map_err(|e| MerchantError::PasswordHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| MerchantError::Internal(format!("hashing task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainError, InMemoryRegistrar, MockChainRegistrar, StubRegistrar};
    use crate::repository::{InMemoryMerchantRepository, MockMerchantRepository, MockRegistrationLedger};
    use axum_helpers::JwtConfig;

    fn tokens() -> TokenIssuer {
        TokenIssuer::new(&JwtConfig::new("test-secret-that-is-at-least-32-chars!!").unwrap())
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "password1".into(),
            wallet_address: "TAddr123".into(),
            name: "Acme".into(),
        }
    }

    fn in_memory(registrar: Arc<dyn ChainRegistrar>) -> (OnboardingService, InMemoryMerchantRepository) {
        let repo = InMemoryMerchantRepository::new();
        let service = OnboardingService::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            registrar,
            tokens(),
        );
        (service, repo)
    }

    #[tokio::test]
    async fn test_register_commits_pending_merchant_with_owner() {
        let mut merchants = MockMerchantRepository::new();
        merchants
            .expect_create_with_owner()
            .times(1)
            .withf(|reg| {
                reg.merchant.status == MerchantStatus::Pending
                    && reg.owner.role == Role::Merchant
                    && reg.owner.merchant_id == Some(reg.merchant.merchant_id)
                    && reg.owner.email == "a@x.com"
                    && reg.owner.password_hash.starts_with("$argon2id$")
                    && reg.event.routing_key == "merchant.created"
            })
            .returning(|reg| Ok(reg.merchant));

        let mut ledger = MockRegistrationLedger::new();
        ledger.expect_record().times(0);

        let service = OnboardingService::new(
            Arc::new(merchants),
            Arc::new(ledger),
            Arc::new(StubRegistrar),
            tokens(),
        );

        let response = service.register(request(" A@X.com ")).await.unwrap();

        assert_eq!(response.merchant.status, MerchantStatus::Pending);
        assert!(MerchantId::from_hex(&response.merchant.merchant_id).is_ok());
        assert!(!response.chain.registered);
        assert!(response.chain.error.unwrap().contains("not implemented"));
    }

    #[tokio::test]
    async fn test_register_records_successful_chain_call() {
        let mut merchants = MockMerchantRepository::new();
        merchants
            .expect_create_with_owner()
            .returning(|reg| Ok(reg.merchant));

        let mut registrar = MockChainRegistrar::new();
        registrar
            .expect_register()
            .times(1)
            .returning(|_| Ok("tx-abc".to_string()));
        registrar.expect_name().return_const("mock");

        let mut ledger = MockRegistrationLedger::new();
        ledger
            .expect_record()
            .withf(|_, txid| txid == "tx-abc")
            .times(1)
            .returning(|_, _| Ok(()));

        let service = OnboardingService::new(
            Arc::new(merchants),
            Arc::new(ledger),
            Arc::new(registrar),
            tokens(),
        );

        let response = service.register(request("a@x.com")).await.unwrap();
        assert_eq!(response.chain, ChainStatus::registered("tx-abc"));
    }

    #[tokio::test]
    async fn test_conflict_skips_chain_call() {
        let mut merchants = MockMerchantRepository::new();
        merchants
            .expect_create_with_owner()
            .returning(|_| Err(MerchantError::Conflict(ConflictKind::DuplicateWallet)));

        let mut registrar = MockChainRegistrar::new();
        registrar.expect_register().times(0);

        let service = OnboardingService::new(
            Arc::new(merchants),
            Arc::new(MockRegistrationLedger::new()),
            Arc::new(registrar),
            tokens(),
        );

        let err = service.register(request("a@x.com")).await.unwrap_err();
        assert_eq!(err.conflict_kind(), Some(ConflictKind::DuplicateWallet));
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_store() {
        let mut merchants = MockMerchantRepository::new();
        merchants.expect_create_with_owner().times(0);

        let service = OnboardingService::new(
            Arc::new(merchants),
            Arc::new(MockRegistrationLedger::new()),
            Arc::new(StubRegistrar),
            tokens(),
        );

        let mut bad = request("not-an-email");
        bad.password = "short".into();
        let err = service.register(bad).await.unwrap_err();
        assert!(matches!(err, MerchantError::Validation(_)));
    }

    #[tokio::test]
    async fn test_slow_chain_times_out_but_registration_succeeds() {
        let registrar = Arc::new(InMemoryRegistrar::new().with_delay(Duration::from_millis(500)));
        let (service, repo) = in_memory(registrar);
        let service = service.with_chain_timeout(Duration::from_millis(20));

        let response = service.register(request("a@x.com")).await.unwrap();

        assert!(!response.chain.registered);
        assert!(response.chain.error.unwrap().contains("timed out"));
        assert_eq!(repo.merchant_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_wakes_outbox_relay() {
        let (service, _) = in_memory(Arc::new(StubRegistrar));
        let signal = service.outbox_signal();

        service.register(request("a@x.com")).await.unwrap();

        tokio::time::timeout(Duration::from_millis(100), signal.notified())
            .await
            .expect("relay was not notified");
    }

    #[tokio::test]
    async fn test_login_issues_token_for_registered_user() {
        let (service, _) = in_memory(Arc::new(StubRegistrar));
        let registered = service.register(request("a@x.com")).await.unwrap();

        let login = service
            .login(LoginRequest {
                email: "A@x.com".into(),
                password: "password1".into(),
            })
            .await
            .unwrap();

        assert_eq!(login.token_type, "Bearer");
        assert!((895..=900).contains(&login.expires_in));
        assert_eq!(login.user.role, Role::Merchant);
        assert_eq!(login.user.merchant_id, Some(registered.merchant.merchant_id.clone()));

        let claims = service.tokens().verify(&login.access_token).unwrap();
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, "MERCHANT");
        assert_eq!(claims.merchant_id, Some(registered.merchant.merchant_id));
    }

    #[tokio::test]
    async fn test_password_whitespace_is_significant() {
        let (service, _) = in_memory(Arc::new(StubRegistrar));
        let mut registration = request("a@x.com");
        registration.password = " password1 ".into();
        service.register(registration).await.unwrap();

        let login = |password: &str| {
            service.login(LoginRequest {
                email: "a@x.com".into(),
                password: password.into(),
            })
        };

        assert!(login(" password1 ").await.is_ok());
        assert!(matches!(
            login("password1").await,
            Err(MerchantError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let (service, repo) = in_memory(Arc::new(StubRegistrar));
        service.register(request("a@x.com")).await.unwrap();

        let wrong_password = service
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "password2".into(),
            })
            .await
            .unwrap_err();
        let unknown = service
            .login(LoginRequest {
                email: "b@x.com".into(),
                password: "password1".into(),
            })
            .await
            .unwrap_err();

        repo.set_user_status("a@x.com", UserStatus::Disabled).await;
        let disabled = service
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "password1".into(),
            })
            .await
            .unwrap_err();

        for err in [wrong_password, unknown, disabled] {
            assert!(matches!(err, MerchantError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_me_echoes_claims() {
        let (service, _) = in_memory(Arc::new(StubRegistrar));
        let issued = service
            .tokens()
            .sign(Uuid::now_v7(), "a@x.com", "ADMIN", None)
            .unwrap();
        let claims = service.tokens().verify(&issued.token).unwrap();

        let me = service.me(&claims).unwrap();
        assert_eq!(me.email, "a@x.com");
        assert_eq!(me.role, "ADMIN");
        assert!(me.merchant_id.is_none());
        assert_eq!(me.expires_at.timestamp(), issued.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_idempotent() {
        let (service, repo) = in_memory(Arc::new(StubRegistrar));

        assert!(service.bootstrap_admin("Root@X.com", "adminpass1").await.unwrap());
        assert!(!service.bootstrap_admin("root@x.com", "adminpass1").await.unwrap());
        assert_eq!(repo.user_count().await, 1);

        let login = service
            .login(LoginRequest {
                email: "root@x.com".into(),
                password: "adminpass1".into(),
            })
            .await
            .unwrap();
        assert_eq!(login.user.role, Role::Admin);
        assert!(login.user.merchant_id.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_tolerates_concurrent_insert() {
        let mut merchants = MockMerchantRepository::new();
        merchants.expect_find_user_by_email().returning(|_| Ok(None));
        merchants
            .expect_create_admin()
            .returning(|_| Err(MerchantError::Conflict(ConflictKind::DuplicateEmail)));

        let service = OnboardingService::new(
            Arc::new(merchants),
            Arc::new(MockRegistrationLedger::new()),
            Arc::new(StubRegistrar),
            tokens(),
        );

        assert!(!service.bootstrap_admin("root@x.com", "adminpass1").await.unwrap());
    }

    #[tokio::test]
    async fn test_chain_failure_text_is_reported() {
        let registrar = Arc::new(InMemoryRegistrar::failing_with(ChainError::Transient(
            "node unreachable".into(),
        )));
        let (service, _) = in_memory(registrar);

        let response = service.register(request("a@x.com")).await.unwrap();
        assert!(response.chain.error.unwrap().contains("node unreachable"));
    }
}

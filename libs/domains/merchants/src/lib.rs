//! Merchants Domain
//!
//! Merchant onboarding: a registration commits the merchant, its owning
//! user and a `merchant.created` outbox row in one transaction. The outbox
//! relay publishes the event; the onboarding worker reconciles it with the
//! chain registration capability.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← /v1/auth/{register,login,me}
//! └──────┬──────┘
//!        │
//! ┌──────▼──────────────┐      ┌────────────────┐
//! │  OnboardingService  │─────▶│ ChainRegistrar │ best-effort, timed out
//! └──────┬──────────────┘      └───────▲────────┘
//!        │ one transaction             │ authoritative
//! ┌──────▼──────┐  ┌─────────────┐  ┌──┴──────────────────┐
//! │ Repository  │─▶│ OutboxRelay │─▶│ OnboardingProcessor │ (via broker)
//! └─────────────┘  └─────────────┘  └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_merchants::{InMemoryMerchantRepository, OnboardingService, StubRegistrar};
//!
//! let repo = Arc::new(InMemoryMerchantRepository::new());
//! let service = OnboardingService::new(repo.clone(), repo, Arc::new(StubRegistrar), tokens);
//! let router = Router::new().nest("/v1", handlers::router(service));
//! ```

pub mod chain;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod outbox;
pub mod postgres;
pub mod processor;
pub mod repository;
pub mod service;

pub use chain::{
    ChainConfig, ChainError, ChainRegistrar, HttpRegistrar, InMemoryRegistrar,
    RegistrationRequest, StubRegistrar, build_registrar,
};
pub use error::{ConflictKind, MerchantError, MerchantResult};
pub use events::{MERCHANT_CREATED, MerchantCreated};
pub use models::{
    LoginRequest, LoginResponse, Merchant, MerchantId, MerchantStatus, RegisterRequest,
    RegisterResponse, Role, User, UserStatus,
};
pub use outbox::{EventPublisher, OutboxRelay, RelayConfig};
pub use postgres::PgMerchantRepository;
pub use processor::OnboardingProcessor;
pub use repository::{
    InMemoryMerchantRepository, MerchantRepository, OutboxRepository, RegistrationLedger,
};
pub use service::OnboardingService;

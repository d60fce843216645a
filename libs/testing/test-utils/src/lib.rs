//! Shared test utilities for the onboarding workspace
//!
//! - `TestDatabase`: PostgreSQL container with migrations applied (feature: "postgres")
//! - `TestRabbit`: RabbitMQ container (feature: "rabbitmq")
//! - `TestDataBuilder`: deterministic registration data (always available)
//! - `assertions`: custom assertion helpers (always available)
//!
//! # Features
//!
//! - `postgres` (default): Enables PostgreSQL test infrastructure
//! - `rabbitmq`: Enables RabbitMQ test infrastructure
//! - `all`: Enables both
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let email = builder.email("owner");
//!     let wallet = builder.wallet("main");
//! }
//! ```
//!
//! Broker tests opt in from their dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["rabbitmq"] }
//! ```

use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "rabbitmq")]
mod rabbitmq;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "rabbitmq")]
pub use rabbitmq::TestRabbit;

/// Builder for test data with deterministic randomization
///
/// Tests sharing one database use distinct names so that uniqueness
/// constraints never collide across tests.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_register_merchant");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    pub fn user_id(&self) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Display name for a merchant, e.g. `test-acme-12345-main`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.email("owner"), "owner-7@example.com");
    /// ```
    pub fn email(&self, local: &str) -> String {
        format!("{}-{}@example.com", local, self.seed)
    }

    /// Opaque wallet address in TRON base58 shape (`T` prefix).
    pub fn wallet(&self, suffix: &str) -> String {
        format!("T{:x}{}", self.seed, suffix)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that `value` is a `0x`-prefixed 32-byte lowercase hex id
    pub fn assert_merchant_hex(value: &str, context: &str) {
        let digits = value
            .strip_prefix("0x")
            .unwrap_or_else(|| panic!("{}: expected 0x prefix, got {}", context, value));
        assert_eq!(digits.len(), 64, "{}: expected 64 hex digits, got {}", context, value);
        assert!(
            digits.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')),
            "{}: expected lowercase hex, got {}",
            context,
            value
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.user_id(), builder2.user_id());
        assert_eq!(builder1.email("a"), builder2.email("a"));
        assert_eq!(builder1.wallet("w"), builder2.wallet("w"));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.email("owner"), builder2.email("owner"));
        assert_ne!(builder1.name("acme", "main"), builder2.name("acme", "main"));
    }

    #[test]
    fn test_assert_merchant_hex_accepts_canonical_form() {
        assertions::assert_merchant_hex(&format!("0x{}", "ab".repeat(32)), "canonical");
    }

    #[test]
    #[should_panic(expected = "expected 64 hex digits")]
    fn test_assert_merchant_hex_rejects_short_id() {
        assertions::assert_merchant_hex("0xabcd", "short");
    }
}

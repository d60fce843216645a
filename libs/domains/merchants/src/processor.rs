//! Onboarding processor for the AMQP worker.
//!
//! Handles `merchant.created` under at-least-once delivery: the ledger is
//! consulted before the chain is called, so a redelivered event never
//! submits twice once the first submission has been recorded.

use async_trait::async_trait;
use messaging::{ProcessingError, Processor};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::chain::{ChainError, ChainRegistrar, RegistrationRequest};
use crate::events::MerchantCreated;
use crate::models::MerchantId;
use crate::repository::RegistrationLedger;

impl From<ChainError> for ProcessingError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Transient(message) => ProcessingError::transient(message),
            ChainError::Permanent(message) => ProcessingError::permanent(message),
            ChainError::RateLimited {
                message,
                retry_after_ms,
            } => ProcessingError::rate_limited(message, retry_after_ms),
        }
    }
}

pub struct OnboardingProcessor {
    ledger: Arc<dyn RegistrationLedger>,
    registrar: Arc<dyn ChainRegistrar>,
}

impl OnboardingProcessor {
    pub fn new(ledger: Arc<dyn RegistrationLedger>, registrar: Arc<dyn ChainRegistrar>) -> Self {
        Self { ledger, registrar }
    }
}

#[async_trait]
impl Processor<MerchantCreated> for OnboardingProcessor {
    #[instrument(skip(self, job), fields(merchant_id = %job.merchant_id))]
    async fn process(&self, job: &MerchantCreated) -> Result<(), ProcessingError> {
        let merchant_id = MerchantId::from_hex(&job.merchant_id)
            .map_err(|e| ProcessingError::permanent(format!("bad merchant id: {e}")))?;

        let existing = self
            .ledger
            .find(&merchant_id)
            .await
            .map_err(|e| ProcessingError::transient(format!("ledger lookup failed: {e}")))?;
        if let Some(registration) = existing {
            info!(txid = %registration.txid, "Merchant already registered on chain, skipping");
            return Ok(());
        }

        let request = RegistrationRequest::new(merchant_id, &job.wallet_address);
        let txid = self.registrar.register(&request).await?;

        // The registrar is idempotent by merchant id, so retrying after a
        // failed record is safe.
        self.ledger
            .record(&merchant_id, &txid)
            .await
            .map_err(|e| ProcessingError::transient(format!("ledger record failed: {e}")))?;

        info!(%txid, registrar = self.registrar.name(), "Merchant registered on chain");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "onboarding_processor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{InMemoryRegistrar, MockChainRegistrar, StubRegistrar};
    use crate::error::MerchantError;
    use crate::models::{ChainRegistration, Merchant, MerchantStatus};
    use crate::repository::{InMemoryMerchantRepository, MockRegistrationLedger};
    use chrono::Utc;
    use messaging::ErrorCategory;

    fn event() -> MerchantCreated {
        let merchant = Merchant {
            merchant_id: MerchantId::generate(),
            name: "Acme".into(),
            wallet_address: "TAddr123".into(),
            status: MerchantStatus::Pending,
            created_at: Utc::now(),
        };
        MerchantCreated::new(&merchant, "a@x.com")
    }

    #[tokio::test]
    async fn test_duplicate_delivery_calls_chain_once() {
        let repo = Arc::new(InMemoryMerchantRepository::new());
        let registrar = Arc::new(InMemoryRegistrar::new());
        let processor = OnboardingProcessor::new(repo.clone(), registrar.clone());
        let job = event();

        processor.process(&job).await.unwrap();
        processor.process(&job).await.unwrap();

        assert_eq!(registrar.calls(), 1);
        let id = MerchantId::from_hex(&job.merchant_id).unwrap();
        assert_eq!(
            repo.find(&id).await.unwrap().unwrap().txid,
            InMemoryRegistrar::txid_for(&id)
        );
    }

    #[tokio::test]
    async fn test_already_registered_skips_chain() {
        let mut ledger = MockRegistrationLedger::new();
        ledger.expect_find().returning(|id| {
            Ok(Some(ChainRegistration {
                merchant_id: *id,
                txid: "tx-1".into(),
                registered_at: Utc::now(),
            }))
        });
        let mut registrar = MockChainRegistrar::new();
        registrar.expect_register().times(0);

        let processor = OnboardingProcessor::new(Arc::new(ledger), Arc::new(registrar));
        processor.process(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stub_failure_is_permanent() {
        let processor = OnboardingProcessor::new(
            Arc::new(InMemoryMerchantRepository::new()),
            Arc::new(StubRegistrar),
        );

        let err = processor.process(&event()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[tokio::test]
    async fn test_transient_chain_error_is_retryable() {
        let processor = OnboardingProcessor::new(
            Arc::new(InMemoryMerchantRepository::new()),
            Arc::new(InMemoryRegistrar::failing_with(ChainError::Transient(
                "node busy".into(),
            ))),
        );

        let err = processor.process(&event()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(err.should_retry(0));
    }

    #[tokio::test]
    async fn test_ledger_outage_is_transient() {
        let mut ledger = MockRegistrationLedger::new();
        ledger
            .expect_find()
            .returning(|_| Err(MerchantError::Internal("pool timed out".into())));

        let processor = OnboardingProcessor::new(Arc::new(ledger), Arc::new(StubRegistrar));
        let err = processor.process(&event()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_malformed_merchant_id_is_permanent() {
        let processor = OnboardingProcessor::new(
            Arc::new(InMemoryMerchantRepository::new()),
            Arc::new(InMemoryRegistrar::new()),
        );
        let mut job = event();
        job.merchant_id = "0x1234".into();

        let err = processor.process(&job).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_rate_limit_maps_through() {
        let err: ProcessingError = ChainError::RateLimited {
            message: "429".into(),
            retry_after_ms: Some(2000),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::RateLimited);
    }
}

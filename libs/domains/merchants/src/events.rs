//! Domain events published through the outbox.

use chrono::{DateTime, Utc};
use messaging::Job;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Merchant, OutboxMessage};

pub const MERCHANT_CREATED: &str = "merchant.created";

/// Announces a committed registration. Produced once per merchant;
/// consumers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantCreated {
    /// `0x`-prefixed hex.
    pub merchant_id: String,
    pub wallet_address: String,
    pub name: String,
    pub email: String,
    /// RFC 3339.
    pub created_at: DateTime<Utc>,
}

impl MerchantCreated {
    pub fn new(merchant: &Merchant, email: &str) -> Self {
        Self {
            merchant_id: merchant.merchant_id.to_hex(),
            wallet_address: merchant.wallet_address.clone(),
            name: merchant.name.clone(),
            email: email.to_string(),
            created_at: merchant.created_at,
        }
    }

    /// The pending outbox row carrying this event.
    pub fn to_outbox(&self) -> Result<OutboxMessage, serde_json::Error> {
        Ok(OutboxMessage {
            id: Uuid::now_v7(),
            aggregate_id: self.merchant_id.clone(),
            routing_key: MERCHANT_CREATED.to_string(),
            payload: serde_json::to_value(self)?,
            created_at: self.created_at,
            published_at: None,
            attempts: 0,
        })
    }
}

impl Job for MerchantCreated {
    fn job_id(&self) -> String {
        self.merchant_id.clone()
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn job_type(&self) -> &'static str {
        MERCHANT_CREATED
    }
}

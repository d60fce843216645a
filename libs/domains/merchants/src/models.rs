use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumString};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const MERCHANT_ID_LEN: usize = 32;

/// 32 random bytes, rendered as `0x` plus 64 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MerchantId([u8; MERCHANT_ID_LEN]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerchantIdError {
    #[error("merchant id must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("merchant id is not valid hex")]
    InvalidHex,
}

impl MerchantId {
    /// Fresh id from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MERCHANT_ID_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; MERCHANT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MerchantIdError> {
        let array: [u8; MERCHANT_ID_LEN] =
            bytes.try_into().map_err(|_| MerchantIdError::Length {
                expected: MERCHANT_ID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; MERCHANT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", const_hex::encode(self.0))
    }

    /// Accepts an optional `0x` prefix and either case.
    pub fn from_hex(value: &str) -> Result<Self, MerchantIdError> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);
        if digits.len() != MERCHANT_ID_LEN * 2 {
            return Err(MerchantIdError::Length {
                expected: MERCHANT_ID_LEN,
                actual: digits.len() / 2,
            });
        }
        let bytes = const_hex::decode(digits).map_err(|_| MerchantIdError::InvalidHex)?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerchantId({})", self.to_hex())
    }
}

impl FromStr for MerchantId {
    type Err = MerchantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for MerchantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MerchantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerchantStatus {
    Pending,
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Merchant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merchant {
    pub merchant_id: MerchantId,
    pub name: String,
    pub wallet_address: String,
    pub status: MerchantStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_uid: Uuid,
    /// Present for MERCHANT users, absent for ADMIN.
    pub merchant_id: Option<MerchantId>,
    /// Stored lower-cased.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A row of the transactional outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    /// Merchant id in hex.
    pub aggregate_id: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub attempts: i32,
}

/// Ledger entry: the chain accepted this merchant.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainRegistration {
    pub merchant_id: MerchantId,
    pub txid: String,
    pub registered_at: DateTime<Utc>,
}

/// Everything one registration commits, in a single transaction.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub merchant: Merchant,
    pub owner: User,
    pub event: OutboxMessage,
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(String::deserialize(deserializer)?.trim().to_string())
}

fn trimmed_lowercase<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(String::deserialize(deserializer)?.trim().to_lowercase())
}

/// Fields other than the password are trimmed and the email lower-cased
/// during deserialization, so validation sees the normalized values. The
/// password is kept byte for byte.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[serde(deserialize_with = "trimmed_lowercase")]
    #[validate(email(message = "must be a valid email address"))]
    #[schema(example = "a@x.com")]
    pub email: String,

    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,

    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "must not be empty"))]
    #[schema(example = "TAddr123")]
    pub wallet_address: String,

    #[serde(deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "must not be empty"))]
    #[schema(example = "Acme")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[serde(deserialize_with = "trimmed_lowercase")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub email: String,

    #[validate(length(min = 1, message = "must not be empty"))]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MerchantView {
    #[schema(example = "0x3f9a0c...")]
    pub merchant_id: String,
    pub name: String,
    pub wallet_address: String,
    pub status: MerchantStatus,
}

impl From<&Merchant> for MerchantView {
    fn from(merchant: &Merchant) -> Self {
        Self {
            merchant_id: merchant.merchant_id.to_hex(),
            name: merchant.name.clone(),
            wallet_address: merchant.wallet_address.clone(),
            status: merchant.status,
        }
    }
}

/// Outcome of the synchronous, best-effort chain registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChainStatus {
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainStatus {
    pub fn registered(txid: impl Into<String>) -> Self {
        Self {
            registered: true,
            txid: Some(txid.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            registered: false,
            txid: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub merchant: MerchantView,
    pub chain: ChainStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub user_uid: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            user_uid: user.user_uid,
            email: user.email.clone(),
            role: user.role,
            merchant_id: user.merchant_id.map(|id| id.to_hex()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
    pub user: UserView,
}

/// Claims of the caller, as verified from the bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub uid: Uuid,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

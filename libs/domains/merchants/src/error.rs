use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_helpers::{AuthError, ErrorResponse};
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::MerchantIdError;

/// Which uniqueness rule a registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    DuplicateEmail,
    DuplicateWallet,
    DuplicateName,
    Other,
}

/// Unique index name to conflict kind. Names match the migrations.
pub const CONSTRAINT_KINDS: &[(&str, ConflictKind)] = &[
    ("users_email_uidx", ConflictKind::DuplicateEmail),
    ("merchants_wallet_uidx", ConflictKind::DuplicateWallet),
    ("merchants_name_uidx", ConflictKind::DuplicateName),
];

impl ConflictKind {
    pub fn from_constraint(constraint: Option<&str>) -> Self {
        constraint
            .and_then(|name| {
                CONSTRAINT_KINDS
                    .iter()
                    .find(|(known, _)| *known == name)
                    .map(|(_, kind)| *kind)
            })
            .unwrap_or(ConflictKind::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateEmail => "duplicate_email",
            ConflictKind::DuplicateWallet => "duplicate_wallet",
            ConflictKind::DuplicateName => "duplicate_name",
            ConflictKind::Other => "conflict",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateEmail => "email already registered",
            ConflictKind::DuplicateWallet => "wallet address already registered",
            ConflictKind::DuplicateName => "merchant name already taken",
            ConflictKind::Other => "registration conflicts with an existing record",
        }
    }
}

#[derive(Debug, Error)]
pub enum MerchantError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{}", .0.message())]
    Conflict(ConflictKind),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("Invalid merchant id: {0}")]
    InvalidMerchantId(#[from] MerchantIdError),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Token error: {0}")]
    Token(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MerchantResult<T> = Result<T, MerchantError>;

impl MerchantError {
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            MerchantError::Conflict(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl IntoResponse for MerchantError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            MerchantError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("validation_error", msg.clone()),
            ),
            MerchantError::Conflict(kind) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(kind.as_str(), kind.message()),
            ),
            MerchantError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("invalid_credentials", "invalid credentials"),
            ),
            MerchantError::InvalidMerchantId(e) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("invalid_merchant_id", e.to_string()),
            ),
            MerchantError::PasswordHash(_)
            | MerchantError::Token(_)
            | MerchantError::Database(_)
            | MerchantError::Internal(_) => {
                tracing::error!(error = %self, "Onboarding request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("internal_error", "An internal error occurred"),
                )
            }
        };

        body.into_response_with(status)
    }
}

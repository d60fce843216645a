//! Stateless bearer-token authentication.
//!
//! Tokens are HS256 JWTs minted by [`TokenIssuer`] and checked for
//! signature, expiry and issuer only; there is no server-side session.
//!
//! ```ignore
//! use axum_helpers::auth::{AuthUser, JwtConfig, TokenIssuer};
//! use core_config::FromEnv;
//!
//! let issuer = TokenIssuer::new(&JwtConfig::from_env()?);
//! let issued = issuer.sign(user_uid, "a@x.com", "MERCHANT", Some(&merchant_hex))?;
//!
//! async fn me(AuthUser(claims): AuthUser) -> String {
//!     claims.email
//! }
//! ```

pub mod config;
pub mod extractor;
pub mod jwt;

pub use config::JwtConfig;
pub use extractor::{AuthUser, bearer_token};
pub use jwt::{ACCESS_TOKEN_TTL, AuthError, Claims, DEFAULT_ISSUER, IssuedToken, TokenIssuer};

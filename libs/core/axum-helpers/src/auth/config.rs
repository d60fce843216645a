use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use std::fmt;

use super::jwt::{ACCESS_TOKEN_TTL, DEFAULT_ISSUER};

pub const MIN_SECRET_LEN: usize = 32;

/// Token signing configuration.
///
/// Environment variables:
/// - `JWT_SECRET` (required) - at least 32 characters
/// - `JWT_ISSUER` (default: `merchant-backend`)
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    /// Lifetime of access tokens in seconds.
    pub ttl_secs: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        check_secret(&secret)?;
        Ok(Self {
            secret,
            issuer: DEFAULT_ISSUER.to_string(),
            ttl_secs: ACCESS_TOKEN_TTL,
        })
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

fn check_secret(secret: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::ParseError {
            key: "JWT_SECRET".to_string(),
            details: format!(
                "must be at least {} characters (got {}). Generate one with: openssl rand -base64 32",
                MIN_SECRET_LEN,
                secret.len()
            ),
        });
    }
    Ok(())
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"***")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl FromEnv for JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = env_required("JWT_SECRET")?;
        let issuer = env_or_default("JWT_ISSUER", DEFAULT_ISSUER);
        Ok(Self::new(secret)?.with_issuer(issuer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "this-is-a-valid-secret-with-32-chars!";

    #[test]
    fn test_new_rejects_short_secret() {
        let err = JwtConfig::new("short").unwrap_err();
        assert!(err.to_string().contains("32 characters"));
    }

    #[test]
    fn test_from_env_defaults_issuer() {
        temp_env::with_vars(
            [("JWT_SECRET", Some(SECRET)), ("JWT_ISSUER", None)],
            || {
                let config = JwtConfig::from_env().unwrap();
                assert_eq!(config.secret, SECRET);
                assert_eq!(config.issuer, "merchant-backend");
                assert_eq!(config.ttl_secs, 900);
            },
        );
    }

    #[test]
    fn test_from_env_custom_issuer() {
        temp_env::with_vars(
            [("JWT_SECRET", Some(SECRET)), ("JWT_ISSUER", Some("onboarding-test"))],
            || {
                assert_eq!(JwtConfig::from_env().unwrap().issuer, "onboarding-test");
            },
        );
    }

    #[test]
    fn test_from_env_missing_secret() {
        temp_env::with_var_unset("JWT_SECRET", || {
            let err = JwtConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("JWT_SECRET"));
        });
    }

    #[test]
    fn test_debug_hides_secret() {
        let printed = format!("{:?}", JwtConfig::new(SECRET).unwrap());
        assert!(!printed.contains(SECRET));
    }
}

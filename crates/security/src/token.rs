//! API key issuance and verification.
//!
//! Two modes:
//! - **jwt**: HS256-signed tokens carrying client id, scopes, issuer and expiry
//! - **static**: a single shared key, issued to anyone the admin asks for

use aenki_config::{AuthConfig, AuthMode};
use aenki_core::error::AuthError;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scopes granted when the caller does not ask for specific ones.
pub const DEFAULT_SCOPES: &[&str] = &["tts", "chat", "train", "search"];

const SUBJECT_PREFIX: &str = "client:";
const STATIC_CLIENT_ID: &str = "static";
/// Ten years.
const MAX_TTL_MINUTES: u64 = 10 * 365 * 24 * 60;

/// Claims carried by a jwt-mode key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// `client:<id>`
    pub sub: String,
    pub scopes: Vec<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly minted key.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedKey {
    pub api_key: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub issuer: String,
    pub mode: AuthMode,
    /// `None` for static keys, which never expire
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a valid key says about its holder.
#[derive(Debug, Clone, Serialize)]
pub struct Introspection {
    pub valid: bool,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub issuer: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Mints and checks API keys.
pub struct TokenAuthority {
    mode: AuthMode,
    issuer: String,
    ttl: chrono::Duration,
    static_key: Option<String>,
    admin_token: Option<String>,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenAuthority {
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            mode: config.mode,
            issuer: config.issuer.clone(),
            ttl: chrono::Duration::minutes(config.ttl_minutes.min(MAX_TTL_MINUTES) as i64),
            static_key: config.static_key.clone(),
            admin_token: config.admin_token.clone(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Check the `x-admin-token` presented for privileged operations.
    pub fn check_admin(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = self.admin_token.as_deref() else {
            return Err(AuthError::Forbidden("admin token not configured".into()));
        };
        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
            _ => Err(AuthError::Forbidden("invalid admin token".into())),
        }
    }

    /// Mint a key for `client_id`. Empty `scopes` grants the defaults.
    pub fn issue(&self, client_id: &str, scopes: &[String]) -> Result<IssuedKey, AuthError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(AuthError::IssueFailed("client_id must not be empty".into()));
        }
        let scopes = if scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            scopes.to_vec()
        };

        match self.mode {
            AuthMode::Static => {
                let api_key = self
                    .static_key
                    .clone()
                    .ok_or_else(|| AuthError::IssueFailed("static key not configured".into()))?;
                Ok(IssuedKey {
                    api_key,
                    client_id: client_id.to_string(),
                    scopes,
                    issuer: self.issuer.clone(),
                    mode: AuthMode::Static,
                    expires_at: None,
                })
            }
            AuthMode::Jwt => {
                let now = Utc::now();
                let exp = now + self.ttl;
                let claims = TokenClaims {
                    sub: format!("{SUBJECT_PREFIX}{client_id}"),
                    scopes: scopes.clone(),
                    iss: self.issuer.clone(),
                    iat: now.timestamp(),
                    exp: exp.timestamp(),
                };
                let api_key = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
                    .map_err(|e| AuthError::IssueFailed(e.to_string()))?;
                debug!(client_id, "Issued API key");
                Ok(IssuedKey {
                    api_key,
                    client_id: client_id.to_string(),
                    scopes,
                    issuer: self.issuer.clone(),
                    mode: AuthMode::Jwt,
                    expires_at: Utc.timestamp_opt(claims.exp, 0).single(),
                })
            }
        }
    }

    /// Check a presented key.
    pub fn verify(&self, api_key: &str) -> Result<Introspection, AuthError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AuthError::MissingKey);
        }

        match self.mode {
            AuthMode::Static => match self.static_key.as_deref() {
                Some(expected) if constant_time_eq(api_key.as_bytes(), expected.as_bytes()) => Ok(Introspection {
                    valid: true,
                    client_id: STATIC_CLIENT_ID.into(),
                    scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
                    issuer: self.issuer.clone(),
                    issued_at: None,
                    expires_at: None,
                }),
                _ => Err(AuthError::InvalidKey("key does not match".into())),
            },
            AuthMode::Jwt => {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.leeway = 0;
                validation.set_issuer(&[&self.issuer]);
                validation.set_required_spec_claims(&["exp", "iss", "sub"]);

                let data = decode::<TokenClaims>(api_key, &self.decoding, &validation).map_err(|e| {
                    match e.kind() {
                        ErrorKind::ExpiredSignature => AuthError::Expired,
                        _ => AuthError::InvalidKey(e.to_string()),
                    }
                })?;
                let claims = data.claims;
                let client_id = claims
                    .sub
                    .strip_prefix(SUBJECT_PREFIX)
                    .unwrap_or(&claims.sub)
                    .to_string();
                Ok(Introspection {
                    valid: true,
                    client_id,
                    scopes: claims.scopes,
                    issuer: claims.iss,
                    issued_at: Utc.timestamp_opt(claims.iat, 0).single(),
                    expires_at: Utc.timestamp_opt(claims.exp, 0).single(),
                })
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret-0123456789".into(),
            admin_token: Some("admin-boot".into()),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn jwt_issue_then_verify() {
        let authority = TokenAuthority::from_config(&jwt_config());
        let issued = authority.issue("clinic-42", &[]).unwrap();
        assert_eq!(issued.scopes, vec!["tts", "chat", "train", "search"]);
        assert!(issued.expires_at.is_some());

        let info = authority.verify(&issued.api_key).unwrap();
        assert!(info.valid);
        assert_eq!(info.client_id, "clinic-42");
        assert_eq!(info.issuer, "aenki.local");
        assert_eq!(info.expires_at, issued.expires_at);
    }

    #[test]
    fn custom_scopes_are_carried() {
        let authority = TokenAuthority::from_config(&jwt_config());
        let issued = authority.issue("reader", &["search".to_string()]).unwrap();
        let info = authority.verify(&issued.api_key).unwrap();
        assert_eq!(info.scopes, vec!["search"]);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issued = TokenAuthority::from_config(&jwt_config()).issue("c", &[]).unwrap();
        let other = TokenAuthority::from_config(&AuthConfig {
            jwt_secret: "another-secret".into(),
            ..AuthConfig::default()
        });
        assert!(matches!(other.verify(&issued.api_key), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let issued = TokenAuthority::from_config(&jwt_config()).issue("c", &[]).unwrap();
        let other = TokenAuthority::from_config(&AuthConfig {
            issuer: "someone.else".into(),
            ..jwt_config()
        });
        assert!(matches!(other.verify(&issued.api_key), Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn expired_key_is_rejected() {
        let config = jwt_config();
        let past = Utc::now().timestamp() - 3600;
        let claims = TokenClaims {
            sub: "client:old".into(),
            scopes: vec!["chat".into()],
            iss: config.issuer.clone(),
            iat: past - 60,
            exp: past,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        let authority = TokenAuthority::from_config(&config);
        assert_eq!(authority.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn garbage_and_empty_keys_are_rejected() {
        let authority = TokenAuthority::from_config(&jwt_config());
        assert!(matches!(authority.verify("not.a.jwt"), Err(AuthError::InvalidKey(_))));
        assert_eq!(authority.verify("  ").unwrap_err(), AuthError::MissingKey);
    }

    #[test]
    fn static_mode_accepts_only_configured_key() {
        let authority = TokenAuthority::from_config(&AuthConfig {
            mode: AuthMode::Static,
            static_key: Some("aenki-dev".into()),
            ..AuthConfig::default()
        });
        let issued = authority.issue("anyone", &[]).unwrap();
        assert_eq!(issued.api_key, "aenki-dev");
        assert!(issued.expires_at.is_none());
        assert!(authority.verify("aenki-dev").is_ok());
        assert!(authority.verify("aenki-prod").is_err());
    }

    #[test]
    fn static_mode_without_key_cannot_issue() {
        let authority = TokenAuthority::from_config(&AuthConfig {
            mode: AuthMode::Static,
            ..AuthConfig::default()
        });
        assert!(matches!(authority.issue("c", &[]), Err(AuthError::IssueFailed(_))));
    }

    #[test]
    fn admin_token_check() {
        let authority = TokenAuthority::from_config(&jwt_config());
        assert!(authority.check_admin(Some("admin-boot")).is_ok());
        assert!(authority.check_admin(Some("admin-boo")).is_err());
        assert!(authority.check_admin(None).is_err());

        let no_admin = TokenAuthority::from_config(&AuthConfig::default());
        assert!(no_admin.check_admin(Some("admin-boot")).is_err());
    }

    #[test]
    fn empty_client_id_cannot_be_issued() {
        let authority = TokenAuthority::from_config(&jwt_config());
        assert!(authority.issue("  ", &[]).is_err());
    }
}

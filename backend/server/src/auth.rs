//! # Auth Tokens
//!
//! Bearer tokens issued on login and checked on every request that cares about
//! the caller.
//!
//! ## Format
//!
//! `<payload>.<signature>`
//! - payload: base64url (no padding) JSON claims `{sub, collection, exp}`
//! - signature: hex HMAC-SHA256 of the encoded payload
//!
//! ## Caller
//!
//! A missing, malformed, tampered or expired token makes the caller
//! anonymous. Nothing is rejected at extraction time; handlers decide what an
//! anonymous caller may do.
use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::{
    state::AppState,
    store::{Collection, Record},
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Invalid signing key")]
    Key,

    #[error("Failed to encode token claims")]
    Encode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub collection: Collection,
    pub exp: i64,
}

pub struct TokenSigner {
    key: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        <HmacSha256 as Mac>::new_from_slice(&self.key).map_err(|_| AuthError::Key)
    }

    pub fn issue(&self, record: &Record, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: record.id.clone(),
            collection: record.collection,
            exp: (Utc::now() + ttl).timestamp(),
        };
        let json = serde_json::to_vec(&claims).map_err(|_| AuthError::Encode)?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

/// Whether the current caller carries a validated identity.
pub trait AuthContext {
    fn is_authenticated(&self) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Caller {
    claims: Option<Claims>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_claims(claims: Claims) -> Self {
        Self {
            claims: Some(claims),
        }
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }
}

impl AuthContext for Caller {
    fn is_authenticated(&self) -> bool {
        self.claims
            .as_ref()
            .is_some_and(|claims| !claims.sub.is_empty())
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        else {
            return Ok(Caller::anonymous());
        };

        match state.tokens.verify(token.trim()) {
            Ok(claims) => Ok(Caller::from_claims(claims)),
            Err(e) => {
                debug!("Ignoring bearer token: {e}");
                Ok(Caller::anonymous())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn superuser() -> Record {
        Record::new(Collection::Superusers, "a@b.com", "hash".to_string())
    }

    #[test]
    fn test_issue_then_verify() {
        let signer = TokenSigner::new("secret");
        let record = superuser();

        let token = signer.issue(&record, Duration::minutes(5)).unwrap();
        let claims = signer.verify(&token).unwrap();

        assert_eq!(claims.sub, record.id);
        assert_eq!(claims.collection, Collection::Superusers);
        assert!(Caller::from_claims(claims).is_authenticated());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = TokenSigner::new("secret")
            .issue(&superuser(), Duration::minutes(5))
            .unwrap();

        assert_eq!(
            TokenSigner::new("other").verify(&token),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.issue(&superuser(), Duration::minutes(5)).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = Claims {
            sub: "someone-else".to_string(),
            collection: Collection::Superusers,
            exp: i64::MAX,
        };
        let forged = format!(
            "{}.{signature}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap())
        );

        assert_eq!(signer.verify(&forged), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_expired_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.issue(&superuser(), Duration::seconds(-1)).unwrap();

        assert_eq!(signer.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_malformed_rejected() {
        let signer = TokenSigner::new("secret");

        assert_eq!(signer.verify("no-dot"), Err(AuthError::Malformed));
        assert_eq!(signer.verify("abc.not-hex"), Err(AuthError::Malformed));
    }

    #[test]
    fn test_anonymous_caller() {
        assert!(!Caller::anonymous().is_authenticated());
        assert!(Caller::anonymous().claims().is_none());
    }

    #[test]
    fn test_caller_exposes_claims() {
        let signer = TokenSigner::new("secret");
        let record = superuser();
        let token = signer.issue(&record, Duration::minutes(5)).unwrap();

        let caller = Caller::from_claims(signer.verify(&token).unwrap());
        let claims = caller.claims().unwrap();

        assert_eq!(claims.sub, record.id);
        assert_eq!(claims.collection, Collection::Superusers);
    }
}

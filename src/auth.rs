//! Bearer-token verification.
//!
//! Sign-up and login live with the external identity provider; this service
//! only verifies HS256 access tokens it shares a secret with.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
#[cfg(test)]
use chrono::{Duration, Utc};
#[cfg(test)]
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::AuthCfg;
use crate::errors::{CoreError, CoreResult};
use crate::store::is_safe_id;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  /// Learner id.
  pub sub: String,
  #[serde(default)]
  pub role: Option<String>,
  pub exp: i64,
  pub iss: String,
  pub aud: String,
}

/// Verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub learner_id: String,
  pub is_admin: bool,
}

impl Identity {
  pub fn require_admin(&self) -> CoreResult<()> {
    if self.is_admin {
      Ok(())
    } else {
      Err(CoreError::Authorization("admin role required".into()))
    }
  }
}

#[derive(Clone)]
pub struct TokenVerifier {
  issuer: String,
  audience: String,
  #[cfg(test)]
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
}

impl TokenVerifier {
  pub fn new(cfg: &AuthCfg) -> Self {
    Self {
      issuer: cfg.issuer.clone(),
      audience: cfg.audience.clone(),
      #[cfg(test)]
      encoding_key: EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
      decoding_key: DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    }
  }

  pub fn verify(&self, token: &str) -> CoreResult<Identity> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&self.issuer]);
    validation.set_audience(&[&self.audience]);

    let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
      ErrorKind::ExpiredSignature => CoreError::Authentication("token expired".into()),
      ErrorKind::InvalidSignature => CoreError::Authentication("invalid token signature".into()),
      _ => CoreError::Authentication("malformed token".into()),
    })?;

    let claims = data.claims;
    if !is_safe_id(&claims.sub) {
      return Err(CoreError::Authentication("token subject is not a valid learner id".into()));
    }
    Ok(Identity {
      is_admin: claims.role.as_deref() == Some(ADMIN_ROLE),
      learner_id: claims.sub,
    })
  }

  /// Extracts and verifies `Authorization: Bearer <token>`.
  pub fn identify(&self, headers: &HeaderMap) -> CoreResult<Identity> {
    let raw = headers
      .get(AUTHORIZATION)
      .ok_or_else(|| CoreError::Authentication("missing Authorization header".into()))?
      .to_str()
      .map_err(|_| CoreError::Authentication("unreadable Authorization header".into()))?;
    let token = raw
      .strip_prefix("Bearer ")
      .or_else(|| raw.strip_prefix("bearer "))
      .ok_or_else(|| CoreError::Authentication("expected a Bearer token".into()))?;
    self.verify(token.trim())
  }

  /// Mints a token. The identity provider does this in production.
  #[cfg(test)]
  pub fn issue(&self, learner_id: &str, role: Option<&str>, ttl: Duration) -> CoreResult<String> {
    let claims = Claims {
      sub: learner_id.to_string(),
      role: role.map(str::to_string),
      exp: (Utc::now() + ttl).timestamp(),
      iss: self.issuer.clone(),
      aud: self.audience.clone(),
    };
    encode(&Header::default(), &claims, &self.encoding_key)
      .map_err(|e| CoreError::Authentication(format!("token generation failed: {}", e)))
  }
}

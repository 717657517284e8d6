//! Authentication extractor.
//!
//! Requests carry `Authorization: Bearer <jwt>`, an HS256 token with claims
//! `{sub, role, family_id, exp, iat}`. `sub` is the parent id for parents and
//! the child id for children. Tokens are minted by the sign-in flow; this
//! service only verifies them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use kidbank_core::{Actor, ChildId, FamilyId, ParentId};

use crate::error::ApiError;
use crate::state::AppState;

/// Role claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleClaim {
    /// `sub` is a parent id.
    Parent,
    /// `sub` is a child id.
    Child,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: parent or child id.
    pub sub: String,
    /// Which kind of id `sub` is.
    pub role: RoleClaim,
    /// The caller's family.
    pub family_id: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    pub iat: i64,
}

impl JwtClaims {
    fn into_actor(self) -> Option<Actor> {
        let family_id: FamilyId = self.family_id.parse().ok()?;
        match self.role {
            RoleClaim::Parent => Some(Actor::parent(family_id, self.sub.parse::<ParentId>().ok()?)),
            RoleClaim::Child => Some(Actor::child(family_id, self.sub.parse::<ChildId>().ok()?)),
        }
    }
}

/// Signing and verification keys derived from the shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    /// Derive both keys from an HS256 secret.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Verify a token and turn its claims into an [`Actor`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for bad signatures, expired tokens
    /// and malformed claims.
    pub fn verify(&self, token: &str) -> Result<Actor, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<JwtClaims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized
        })?;

        data.claims.into_actor().ok_or_else(|| {
            tracing::debug!("JWT claims do not name a valid actor");
            ApiError::Unauthorized
        })
    }

    /// Mint a token for `actor`, valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn sign(&self, actor: &Actor, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let (sub, role) = match actor.role {
            kidbank_core::Role::Parent(id) => (id.to_string(), RoleClaim::Parent),
            kidbank_core::Role::Child(id) => (id.to_string(), RoleClaim::Child),
        };
        let claims = JwtClaims {
            sub,
            role,
            family_id: actor.family_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }
}

/// Mint a token for `actor` with `secret`. Used by tooling and tests.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn sign_token(
    secret: &str,
    actor: &Actor,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    JwtKeys::from_secret(secret.as_bytes()).sign(actor, ttl)
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthActor(pub Actor);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        state.keys.verify(token).map(AuthActor)
    }
}

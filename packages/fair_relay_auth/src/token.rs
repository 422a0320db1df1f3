//! HS256 token verification and issuance.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::identity::Identity;

/// Full claim set carried by a relay token.
///
/// The registered timing claims are split out so they never leak into the
/// identity that peers see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub identity: Identity,
    /// Expiration (unix seconds). Required.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl TokenClaims {
    /// Claims for `identity` that expire `ttl` from now.
    pub fn new(identity: Identity, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            identity,
            exp: (now + ttl).timestamp(),
            iat: Some(now.timestamp()),
            nbf: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Holds the shared secret and verifies (or mints) tokens with it.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    /// `leeway_secs` is the clock skew tolerated on `exp` and `nbf`.
    pub fn new(secret: &[u8], leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.validate_nbf = true;
        // Tokens are not audience-scoped to the relay
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Check signature and expiry, then return the identity the token names.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation)?;
        let identity = data.claims.identity;
        identity.validate()?;
        Ok(identity)
    }

    pub fn issue(&self, identity: Identity, ttl: Duration) -> Result<String, AuthError> {
        self.issue_claims(&TokenClaims::new(identity, ttl))
    }

    pub fn issue_claims(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        claims.identity.validate()?;
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("algorithm", &"HS256")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

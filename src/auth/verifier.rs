use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::jwks::JwksCache;
use crate::core::error::Error;
use crate::types::user::User;

const PROVIDER_ALGORITHM: Algorithm = Algorithm::RS256;
const LOCAL_ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, thiserror::Error)]
pub(crate) enum VerificationError {
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Key set error: {0}")]
    KeySet(#[from] reqwest::Error),
    #[error("Unexpected signing algorithm {0:?}")]
    Algorithm(Algorithm),
    #[error("Token header has no key id")]
    MissingKeyId,
    #[error("No published key matches the token's key id")]
    UnknownKey,
    #[error("Key set unavailable after a recent failed fetch")]
    KeySetUnavailable,
    #[error("Token carries no usable email claim")]
    MissingEmail,
    #[error("Provider has not verified the email address")]
    UnverifiedEmail,
    #[error("Token rejected by every issuer")]
    Rejected,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) email_verified: Option<bool>,
    pub(crate) iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) iat: Option<i64>,
    pub(crate) exp: i64,
}

/// Claims of a token whose signature, issuer and expiry have been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VerifiedClaims {
    pub(crate) subject_email: String,
    pub(crate) issuer: String,
    pub(crate) expiry: DateTime<Utc>,
}

impl TryFrom<Claims> for VerifiedClaims {
    type Error = VerificationError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.email_verified == Some(false) {
            return Err(VerificationError::UnverifiedEmail);
        }

        let subject_email = claims
            .email
            .filter(|email| !email.trim().is_empty())
            .ok_or(VerificationError::MissingEmail)?;

        Ok(Self {
            subject_email,
            issuer: claims.iss,
            expiry: DateTime::from_timestamp(claims.exp, 0).unwrap_or(DateTime::UNIX_EPOCH),
        })
    }
}

/// Verifies structured tokens from two issuers: the external provider, whose
/// keys come from its published key set, and this service, which signs with
/// a shared secret.
pub(crate) struct TokenVerifier {
    provider_keys: JwksCache,
    provider_validation: Validation,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    local_validation: Validation,
    local_issuer: String,
    token_ttl: Duration,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("provider_keys", &self.provider_keys)
            .field("local_issuer", &self.local_issuer)
            .finish()
    }
}

impl TokenVerifier {
    pub(crate) fn new(
        provider_keys: JwksCache,
        provider_issuer: &str,
        provider_audience: Option<&str>,
        secret: &str,
        local_issuer: &str,
        token_ttl: Duration,
    ) -> Self {
        let mut provider_validation = Validation::new(PROVIDER_ALGORITHM);
        provider_validation.set_issuer(&[provider_issuer]);
        provider_validation.set_required_spec_claims(&["exp", "iss"]);
        match provider_audience {
            Some(audience) => provider_validation.set_audience(&[audience]),
            None => provider_validation.validate_aud = false,
        }

        let mut local_validation = Validation::new(LOCAL_ALGORITHM);
        local_validation.set_issuer(&[local_issuer]);
        local_validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            provider_keys,
            provider_validation,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            local_validation,
            local_issuer: local_issuer.to_owned(),
            token_ttl,
        }
    }

    /// Tries the provider's keys first and the local secret second. The
    /// token's own `iss` is never used to pick between them.
    pub(crate) async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        match self.verify_provider(token).await {
            Ok(claims) => return Ok(claims),
            Err(e) => tracing::debug!("Provider verification failed: {}", e),
        }

        match self.verify_local(token) {
            Ok(claims) => Ok(claims),
            Err(e) => {
                tracing::debug!("Local verification failed: {}", e);
                Err(VerificationError::Rejected)
            }
        }
    }

    async fn verify_provider(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        let header = jsonwebtoken::decode_header(token)?;

        // not signed by the provider, no point fetching its keys
        if header.alg != PROVIDER_ALGORITHM {
            return Err(VerificationError::Algorithm(header.alg));
        }

        let kid = header.kid.ok_or(VerificationError::MissingKeyId)?;
        let key = self.provider_keys.key(&kid).await?;

        let token_data = jsonwebtoken::decode::<Claims>(token, &key, &self.provider_validation)?;

        VerifiedClaims::try_from(token_data.claims)
    }

    fn verify_local(&self, token: &str) -> Result<VerifiedClaims, VerificationError> {
        let token_data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.local_validation)?;

        VerifiedClaims::try_from(token_data.claims)
    }

    pub(crate) fn issue(&self, user: &User) -> Result<String, Error> {
        let current_time = Utc::now();
        let expiration_time = current_time + self.token_ttl;

        let claims = Claims {
            sub: Some(user.id.to_string()),
            email: Some(user.email.clone()),
            email_verified: None,
            iss: self.local_issuer.clone(),
            iat: Some(current_time.timestamp()),
            exp: expiration_time.timestamp(),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(LOCAL_ALGORITHM),
            &claims,
            &self.encoding_key,
        )?)
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use crate::auth::verifier::VerificationError;

#[derive(Default)]
struct KeyState {
    keys: Option<Arc<JwkSet>>,
    fetched_at: Option<Instant>,
    failed_at: Option<Instant>,
}

/// Public signing keys published by the structured-token provider.
///
/// Keys are refetched once `refresh` has passed, or early when a token names
/// a key id the cached set lacks. Early refetches and retries after a failed
/// fetch are spaced at least `cooldown` apart, and only one fetch runs at a
/// time; callers that queued behind it reuse its outcome.
pub(crate) struct JwksCache {
    client: reqwest::Client,
    url: String,
    refresh: Duration,
    cooldown: Duration,
    state: RwLock<KeyState>,
    fetching: Mutex<()>,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("url", &self.url)
            .field("refresh", &self.refresh)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl JwksCache {
    pub(crate) fn new(
        client: reqwest::Client,
        url: String,
        refresh: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            client,
            url,
            refresh,
            cooldown,
            state: RwLock::new(KeyState::default()),
            fetching: Mutex::new(()),
        }
    }

    pub(crate) async fn key(&self, kid: &str) -> Result<DecodingKey, VerificationError> {
        let keys = self.keys(false).await?;

        if let Some(jwk) = keys.find(kid) {
            return Ok(DecodingKey::from_jwk(jwk)?);
        }

        // the provider may have rotated to a key we have not seen yet
        tracing::debug!(kid, "Unknown key id, checking for a rotated key set");

        let keys = self.keys(true).await?;
        let jwk = keys.find(kid).ok_or(VerificationError::UnknownKey)?;

        Ok(DecodingKey::from_jwk(jwk)?)
    }

    async fn keys(&self, rotated: bool) -> Result<Arc<JwkSet>, VerificationError> {
        if let Some(result) = self.cached(&*self.state.read().await, rotated) {
            return result;
        }

        let _fetching = self.fetching.lock().await;

        // whoever held the lock before us may already have settled it
        if let Some(result) = self.cached(&*self.state.read().await, rotated) {
            return result;
        }

        match self.fetch().await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                let mut state = self.state.write().await;

                state.keys = Some(keys.clone());
                state.fetched_at = Some(Instant::now());
                state.failed_at = None;

                Ok(keys)
            }
            Err(e) => {
                tracing::warn!("Provider key set fetch failed: {}", e);

                let mut state = self.state.write().await;
                state.failed_at = Some(Instant::now());

                match &state.keys {
                    Some(keys) => Ok(keys.clone()),
                    None => Err(e),
                }
            }
        }
    }

    /// `None` means a fetch is due.
    fn cached(
        &self,
        state: &KeyState,
        rotated: bool,
    ) -> Option<Result<Arc<JwkSet>, VerificationError>> {
        if let (Some(keys), Some(fetched_at)) = (&state.keys, state.fetched_at) {
            let age = fetched_at.elapsed();

            if age < self.refresh && (!rotated || age < self.cooldown) {
                return Some(Ok(keys.clone()));
            }
        }

        if state
            .failed_at
            .is_some_and(|failed_at| failed_at.elapsed() < self.cooldown)
        {
            return Some(match &state.keys {
                Some(keys) => Ok(keys.clone()),
                None => Err(VerificationError::KeySetUnavailable),
            });
        }

        None
    }

    #[instrument(skip_all)]
    async fn fetch(&self) -> Result<JwkSet, VerificationError> {
        tracing::debug!("Fetching provider key set");

        let keys = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;

        tracing::debug!("Fetched {} provider keys", keys.keys.len());

        Ok(keys)
    }
}

use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ResolutionError {
    #[error("Reqwest error: {0}")]
    HTTPClient(#[from] reqwest::Error),
    #[error("No primary verified email among {0} addresses")]
    NoVerifiedEmail(usize),
}

#[derive(Debug, Deserialize)]
struct ProviderEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// Resolves an opaque access token to the account's primary email by asking
/// the provider that issued it.
#[derive(Clone, Debug)]
pub(crate) struct EmailResolver {
    client: reqwest::Client,
    url: String,
}

impl EmailResolver {
    pub(crate) fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    /// A single attempt; an invalid token should fail fast rather than be
    /// retried.
    #[instrument(skip_all)]
    pub(crate) async fn resolve_email(&self, token: &str) -> Result<String, ResolutionError> {
        tracing::debug!("Resolving opaque token against provider");

        let emails = self
            .client
            .get(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ProviderEmail>>()
            .await?;

        let count = emails.len();

        emails
            .into_iter()
            .find(|entry| entry.primary && entry.verified)
            .map(|entry| entry.email)
            .ok_or(ResolutionError::NoVerifiedEmail(count))
    }
}

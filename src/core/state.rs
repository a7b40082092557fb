use std::sync::Arc;
use std::time::Duration;

use crate::auth::binder::IdentityBinder;
use crate::auth::github::EmailResolver;
use crate::auth::jwks::JwksCache;
use crate::auth::pipeline::AuthPipeline;
use crate::auth::verifier::TokenVerifier;
use crate::controllers::user::UserController;
use crate::core::config::Args;
use crate::core::error::ConfigError;
use crate::core::store::UserStore;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub(crate) pipeline: Arc<AuthPipeline>,
    pub(crate) verifier: Arc<TokenVerifier>,
    pub(crate) user_controller: UserController,
}

impl AppState {
    pub(crate) fn new(args: &Args, store: Arc<dyn UserStore>) -> Result<Self, ConfigError> {
        // shared by every identity provider call, bounded well below any
        // request deadline
        let client = reqwest::ClientBuilder::new()
            .user_agent(&args.user_agent)
            .timeout(Duration::from_secs(args.identity_timeout_secs))
            .build()?;

        let verifier = Arc::new(TokenVerifier::new(
            JwksCache::new(
                client.clone(),
                args.google_jwks_url.clone(),
                Duration::from_secs(args.jwks_refresh_secs),
                Duration::from_secs(args.jwks_cooldown_secs),
            ),
            &args.google_issuer,
            args.google_client_id.as_deref(),
            &args.secret,
            &args.local_issuer,
            chrono::Duration::minutes(args.token_ttl_minutes),
        ));

        let binder = IdentityBinder::new(store.clone());

        let pipeline = AuthPipeline::from_kinds(
            &args.auth_steps,
            verifier.clone(),
            EmailResolver::new(client, args.github_emails_url.clone()),
            binder,
        )?;

        tracing::debug!("Authentication steps: {:?}", pipeline);

        Ok(AppState {
            pipeline: Arc::new(pipeline),
            verifier,
            user_controller: UserController::new(store)?,
        })
    }
}

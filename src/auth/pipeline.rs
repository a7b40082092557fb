use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::binder::IdentityBinder;
use crate::auth::credential::{Credential, CredentialKind};
use crate::auth::github::EmailResolver;
use crate::auth::verifier::TokenVerifier;
use crate::core::error::{ConfigError, Error};
use crate::types::user::Principal;

/// Names accepted in the `auth_steps` setting.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum StepKind {
    Opaque,
    Structured,
}

pub(crate) enum StepOutcome {
    Pass,
    Reject,
    Bound {
        principal: Principal,
        consume_credential: bool,
    },
}

/// Everything known about the caller while the pipeline runs. Lives for a
/// single request.
#[derive(Debug)]
pub(crate) struct AuthContext {
    credential: Credential,
    consumed: bool,
    principal: Option<Principal>,
}

impl AuthContext {
    fn new(credential: Credential) -> Self {
        Self {
            credential,
            consumed: false,
            principal: None,
        }
    }

    pub(crate) fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The credential still needs resolving by a step that handles `kind`.
    pub(crate) fn pending(&self, kind: CredentialKind) -> Option<&str> {
        if self.consumed || self.principal.is_some() || self.credential.kind() != kind {
            return None;
        }

        self.credential.raw()
    }

    #[cfg(test)]
    pub(crate) fn is_consumed(&self) -> bool {
        self.consumed
    }

    #[cfg(test)]
    pub(crate) fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub(crate) fn into_principal(self) -> Option<Principal> {
        self.principal
    }
}

#[async_trait]
pub(crate) trait AuthenticationStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authenticate(&self, context: &AuthContext) -> Result<StepOutcome, Error>;
}

/// Resolves opaque access tokens through the issuing provider. The token is
/// marked consumed once bound so no later step reinterprets it.
pub(crate) struct OpaqueTokenStep {
    resolver: EmailResolver,
    binder: IdentityBinder,
}

impl OpaqueTokenStep {
    pub(crate) fn new(resolver: EmailResolver, binder: IdentityBinder) -> Self {
        Self { resolver, binder }
    }
}

#[async_trait]
impl AuthenticationStep for OpaqueTokenStep {
    fn name(&self) -> &'static str {
        "opaque"
    }

    async fn authenticate(&self, context: &AuthContext) -> Result<StepOutcome, Error> {
        let Some(token) = context.pending(CredentialKind::Opaque) else {
            return Ok(StepOutcome::Pass);
        };

        let email = match self.resolver.resolve_email(token).await {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!("Opaque token resolution failed: {}", e);
                return Ok(StepOutcome::Reject);
            }
        };

        let user = self.binder.bind_or_create(&email).await?;

        Ok(StepOutcome::Bound {
            principal: Principal::new(user),
            consume_credential: true,
        })
    }
}

/// Verifies structured tokens from either the provider or this service.
pub(crate) struct StructuredTokenStep {
    verifier: Arc<TokenVerifier>,
    binder: IdentityBinder,
}

impl StructuredTokenStep {
    pub(crate) fn new(verifier: Arc<TokenVerifier>, binder: IdentityBinder) -> Self {
        Self { verifier, binder }
    }
}

#[async_trait]
impl AuthenticationStep for StructuredTokenStep {
    fn name(&self) -> &'static str {
        "structured"
    }

    async fn authenticate(&self, context: &AuthContext) -> Result<StepOutcome, Error> {
        let Some(token) = context.pending(CredentialKind::Structured) else {
            return Ok(StepOutcome::Pass);
        };

        let claims = match self.verifier.verify(token).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("Structured token verification failed: {}", e);
                return Ok(StepOutcome::Reject);
            }
        };

        tracing::debug!(
            issuer = %claims.issuer,
            expiry = %claims.expiry,
            "Structured token verified"
        );

        let user = self.binder.bind_or_create(&claims.subject_email).await?;

        Ok(StepOutcome::Bound {
            principal: Principal::new(user),
            consume_credential: false,
        })
    }
}

/// Runs the configured steps in order until one of them binds a principal or
/// rejects the credential.
pub(crate) struct AuthPipeline {
    steps: Vec<Box<dyn AuthenticationStep>>,
}

impl std::fmt::Debug for AuthPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|step| step.name()))
            .finish()
    }
}

impl AuthPipeline {
    pub(crate) fn new(steps: Vec<Box<dyn AuthenticationStep>>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::NoAuthSteps);
        }

        Ok(Self { steps })
    }

    pub(crate) fn from_kinds(
        kinds: &[StepKind],
        verifier: Arc<TokenVerifier>,
        resolver: EmailResolver,
        binder: IdentityBinder,
    ) -> Result<Self, ConfigError> {
        let steps = kinds
            .iter()
            .map(|kind| -> Box<dyn AuthenticationStep> {
                match kind {
                    StepKind::Opaque => {
                        Box::new(OpaqueTokenStep::new(resolver.clone(), binder.clone()))
                    }
                    StepKind::Structured => {
                        Box::new(StructuredTokenStep::new(verifier.clone(), binder.clone()))
                    }
                }
            })
            .collect();

        Self::new(steps)
    }

    pub(crate) async fn run(&self, credential: Credential) -> Result<AuthContext, Error> {
        let mut context = AuthContext::new(credential);

        if context.credential().kind() == CredentialKind::Absent {
            return Ok(context);
        }

        for step in &self.steps {
            if context.principal.is_some() {
                break;
            }

            match step.authenticate(&context).await? {
                StepOutcome::Pass => {}
                StepOutcome::Reject => {
                    tracing::debug!(step = step.name(), "Credential rejected");
                    break;
                }
                StepOutcome::Bound {
                    principal,
                    consume_credential,
                } => {
                    tracing::debug!(
                        step = step.name(),
                        user_id = principal.local_user_id(),
                        "Principal bound"
                    );
                    context.consumed |= consume_credential;
                    context.principal.get_or_insert(principal);
                }
            }
        }

        Ok(context)
    }

    pub(crate) async fn resolve(&self, credential: Credential) -> Result<Option<Principal>, Error> {
        Ok(self.run(credential).await?.into_principal())
    }
}

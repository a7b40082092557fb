use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::{body::Body, http::Response, middleware::Next};

use crate::auth::credential::Credential;
use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::user::Principal;

/// Resolves the caller for every request. A rejected or missing credential
/// leaves the request unauthenticated; only handlers that extract a
/// [`Principal`] turn that into a 401.
pub(crate) async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response<Body>, Error> {
    let credential = Credential::from_headers(request.headers());

    let principal = state.pipeline.resolve(credential).await?;

    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Option<Principal>>()
            .cloned()
            .flatten()
            .ok_or(Error::NotAuthenticated)
    }
}

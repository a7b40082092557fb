use axum::Json;
use axum::extract::State;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::response;
use crate::types::user::{Principal, Role};

/// Exchanges whatever credential authenticated this request for a token
/// signed by this service.
pub(crate) async fn token(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<response::Token>, Error> {
    let principal = principal.require(Role::User)?;

    let token = state.verifier.issue(principal.user())?;

    Ok(Json(response::Token::new(token)))
}

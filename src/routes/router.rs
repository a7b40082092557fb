use crate::core::config::Args;
use crate::core::error;
use crate::core::state::AppState;
use crate::routes::{auth, user};
use crate::utils;
use axum::error_handling::HandleErrorLayer;
use axum::{
    extract::{MatchedPath, Request},
    http::{Method, header},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};
use tracing::info_span;

pub(crate) fn routes(state: AppState, args: &Args) -> Router {
    // /api/v1/users/...
    let user_router = Router::new().route("/", get(user::get).patch(user::patch).delete(user::delete));

    // /api/v1/auth/...
    let auth_router = Router::new().route("/token", post(auth::token));

    Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api/v1/users", user_router)
        .nest("/api/v1/auth", auth_router)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            utils::auth::authenticate,
        ))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                        let matched_path = request
                            .extensions()
                            .get::<MatchedPath>()
                            .map(MatchedPath::as_str);

                        info_span!(
                            "request",
                            method = ?request.method(),
                            matched_path,
                        )
                    }),
                )
                .layer(HandleErrorLayer::new(error::handle_middleware_errors))
                .timeout(Duration::from_secs(args.request_timeout_secs))
                .buffer(128)
                .rate_limit(args.rate_limit_per_second, Duration::from_secs(1))
                .layer(
                    CorsLayer::new()
                        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                        .allow_origin(cors::Any),
                ),
        )
}

use axum::BoxError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database migration error: {0}")]
    DatabaseMigration(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Reqwest error: {0}")]
    HTTPClient(#[from] reqwest::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("No authentication steps configured")]
    NoAuthSteps,
    #[error("Identity timeout ({identity}s) must be shorter than the request timeout ({request}s)")]
    Timeouts { identity: u64, request: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Forbidden")]
    Forbidden,
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("User not found")]
    UserNotFound,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::NotAuthenticated | Error::Forbidden | Error::Validation(_) => {
                tracing::debug!("{:?}", self)
            }
            _ => tracing::error!("{:?}", self),
        }

        let (status, message) = match self {
            Error::Sql(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SQL error".to_owned()),
            Error::Jwt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "JWT error".to_owned()),
            Error::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated".to_owned()),
            Error::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_owned()),
            Error::UserAlreadyExists => (StatusCode::CONFLICT, "User already exists".to_owned()),
            Error::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_owned()),
            Error::Validation(message) => (StatusCode::BAD_REQUEST, message),
            Error::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_owned(),
            ),
        };

        (status, message).into_response()
    }
}

pub(crate) async fn handle_middleware_errors(err: BoxError) -> (StatusCode, &'static str) {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request exceeded its deadline");
        return (StatusCode::REQUEST_TIMEOUT, "Request timed out");
    }

    tracing::error!("Unhandled error: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

pub(crate) mod auth;
pub(crate) mod controllers;
pub(crate) mod core;
pub(crate) mod routes;
pub(crate) mod types;
pub(crate) mod utils;

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::error::ConfigError as Error;
use crate::core::store::PgUserStore;
use crate::core::{config::Args, state::AppState};

pub async fn run() -> Result<(), Error> {
    let args = Args::load()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&args.log_level).unwrap_or_default())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = PgUserStore::connect(&args.database_url()).await?;

    sqlx::migrate!()
        .run(store.pool())
        .await
        .map_err(Error::DatabaseMigration)?;

    let state = AppState::new(&args, Arc::new(store))?;

    let app = routes::router::routes(state, &args);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .map_err(Error::IO)?;

    tracing::debug!("listening on port {}", args.port);

    axum::serve(listener, app).await.map_err(Error::IO)?;

    Ok(())
}

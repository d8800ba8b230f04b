use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use venue_console::{
    AppState, IdTokenAuthProvider, MockProfileStore,
    auth::AuthProviderState,
    config::{AppConfig, Env, ProfileStoreKind},
    create_router,
    repository::{PostgresProfileStore, ProfileStoreState, RestProfileStore},
};

/// main
///
/// Loads configuration, initializes logging, connects the profile store,
/// attaches the session to the auth provider and serves the console API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production settings)
    dotenv::dotenv().ok();
    let config = AppConfig::load().expect("FATAL: invalid configuration");

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "venue_console=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Venue console starting in {:?} mode", config.env);

    // 3. Profile store
    let store: ProfileStoreState = match &config.profile_store {
        ProfileStoreKind::Postgres { db_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            Arc::new(PostgresProfileStore::new(pool))
        }
        ProfileStoreKind::Rest { base_url, api_key } => {
            Arc::new(RestProfileStore::new(base_url, api_key))
        }
        ProfileStoreKind::Memory => {
            tracing::warn!("Using the in-memory profile store; every account gets default access");
            Arc::new(MockProfileStore::new())
        }
    };

    // 4. Auth provider and session
    let auth: AuthProviderState =
        Arc::new(IdTokenAuthProvider::new(&config.jwt_secret, config.env.clone()));
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config, store, auth);

    // A failed subscription leaves the session loading; the guard then
    // answers 503 instead of deciding anything.
    let _subscription = match app_state.start_session().await {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = %e, "Auth subscription failed; console will stay unavailable");
            None
        }
    };

    // 5. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
    }
}

mod sweeper;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::messages;
use parley_api::middleware::require_auth;
use parley_api::presence;
use parley_db::Database;
use parley_relay::connection;
use parley_relay::hub::Relay;

#[derive(Clone)]
struct ServerState {
    db: Arc<Database>,
    relay: Relay,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    // Lease TTL: three missed 30-second renewals
    let presence_ttl_secs: u64 = std::env::var("PARLEY_PRESENCE_TTL_SECS")
        .unwrap_or_else(|_| "90".into())
        .parse()?;
    let sweep_interval_secs: u64 = std::env::var("PARLEY_SWEEP_INTERVAL_SECS")
        .unwrap_or_else(|_| "30".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let relay = Relay::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        db: db.clone(),
        relay,
        jwt_secret,
    };

    // Expire presence left behind by clients that never said goodbye
    tokio::spawn(sweeper::run_presence_sweep(
        db,
        sweep_interval_secs,
        presence_ttl_secs,
    ));

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/auth/validate", post(auth::validate))
        .route("/auth/logout", post(auth::logout))
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route("/users", get(presence::list_users))
        .route("/presence/offline", post(presence::set_offline))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/relay", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.relay, state.db, state.jwt_secret)
    })
}

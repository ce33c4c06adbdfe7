use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use matchday_api::auth::{self, AppState, AppStateInner};
use matchday_api::middleware::require_auth;
use matchday_api::{matches, notifications, players, settings, teams};
use matchday_crypto::FieldCipher;
use matchday_notify::{
    ExpoPush, ReminderEngine, ScanWindow, Scheduler, SmtpEmail,
    channel::{EmailSender, SmtpConfig},
};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchday=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("MATCHDAY_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: MATCHDAY_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db_path = std::env::var("MATCHDAY_DB_PATH").unwrap_or_else(|_| "matchday.db".into());
    let host = std::env::var("MATCHDAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("MATCHDAY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let scan_interval_secs: u64 = std::env::var("MATCHDAY_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);
    let window_low: i64 = std::env::var("MATCHDAY_WINDOW_LOW_MINUTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let window_high: i64 = std::env::var("MATCHDAY_WINDOW_HIGH_MINUTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(15);

    // The field cipher refuses to start without its secret; there is no
    // fallback key.
    let cipher = FieldCipher::from_env()?;

    // Init database
    let db = Arc::new(matchday_db::Database::open(&PathBuf::from(&db_path))?);

    // Channel senders. Email is optional per deployment; an unconfigured
    // SMTP host leaves that channel permanently failing-closed.
    let push = Arc::new(ExpoPush::new());
    let email: Arc<dyn EmailSender> = match SmtpConfig::from_env() {
        Some(config) => {
            info!("Email channel configured via {}", config.host);
            Arc::new(SmtpEmail::new(config))
        }
        None => {
            info!("MATCHDAY_SMTP_HOST unset; email reminders disabled");
            Arc::new(NoEmail)
        }
    };

    // Reminder engine + scheduler
    let engine = Arc::new(ReminderEngine::new(
        db.clone(),
        cipher.clone(),
        push,
        email,
        ScanWindow::new(window_low, window_high),
    ));
    let scheduler = Scheduler::start(engine.clone(), Duration::from_secs(scan_interval_secs));
    info!(
        "Reminder scheduler running every {}s over a [{}, {}] minute window",
        scan_interval_secs, window_low, window_high
    );

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        cipher,
        jwt_secret,
        engine,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/teams", get(teams::list_teams).post(teams::create_team))
        .route(
            "/teams/{team_id}",
            get(teams::get_team)
                .put(teams::update_team)
                .delete(teams::delete_team),
        )
        .route(
            "/teams/{team_id}/players",
            get(players::list_players).post(players::create_player),
        )
        .route(
            "/players/{player_id}",
            put(players::update_player).delete(players::delete_player),
        )
        .route(
            "/matches",
            get(matches::list_matches).post(matches::create_match),
        )
        .route(
            "/matches/{match_id}",
            get(matches::get_match)
                .put(matches::update_match)
                .delete(matches::delete_match),
        )
        .route(
            "/settings/notifications",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/notifications/run", post(notifications::run_scan))
        .layer(middleware::from_fn(require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Matchday server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cancel future ticks; an in-flight scan still completes.
    scheduler.stop().await;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Stand-in email sender for deployments without SMTP configured.
struct NoEmail;

#[async_trait::async_trait]
impl EmailSender for NoEmail {
    async fn send(
        &self,
        _to: &str,
        _subject: &str,
        _text: &str,
        _html: &str,
    ) -> Result<matchday_notify::channel::EmailReceipt, matchday_notify::ChannelError> {
        Err(matchday_notify::ChannelError::Build(
            "email channel not configured".into(),
        ))
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

//! Web layer
//!
//! JSON API over the automation facade. Handlers are thin: they extract the
//! request, call [`AutomationService`] and wrap the result in the standard
//! [`ApiResponse`] envelope.

use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::automation::AutomationService;
use crate::config::WebConfig;
use crate::database::Database;

pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, handle_error, handle_result};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub automation: Arc<AutomationService>,
    /// Application start time for uptime calculation
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(database: Database, automation: Arc<AutomationService>) -> Self {
        Self {
            database,
            automation,
            start_time: Utc::now(),
        }
    }
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &WebConfig, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    /// Serve until `cancellation_token` fires, then finish in-flight requests
    pub async fn serve(self, cancellation_token: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.addr, e))?;
        info!("Web server listening on http://{}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                cancellation_token.cancelled().await;
                info!("Web server received cancellation signal, shutting down gracefully");
            })
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Create the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        // Middleware (applied in reverse order)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    use handlers::{automation, lifecycle, overrides, scheduling};

    Router::new()
        // Pipeline configuration
        .route(
            "/automation/pipeline",
            get(automation::get_pipeline).put(automation::update_pipeline),
        )
        .route(
            "/automation/queue/limits",
            get(automation::get_queue_limits).put(automation::update_queue_limits),
        )
        .route(
            "/automation/concurrency",
            get(automation::get_concurrency).put(automation::update_concurrency),
        )
        .route(
            "/automation/schedule",
            get(automation::get_schedule).put(automation::update_schedule),
        )
        // Triggers and queue
        .route("/automation/global-action", post(automation::trigger_global_action))
        .route("/automation/discover", post(automation::discover_streams))
        .route("/automation/channels/{id}/check", post(automation::check_channel))
        .route(
            "/automation/queue",
            get(automation::list_queue)
                .post(automation::enqueue_channels)
                .delete(automation::clear_queue),
        )
        .route("/automation/status", get(automation::get_status))
        .route("/automation/changelog", get(automation::recent_changelog))
        // Overrides
        .route(
            "/automation/channels/{id}/settings",
            get(overrides::get_channel_settings).put(overrides::set_channel_override),
        )
        .route(
            "/automation/groups/{id}/settings",
            get(overrides::get_group_override).put(overrides::set_group_override),
        )
        // Scheduled events and auto-create rules
        .route(
            "/automation/events",
            get(scheduling::list_events).post(scheduling::create_event),
        )
        .route("/automation/events/{id}", delete(scheduling::delete_event))
        .route(
            "/automation/rules",
            get(scheduling::list_rules).post(scheduling::create_rule),
        )
        .route("/automation/rules/test", post(scheduling::test_rule))
        .route("/automation/rules/regenerate", post(scheduling::regenerate_rules))
        .route(
            "/automation/rules/{id}",
            get(scheduling::get_rule)
                .put(scheduling::update_rule)
                .delete(scheduling::delete_rule),
        )
        // Dead-stream lifecycle and profiles
        .route(
            "/dead-streams/config",
            get(lifecycle::get_config).put(lifecycle::update_config),
        )
        .route("/dead-streams/disable-empty", post(lifecycle::disable_empty_channels))
        .route("/dead-streams/records", get(lifecycle::list_records))
        .route("/profiles", get(lifecycle::list_profiles))
        .route("/profiles/snapshots", get(lifecycle::list_snapshots))
        .route(
            "/profiles/{id}/snapshot",
            get(lifecycle::get_snapshot)
                .post(lifecycle::capture_snapshot)
                .delete(lifecycle::delete_snapshot),
        )
}


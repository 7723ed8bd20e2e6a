mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod notify;
mod pipeline;
mod realtime;
mod status;
mod store;
mod transitions;
mod webhook_handler;
mod webhook_models;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::notify::N8nNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exxacta_pipeline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Outbound n8n client, when a webhook URL is configured
    let notifier = match N8nNotifier::from_config(&config) {
        Ok(Some(n)) => {
            tracing::info!("n8n notifier initialized");
            Some(n)
        }
        Ok(None) => {
            tracing::info!("N8N_WEBHOOK_URL not set; outbound notifications disabled");
            None
        }
        Err(e) => {
            tracing::error!("Failed to initialize n8n notifier: {}", e);
            None
        }
    };

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        notifier,
    });

    // Rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Protected routes behind the rate limiter and body-size limit
    let protected_routes = Router::new()
        // Leads
        .route("/api/leads", get(handlers::list_leads))
        .route("/api/leads", post(handlers::create_lead))
        .route("/api/leads/status", post(handlers::set_lead_status))
        .route("/api/leads/:id", get(handlers::get_lead))
        .route("/api/leads/:id", put(handlers::update_lead))
        .route("/api/leads/:id", delete(handlers::delete_lead))
        .route(
            "/api/leads/:id/interacoes",
            get(handlers::list_lead_interacoes),
        )
        // Interacoes
        .route("/api/interacoes", post(handlers::create_interacao))
        .route("/api/interacoes/:id", put(handlers::update_interacao))
        .route("/api/interacoes/:id", delete(handlers::delete_interacao))
        // Empresas
        .route("/api/empresas", get(handlers::list_empresas))
        .route("/api/empresas", post(handlers::create_empresa))
        .route("/api/empresas/:id", put(handlers::update_empresa))
        .route("/api/empresas/:id", delete(handlers::delete_empresa))
        // Pipeline view
        .route("/api/pipeline", get(handlers::pipeline_view))
        // n8n automation webhooks
        .route(
            "/api/webhooks/n8n/lead-created",
            post(webhook_handler::lead_created),
        )
        .route(
            "/api/webhooks/n8n/lead-followup",
            post(webhook_handler::lead_followup),
        )
        .route(
            "/api/webhooks/n8n/lead-responded",
            post(webhook_handler::lead_responded),
        )
        .route(
            "/api/webhooks/n8n/lead-negociation",
            post(webhook_handler::lead_negotiation),
        )
        .route(
            "/api/webhooks/n8n/lead-lost",
            post(webhook_handler::lead_lost),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 2MB max payload
                .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting so orchestrator probes never 429
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

//! assistant-server
//!
//! Axum server exposing the portfolio assistant over a JSON API.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_core::LlmProvider;
use assistant_runtime::OpenAiProvider;
use portfolio_advisor::exchange::{AlpacaClient, AlpacaConnector, MarketDataClient, MockMarketData};
use portfolio_advisor::{AdvisorConfig, AlpacaConfig, Assistant, MemoryUserStore, UserStore};

use crate::config::ServerConfig;
use crate::handlers::{
    chat_handler, clear_chat, end_conversation, health_check, portfolio_performance,
};
use crate::state::{AppState, SessionMap};

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/clear", post(clear_chat))
        .route("/api/chat/{conversation_id}", delete(end_conversation))
        .route("/api/portfolio/performance", post(portfolio_performance))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// `LLM_PROVIDER=ollama` selects the native Ollama client when built with
/// the `ollama` feature
fn llm_provider() -> anyhow::Result<Arc<dyn LlmProvider>> {
    #[cfg(feature = "ollama")]
    if std::env::var("LLM_PROVIDER").is_ok_and(|p| p.eq_ignore_ascii_case("ollama")) {
        return Ok(Arc::new(assistant_runtime::ollama::OllamaProvider::from_env()));
    }
    Ok(Arc::new(OpenAiProvider::from_env()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let server = ServerConfig::from_env()?;
    let alpaca = AlpacaConfig::from_env();
    let advisor = AdvisorConfig::from_env();

    let provider = llm_provider()?;
    match provider.health_check().await {
        Ok(true) => tracing::info!(provider = provider.name(), "✓ LLM provider reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ LLM provider not reachable - chat turns will fail");
            tracing::warn!("  Check LLM_BASE_URL and LLM_API_KEY");
        }
    }

    let (market, market_data_live): (Arc<dyn MarketDataClient>, bool) =
        match AlpacaClient::service(&alpaca)? {
            Some(client) => {
                tracing::info!("✓ Alpaca market data configured");
                (Arc::new(client), true)
            }
            None => {
                tracing::warn!("⚠ No service Alpaca credentials - using mock market data");
                tracing::warn!("  Set ALPACA_API_KEY and ALPACA_SECRET_KEY in .env");
                (Arc::new(MockMarketData::new()), false)
            }
        };

    let user_store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
    let assistant = Assistant::new(
        provider.clone(),
        Arc::new(AlpacaConnector::new(alpaca)),
        market,
        user_store.clone(),
        advisor,
    )?;

    let state = AppState {
        assistant: Arc::new(assistant),
        provider,
        user_store,
        sessions: SessionMap::new(server.max_sessions, server.session_idle),
        market_data_live,
    };

    let listener = tokio::net::TcpListener::bind(server.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("assistant-server running on http://{}", server.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                    - Health check");
    tracing::info!("  POST /api/chat                  - Send message");
    tracing::info!("  POST /api/chat/clear            - Clear a conversation");
    tracing::info!("  DELETE /api/chat/{{id}}           - End a conversation");
    tracing::info!("  POST /api/portfolio/performance - Performance report");

    axum::serve(listener, app(state)).await?;

    Ok(())
}

// src/main.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod errors;
mod htmx_handlers;
mod items_api;
mod listing;
mod models;
mod preview;
mod response;
mod state;
#[cfg(test)]
mod test_support;

use crate::htmx_handlers::*;
use crate::state::{ApiConfig, AppState, ServerConfig};

pub fn build_router(app_state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(mount_listing_handler))
        .route(
            "/htmx/listing/{draft_id}/field",
            post(change_field_htmx_handler),
        )
        .route(
            "/htmx/listing/{draft_id}/image",
            post(change_image_htmx_handler),
        )
        .route(
            "/htmx/listing/{draft_id}/submit",
            post(submit_listing_htmx_handler),
        )
        .route("/htmx/items", get(list_items_htmx_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listing_form=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Inicjalizacja serwera formularza...");

    let api_config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Błędna konfiguracja API: {}", err);
            std::process::exit(1);
        }
    };
    let server_config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Błędna konfiguracja serwera: {}", err);
            std::process::exit(1);
        }
    };
    tracing::info!("Backend ogłoszeń: {}", api_config.base_url());

    let app_state = AppState::new(api_config, server_config.draft_idle);
    let app = build_router(app_state, server_config.max_upload_bytes);

    let addr = server_config.listen_addr;
    tracing::info!("Serwer nasłuchuje na {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Nie można powiązać adresu {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        tracing::error!("Błąd serwera: {}", e);
    }
}

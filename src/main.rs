//! # Whisper Gateway - Main Application Entry Point
//!
//! A local transcription gateway: audio comes in over HTTP, runs through a
//! single Whisper model, optionally gets a cleanup pass from a remote LLM,
//! and structured results go back out.
//!
//! ## Application Architecture:
//! - **config**: configuration loading (TOML file + environment variables)
//! - **state**: shared state handed to request handlers
//! - **device**: compute device and precision selection
//! - **audio**: payload decoding and voice-activity detection
//! - **transcription**: the Whisper model, the inference adapter, and the
//!   orchestrator with its single inference gate
//! - **cleanup**: best-effort LLM text cleanup client
//! - **handlers / health**: the HTTP surface
//! - **middleware**: request logging
//!
//! Startup order matters: configuration is validated first, then the model
//! is loaded (with its one-time CPU fallback) before the listener binds, so
//! a served request never observes a half-initialized engine.

mod audio;
mod cleanup;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::TranscriptionService;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting whisper-gateway v{}", env!("CARGO_PKG_VERSION"));

    let cleaner = cleanup::cleaner_from_config(&config.cleanup);
    let service = Arc::new(TranscriptionService::new(&config, cleaner));

    // Load the model before accepting traffic. Only a failed CPU fallback
    // aborts startup; everything after this point answers per-request.
    service.load_model().await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let max_audio_bytes = config.limits.max_audio_bytes;
    let app_state = AppState::new(config, service);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::PayloadConfig::new(max_audio_bytes))
            .wrap(cors_policy())
            .wrap(middleware::RequestLogging)
            .route("/health", web::get().to(health::health_check))
            .route("/transcribe", web::post().to(handlers::transcribe))
            .default_service(web::route().to(handlers::fallback))
    })
    .bind(&bind_addr)?
    .run();

    info!("Transcription gateway listening at http://{}", bind_addr);
    info!("  POST /transcribe - submit audio for transcription");
    info!("  GET  /health     - service status");

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// CORS policy for the whole surface: any origin may call the gateway with
/// the two custom metadata headers over GET/POST/OPTIONS.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            "Content-Type",
            handlers::transcribe::API_KEY_HEADER,
            handlers::transcribe::ENABLE_CLEANUP_HEADER,
        ])
        .max_age(3600)
}

/// Initialize the tracing (logging) system. `RUST_LOG` overrides the default
/// filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_gateway=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolve when the process is asked to stop (SIGINT or SIGTERM).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}

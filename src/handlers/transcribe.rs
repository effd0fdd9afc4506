//! # Transcription Endpoint
//!
//! `POST /transcribe`: the request body is the complete audio payload;
//! options ride along as a query parameter and two custom headers:
//!
//! - `?language=<code>`: language hint, defaults to `en`; an empty value
//!   requests auto-detection
//! - `X-Ollama-Api-Key`: per-request cleanup credential
//! - `X-Enable-Cleanup`: `0` disables the cleanup pass for this request
//!   (enabled by default)
//!
//! The fallback handler answers everything that matches no route: empty
//! success for CORS pre-flights, a JSON not-found error otherwise.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::{Segment, TranscriptionOptions, TranscriptionOutcome};
use actix_web::{http::Method, web, HttpRequest, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

pub const API_KEY_HEADER: &str = "X-Ollama-Api-Key";
pub const ENABLE_CLEANUP_HEADER: &str = "X-Enable-Cleanup";

#[derive(Debug, Deserialize)]
pub struct TranscribeQuery {
    language: Option<String>,
}

/// Success body of a transcription request.
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub success: bool,
    /// Cleaned text for display
    pub text: String,
    /// Original transcription
    pub raw_text: String,
    pub segments: Vec<Segment>,
    pub language: String,
    pub language_probability: f32,
    /// Whether the cleanup pass changed the text
    pub llm_cleaned: bool,
}

impl From<TranscriptionOutcome> for TranscribeResponse {
    fn from(outcome: TranscriptionOutcome) -> Self {
        Self {
            success: true,
            text: outcome.text,
            raw_text: outcome.raw_text,
            segments: outcome.segments,
            language: outcome.language,
            language_probability: outcome.language_probability,
            llm_cleaned: outcome.llm_cleaned,
        }
    }
}

pub async fn transcribe(
    req: HttpRequest,
    query: web::Query<TranscribeQuery>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let language_hint = match query.into_inner().language.as_deref() {
        // Missing parameter keeps the common default; an explicitly empty
        // value asks for auto-detection.
        None => Some("en".to_string()),
        Some("") => None,
        Some(code) => Some(code.to_string()),
    };

    let credential = header_value(&req, API_KEY_HEADER).filter(|v| !v.is_empty());

    let cleanup_requested = header_value(&req, ENABLE_CLEANUP_HEADER)
        .map(|v| v != "0")
        .unwrap_or(true);

    let options = TranscriptionOptions {
        language_hint,
        cleanup_enabled: cleanup_requested && state.config.cleanup.enabled,
        credential,
    };

    let outcome = state.service.transcribe(&body, options).await?;
    Ok(HttpResponse::Ok().json(TranscribeResponse::from(outcome)))
}

/// Catch-all for unknown paths. Pre-flight requests get an empty success
/// response even outside the CORS handshake; everything else is a JSON 404.
pub async fn fallback(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        HttpResponse::Ok().finish()
    } else {
        AppError::NotFound.error_response()
    }
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::PassthroughCleaner;
    use crate::config::AppConfig;
    use crate::transcription::TranscriptionService;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn unloaded_state() -> AppState {
        let config = AppConfig::default();
        let service = Arc::new(TranscriptionService::new(&config, Arc::new(PassthroughCleaner)));
        AppState::new(config, service)
    }

    macro_rules! gateway_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .wrap(crate::cors_policy())
                    .route("/transcribe", web::post().to(transcribe))
                    .default_service(web::route().to(fallback)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_transcribe_before_model_load_is_server_error() {
        let app = gateway_app!(unloaded_state());

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .set_payload(vec![0u8; 64])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let message = body["error"].as_str().expect("error message");
        assert!(!message.is_empty());
    }

    #[actix_web::test]
    async fn test_unknown_path_is_json_not_found() {
        let app = gateway_app!(unloaded_state());

        let resp = test::call_service(&app, test::TestRequest::get().uri("/nope").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Not found");
    }

    #[actix_web::test]
    async fn test_options_preflight_is_empty_success_with_cors() {
        let app = gateway_app!(unloaded_state());

        let req = test::TestRequest::with_uri("/transcribe")
            .method(Method::OPTIONS)
            .insert_header(("Origin", "http://localhost:3000"))
            .insert_header(("Access-Control-Request-Method", "POST"))
            .insert_header(("Access-Control-Request-Headers", "x-ollama-api-key,x-enable-cleanup"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(resp.headers().contains_key("access-control-allow-origin"));

        let body = test::read_body(resp).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn test_options_to_unknown_path_is_empty_success() {
        let app = gateway_app!(unloaded_state());

        let req = test::TestRequest::with_uri("/anything")
            .method(Method::OPTIONS)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        assert!(body.is_empty());
    }
}

//! Health endpoint: reports the configured model tier, the device the model
//! landed on, and whether it is ready to serve. Reads a status snapshot, so
//! it responds even while a transcription holds the inference gate.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let status = state.service.status();

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model": status.model,
        "device": status.device,
        "ready": status.ready
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::PassthroughCleaner;
    use crate::config::AppConfig;
    use crate::transcription::TranscriptionService;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn unloaded_state() -> AppState {
        let config = AppConfig::default();
        let service = Arc::new(TranscriptionService::new(&config, Arc::new(PassthroughCleaner)));
        AppState::new(config, service)
    }

    #[actix_web::test]
    async fn test_health_before_model_load() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unloaded_state()))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ready"], false);
        assert_eq!(body["model"], "tiny");
        assert!(body["device"].is_string());
    }
}

//! # Transcription Orchestrator
//!
//! Composes the inference engine and the cleanup client into the two-stage
//! pipeline behind the gateway: decode, gated inference, raw text assembly,
//! best-effort cleanup, and the final structured result.
//!
//! ## Concurrency:
//! The engine sits behind a `tokio::sync::Mutex` that is held only for the
//! duration of the inference call; payload decoding happens before the gate
//! and cleanup happens after it, so concurrent requests overlap everywhere
//! except inside the model. Readiness and device info live in a separate
//! snapshot so `/health` never waits on the gate.

use crate::cleanup::TextCleaner;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::transcription::engine::{InferenceEngine, Segment};
use crate::transcription::model::ModelSize;
use anyhow::Result;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::info;

/// Per-request knobs carried from the gateway.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionOptions {
    /// Target language; `None` means auto-detect
    pub language_hint: Option<String>,
    /// Whether this request wants the LLM cleanup pass
    pub cleanup_enabled: bool,
    /// Per-request cleanup credential, overriding the configured default
    pub credential: Option<String>,
}

/// The assembled result of one transcription request.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    /// Cleaned text (equals `raw_text` when cleanup didn't run or didn't change anything)
    pub text: String,
    /// Exact in-order concatenation of segment texts
    pub raw_text: String,
    pub segments: Vec<Segment>,
    pub language: String,
    pub language_probability: f32,
    /// Whether the cleanup pass altered the text
    pub llm_cleaned: bool,
}

/// Snapshot of the model handle's externally visible state.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub model: String,
    pub device: String,
    pub compute_type: String,
    pub ready: bool,
}

/// Process-wide transcription service, constructed exactly once at startup
/// and shared with every request handler.
pub struct TranscriptionService {
    engine: Mutex<InferenceEngine>,
    cleaner: Arc<dyn TextCleaner>,
    status: RwLock<EngineStatus>,
    model_size: ModelSize,
    device_preference: crate::device::DevicePreference,
    compute_type: crate::device::ComputeType,
}

impl TranscriptionService {
    /// Build the service in its unloaded state. Callers must have validated
    /// the configuration, so the model fields parse.
    pub fn new(config: &AppConfig, cleaner: Arc<dyn TextCleaner>) -> Self {
        let model_size = config
            .model
            .size
            .parse::<ModelSize>()
            .unwrap_or(ModelSize::Tiny);
        let device_preference = config.model.device.parse().unwrap_or_default();
        let compute_type = config.model.compute_type.parse().unwrap_or_default();

        Self {
            engine: Mutex::new(InferenceEngine::new(Default::default())),
            cleaner,
            status: RwLock::new(EngineStatus {
                model: model_size.to_string(),
                device: config.model.device.clone(),
                compute_type: config.model.compute_type.clone(),
                ready: false,
            }),
            model_size,
            device_preference,
            compute_type,
        }
    }

    /// Load the model once at startup. On success the readiness snapshot
    /// flips and reflects the device the model actually landed on.
    pub async fn load_model(&self) -> Result<()> {
        let descriptor = {
            let mut engine = self.engine.lock().await;
            engine
                .load(self.model_size, self.device_preference, self.compute_type)
                .await?
        };

        {
            let mut status = self.status.write().unwrap();
            status.device = descriptor.device.to_string();
            status.compute_type = descriptor.compute_type.to_string();
            status.ready = true;
        }

        info!(
            "Model '{}' ready on {} ({})",
            self.model_size, descriptor.device, descriptor.compute_type
        );
        Ok(())
    }

    /// Current externally visible model state, without touching the gate.
    pub fn status(&self) -> EngineStatus {
        self.status.read().unwrap().clone()
    }

    /// Run one request through the full pipeline.
    ///
    /// Every well-formed request gets a response: inference failures come
    /// back as errors, cleanup failures silently degrade to raw text inside
    /// the cleaner.
    pub async fn transcribe(&self, audio: &[u8], options: TranscriptionOptions) -> AppResult<TranscriptionOutcome> {
        if !self.status().ready {
            return Err(AppError::ModelNotReady);
        }

        // Decode outside the gate; parsing must not serialize requests.
        let samples = crate::audio::decode_audio(audio).map_err(AppError::DecodeFailure)?;

        let output = {
            let mut engine = self.engine.lock().await;
            engine.transcribe(&samples, options.language_hint.as_deref())?
        };

        let raw_text = join_segments(&output.segments);

        // Cleanup runs outside the gate; the cleaner absorbs its own failures.
        let text = if options.cleanup_enabled {
            self.cleaner
                .cleanup(&raw_text, options.credential.as_deref())
                .await
        } else {
            raw_text.clone()
        };

        let llm_cleaned = text != raw_text;

        Ok(TranscriptionOutcome {
            text,
            raw_text,
            segments: output.segments,
            language: output.language,
            language_probability: output.language_probability,
            llm_cleaned,
        })
    }
}

/// Raw text is the exact in-order concatenation of segment texts, with no
/// inserted separators.
fn join_segments(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::PassthroughCleaner;

    fn unloaded_service() -> TranscriptionService {
        TranscriptionService::new(&AppConfig::default(), Arc::new(PassthroughCleaner))
    }

    #[test]
    fn test_status_starts_not_ready() {
        let service = unloaded_service();
        let status = service.status();
        assert!(!status.ready);
        assert_eq!(status.model, "tiny");
    }

    #[tokio::test]
    async fn test_transcribe_before_load_is_model_not_ready() {
        let service = unloaded_service();
        let result = service.transcribe(b"RIFF....WAVE", TranscriptionOptions::default()).await;
        assert!(matches!(result, Err(AppError::ModelNotReady)));
    }

    #[test]
    fn test_join_segments_is_exact_concatenation() {
        let segments = vec![
            Segment { start: 0.0, end: 1.2, text: " Hello there.".to_string() },
            Segment { start: 1.2, end: 2.0, text: " How are you?".to_string() },
        ];
        assert_eq!(join_segments(&segments), " Hello there. How are you?");
        assert!(join_segments(&[]).is_empty());
    }
}

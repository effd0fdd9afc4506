//! # Inference Engine Adapter
//!
//! Owns the single loaded Whisper model and turns a decoded clip into
//! time-aligned segments.
//!
//! ## Load policy:
//! The preferred device and precision are tried first. Any initialization
//! failure falls back exactly once to the guaranteed-available combination
//! (CPU, float32) with a logged warning; only a failure of that fallback is
//! fatal to startup.
//!
//! ## Transcription:
//! Voice-activity detection splits the clip into voiced spans so silence is
//! never decoded; spans longer than the model's 30-second window are chunked
//! at window boundaries. Decoding is greedy throughout.

use crate::audio::{detect_voiced_spans, VadConfig, VoicedSpan};
use crate::device::{ComputeType, DeviceManager, DevicePreference};
use crate::error::{AppError, AppResult};
use crate::transcription::model::{ModelSize, WhisperModel, CHUNK_SAMPLES, SAMPLE_RATE};
use anyhow::{anyhow, Result};
use candle_core::{DType, Device};
use serde::Serialize;
use tracing::{info, warn};

/// One time-aligned span of recognized speech.
#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    /// Recognized text, verbatim as decoded
    pub text: String,
}

/// What a successful inference run produces.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub segments: Vec<Segment>,
    pub language: String,
    pub language_probability: f32,
}

/// Device and precision the model actually ended up on.
#[derive(Debug, Clone, Copy)]
pub struct EngineDescriptor {
    pub device: &'static str,
    pub compute_type: &'static str,
}

/// Adapter around the loaded model. Not internally synchronized; the
/// orchestrator serializes access through its inference gate.
pub struct InferenceEngine {
    model: Option<WhisperModel>,
    vad: VadConfig,
}

impl InferenceEngine {
    pub fn new(vad: VadConfig) -> Self {
        Self { model: None, vad }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Load the model, applying the single-fallback device policy.
    pub async fn load(
        &mut self,
        size: ModelSize,
        preference: DevicePreference,
        compute: ComputeType,
    ) -> Result<EngineDescriptor> {
        match Self::try_load(size, preference, compute).await {
            Ok(model) => {
                let descriptor = EngineDescriptor {
                    device: DeviceManager::device_label(model.device()),
                    compute_type: compute.label(),
                };
                self.model = Some(model);
                Ok(descriptor)
            }
            Err(e) => {
                if preference == DevicePreference::Cpu && compute == ComputeType::Float32 {
                    // Already the guaranteed-available combination.
                    return Err(e);
                }

                warn!("Model load failed, falling back to CPU/float32: {}", e);
                let model = WhisperModel::load(size, Device::Cpu, DType::F32).await?;
                self.model = Some(model);
                Ok(EngineDescriptor {
                    device: "cpu",
                    compute_type: ComputeType::Float32.label(),
                })
            }
        }
    }

    async fn try_load(size: ModelSize, preference: DevicePreference, compute: ComputeType) -> Result<WhisperModel> {
        let device = DeviceManager::resolve(preference)
            .map_err(|e| anyhow!("Requested device unavailable: {}", e))?;
        info!(
            "Initializing {} model on {} ({})",
            size,
            DeviceManager::device_label(&device),
            compute.label()
        );
        WhisperModel::load(size, device, compute.dtype()).await
    }

    /// Transcribe a decoded clip.
    ///
    /// Blocking and CPU/GPU-bound; must never run concurrently against the
    /// same engine. `language_hint` fixes the language (probability 1.0);
    /// without one, the language is detected on the first voiced span.
    pub fn transcribe(&mut self, samples: &[f32], language_hint: Option<&str>) -> AppResult<EngineOutput> {
        let vad = self.vad.clone();
        let model = self.model.as_mut().ok_or(AppError::ModelNotReady)?;

        let spans = detect_voiced_spans(samples, SAMPLE_RATE as u32, &vad);
        if spans.is_empty() {
            // Nothing voiced to decode; an empty result, not an error.
            return Ok(EngineOutput {
                segments: Vec::new(),
                language: language_hint.unwrap_or("en").to_string(),
                language_probability: 0.0,
            });
        }

        let (language, language_probability, language_token) =
            resolve_language(model, samples, &spans, language_hint).map_err(AppError::from)?;

        let mut segments = Vec::new();
        for span in &spans {
            for (start, end) in window_chunks(span) {
                let text = model
                    .transcribe_window(&samples[start..end], Some(language_token))
                    .map_err(AppError::from)?;
                if text.trim().is_empty() {
                    continue;
                }
                segments.push(Segment {
                    start: start as f64 / SAMPLE_RATE as f64,
                    end: end as f64 / SAMPLE_RATE as f64,
                    text,
                });
            }
        }

        Ok(EngineOutput {
            segments,
            language,
            language_probability,
        })
    }
}

/// Pick the language for a clip: a recognized hint wins outright, an unknown
/// hint falls back to detection, no hint means detection.
fn resolve_language(
    model: &mut WhisperModel,
    samples: &[f32],
    spans: &[VoicedSpan],
    hint: Option<&str>,
) -> Result<(String, f32, u32)> {
    if let Some(code) = hint {
        match WhisperModel::language_token(code) {
            Some(token) => return Ok((code.to_lowercase(), 1.0, token)),
            None => warn!("Unknown language hint '{}', auto-detecting instead", code),
        }
    }

    let first = &spans[0];
    let window_end = first.end.min(first.start + CHUNK_SAMPLES);
    let (code, probability) = model.detect_language(&samples[first.start..window_end])?;
    let token = WhisperModel::language_token(code)
        .ok_or_else(|| anyhow!("Detected language '{}' has no token", code))?;
    Ok((code.to_string(), probability, token))
}

/// Split a voiced span at the model's 30-second window boundary.
fn window_chunks(span: &VoicedSpan) -> Vec<(usize, usize)> {
    let mut chunks = Vec::new();
    let mut offset = span.start;
    while offset < span.end {
        let end = (offset + CHUNK_SAMPLES).min(span.end);
        chunks.push((offset, end));
        offset = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_engine_reports_model_not_ready() {
        let mut engine = InferenceEngine::new(VadConfig::default());
        assert!(!engine.is_loaded());

        let samples = vec![0.1f32; SAMPLE_RATE];
        match engine.transcribe(&samples, Some("en")) {
            Err(AppError::ModelNotReady) => {}
            other => panic!("expected ModelNotReady, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_window_chunks_short_span() {
        let span = VoicedSpan { start: 100, end: 4_100 };
        assert_eq!(window_chunks(&span), vec![(100, 4_100)]);
    }

    #[test]
    fn test_window_chunks_split_at_thirty_seconds() {
        let span = VoicedSpan {
            start: 0,
            end: CHUNK_SAMPLES + SAMPLE_RATE,
        };
        let chunks = window_chunks(&span);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], (0, CHUNK_SAMPLES));
        assert_eq!(chunks[1], (CHUNK_SAMPLES, CHUNK_SAMPLES + SAMPLE_RATE));
    }

    #[test]
    fn test_window_chunks_are_contiguous_and_ordered() {
        let span = VoicedSpan {
            start: 7,
            end: 3 * CHUNK_SAMPLES + 13,
        };
        let chunks = window_chunks(&span);
        assert_eq!(chunks.first().unwrap().0, 7);
        assert_eq!(chunks.last().unwrap().1, 3 * CHUNK_SAMPLES + 13);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
            assert!(pair[0].0 < pair[0].1);
        }
    }
}

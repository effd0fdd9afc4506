//! # Audio Handling
//!
//! Decodes incoming audio payloads into the sample format the inference
//! engine expects and detects voiced spans so silent stretches are never
//! sent through the model.
//!
//! ## Key Components:
//! - **Decoder**: WAV container parsing, downmix and resampling to 16 kHz mono
//! - **Voice activity detection**: energy-based span splitting with a
//!   configurable silence gap

pub mod decoder;
pub mod vad;

pub use decoder::{decode_audio, TARGET_SAMPLE_RATE};
pub use vad::{detect_voiced_spans, VadConfig, VoicedSpan};

//! # Transcription Pipeline
//!
//! Speech-to-text transcription using Whisper models via the candle
//! framework, pure Rust with no FFI bindings to whisper.cpp.
//!
//! ## Key Components:
//! - **Model**: loading and greedy decoding of the candle Whisper model
//! - **Engine**: the adapter that turns a decoded clip into timed segments
//! - **Service**: the orchestrator behind the HTTP gateway, owning the
//!   single inference gate and the cleanup stage

pub mod engine;
pub mod model;
pub mod service;

pub use engine::{InferenceEngine, Segment};
pub use model::ModelSize;
pub use service::{EngineStatus, TranscriptionOptions, TranscriptionOutcome, TranscriptionService};

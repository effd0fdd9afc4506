//! HTTP request handlers for the gateway surface.

pub mod transcribe;

pub use transcribe::{fallback, transcribe};

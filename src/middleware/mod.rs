//! Custom actix middleware.

pub mod logging;

pub use logging::RequestLogging;

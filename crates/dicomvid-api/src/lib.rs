//! Axum HTTP server for DICOM to MP4 conversion.
//!
//! This crate provides:
//! - The `/invoke` envelope endpoint (ping, conversion, rejection)
//! - Liveness checks
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

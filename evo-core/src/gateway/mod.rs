//! # HTTP Gateway
//!
//! axum front for the pipeline: the consolidated `/api/main` endpoint, one
//! endpoint per action, health and banner routes. CORS and request tracing
//! come from `tower-http` layers.

mod error;
mod extract;
mod server;

pub use error::{API_VERSION, ApiError};
pub use extract::{MainInput, TIER_HEADER, input_from_body, input_from_query, request_context};
pub use server::{SharedPipeline, router as gateway_router, run as run_gateway};

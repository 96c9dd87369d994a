//! # Evo Core
//!
//! Core library for the Evo AI gateway.
//! Provides the request pipeline (router, action dispatcher, response
//! formatter), the tiered swarm aggregator, the knowledge and debate
//! responders, the generation front (brain), security primitives,
//! configuration, and the axum HTTP gateway.

pub mod brain;
pub mod config;
pub mod debate;
pub mod dispatcher;
pub mod error;
pub mod expert;
pub mod formatter;
pub mod gateway;
pub mod knowledge;
pub mod pipeline;
pub mod providers;
pub mod router;
pub mod security;
pub mod swarm;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, CompletionRequest, CompletionResponse, LlmProvider, MockLlmProvider};
pub use config::{EvoConfig, load_config};
pub use dispatcher::ActionProcessor;
pub use error::{AuthError, EvoError, LlmError, Result};
pub use formatter::ResponseFormatter;
pub use pipeline::Pipeline;
pub use router::SmartRouter;
pub use swarm::{PerspectiveSwarm, SwarmAggregator};
pub use types::{
    Action, ActionResult, FinalResponse, Payload, RequestContext, RoutingDecision, Tier,
};

//! HTTP gateway server built on axum.

use super::error::{ApiError, method_not_allowed};
use super::extract::{MainInput, TIER_HEADER, input_from_body, input_from_query, request_context};
use crate::error::EvoError;
use crate::pipeline::Pipeline;
use crate::types::{Action, Payload};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared pipeline reference for axum handlers.
pub type SharedPipeline = Arc<Pipeline>;

/// Per-action endpoints and the action each one dispatches.
const ACTION_ROUTES: &[(&str, Action)] = &[
    ("/api/truth/ask", Action::AskTruth),
    ("/api/evo/expert", Action::ExpertQuery),
    ("/api/evo/generate-code", Action::GenerateCode),
    ("/api/evo/debate", Action::Debate),
    ("/api/evo/theological-query", Action::TheologicalQuery),
    ("/api/creator-response", Action::CreatorResponse),
    ("/api/auth/login", Action::AuthLogin),
    ("/api/encrypt", Action::Encrypt),
    ("/api/decrypt", Action::Decrypt),
    ("/api/generate", Action::GenerateData),
    ("/api/optimize", Action::Optimize),
];

/// Build the gateway router.
pub fn router(pipeline: SharedPipeline) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            "/api/main",
            get(main_get)
                .post(main_post)
                .options(main_preflight)
                .fallback(|| async { method_not_allowed(&["POST", "GET"]) }),
        )
        .route("/api/ping", get(ping_handler).fallback(only_get))
        .route("/api/truth/stats", get(truth_stats_handler).fallback(only_get))
        .route("/api/evo/generate-tool", post(generate_tool).fallback(only_post))
        .route("/api/evo/swarm", post(perspective_swarm).fallback(only_post));

    for (path, action) in ACTION_ROUTES {
        app = app.route(path, action_route(*action));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(pipeline)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(TIER_HEADER),
        ])
}

fn action_route(action: Action) -> MethodRouter<SharedPipeline> {
    post(
        move |State(pipeline): State<SharedPipeline>, headers: HeaderMap, body: Bytes| async move {
            post_action(pipeline, headers, body, action).await
        },
    )
    .fallback(only_post)
}

async fn only_post() -> Response {
    method_not_allowed(&["POST"])
}

async fn only_get() -> Response {
    method_not_allowed(&["GET"])
}

// ==========================================
// Service endpoints
// ==========================================

async fn root_handler() -> impl IntoResponse {
    let mut endpoints = vec![
        "/api/main",
        "/api/ping",
        "/api/truth/stats",
        "/api/evo/generate-tool",
        "/api/evo/swarm",
    ];
    endpoints.extend(ACTION_ROUTES.iter().map(|(path, _)| *path));
    Json(json!({
        "message": "Evo AI API Server Running!",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ==========================================
// Consolidated endpoint
// ==========================================

async fn main_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type, Authorization, x-user-tier"),
            ),
        ],
    )
}

async fn main_get(
    State(pipeline): State<SharedPipeline>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    run_main(&pipeline, &headers, input_from_query(&params)).await
}

async fn main_post(
    State(pipeline): State<SharedPipeline>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(input) = input_from_body(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "User input is required",
                "formats": {
                    "simple": r#"{ "question": "your question here" }"#,
                    "advanced": r#"{ "action": "specific_action", "payload": {...} }"#,
                },
            })),
        )
            .into_response();
    };
    run_main(&pipeline, &headers, input).await
}

async fn run_main(pipeline: &Pipeline, headers: &HeaderMap, input: MainInput) -> Response {
    let ctx = request_context(headers);
    let outcome = match input {
        MainInput::Text(text) => pipeline.handle(&text, &ctx).await,
        MainInput::Explicit { action, payload } => {
            pipeline.handle_explicit(&action, payload, &ctx).await
        }
    };

    match outcome {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            ApiError::from_evo(&e, pipeline.config().server.production).into_response()
        }
    }
}

// ==========================================
// Per-action endpoints
// ==========================================

async fn ping_handler(State(pipeline): State<SharedPipeline>, headers: HeaderMap) -> Response {
    dispatch(&pipeline, &headers, Action::Ping, Payload::new()).await
}

async fn truth_stats_handler(
    State(pipeline): State<SharedPipeline>,
    headers: HeaderMap,
) -> Response {
    dispatch(&pipeline, &headers, Action::TruthStats, Payload::new()).await
}

async fn post_action(
    pipeline: SharedPipeline,
    headers: HeaderMap,
    body: Bytes,
    action: Action,
) -> Response {
    match payload_from_body(&body) {
        Ok(payload) => dispatch(&pipeline, &headers, action, payload).await,
        Err(e) => e.into_response(),
    }
}

async fn dispatch(
    pipeline: &Pipeline,
    headers: &HeaderMap,
    action: Action,
    payload: Payload,
) -> Response {
    let ctx = request_context(headers);
    info!(action = %action, "Direct action request");
    match pipeline.processor().process(action, payload, &ctx).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => ApiError::from_evo(&e, pipeline.config().server.production).into_response(),
    }
}

async fn generate_tool(State(pipeline): State<SharedPipeline>, body: Bytes) -> Response {
    let payload = match payload_from_body(&body) {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };
    let (Some(request), Some(tool_name)) =
        (payload.str_field("requestText"), payload.str_field("toolName"))
    else {
        return ApiError::bad_request("Request text and tool name are required").into_response();
    };
    let capabilities: Vec<String> = payload
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let complexity = if capabilities.len() > 3 {
        "advanced"
    } else {
        "standard"
    };

    match pipeline
        .expert()
        .generate_expert_tool(request, tool_name, &capabilities)
        .await
    {
        Ok(tool) => Json(json!({
            "tool": tool,
            "toolName": tool_name,
            "complexity": complexity,
            "capabilities": capabilities,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => ApiError::from_evo(&EvoError::from(e), pipeline.config().server.production)
            .into_response(),
    }
}

async fn perspective_swarm(State(pipeline): State<SharedPipeline>, body: Bytes) -> Response {
    let payload = match payload_from_body(&body) {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };
    let Some(task) = payload.str_field("task") else {
        return ApiError::bad_request("Task is required").into_response();
    };
    let extra = payload.get("payload").cloned().unwrap_or(Value::Null);

    let swarm = pipeline.perspectives();
    match swarm.run(task, extra).await {
        Ok(report) => Json(json!({
            "result": report,
            "swarmSize": swarm.max_agents(),
            "processingTime": Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => ApiError::from_evo(&EvoError::from(e), pipeline.config().server.production)
            .into_response(),
    }
}

/// An empty body is an empty payload; anything else must be a JSON object.
fn payload_from_body(body: &[u8]) -> Result<Payload, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(Payload::from(map)),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

/// Start the gateway on `addr`. Runs until the listener fails or the
/// process receives Ctrl-C.
pub async fn run(pipeline: SharedPipeline, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = router(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

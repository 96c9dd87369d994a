//! Request normalization for the consolidated endpoint.

use crate::types::{RequestContext, Tier};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const TIER_HEADER: &str = "x-user-tier";

/// Field names checked, in order, for a plain question.
const INPUT_FIELDS: &[&str] = &["question", "query", "input", "prompt", "message"];

/// Query parameters checked, in order, on `GET /api/main`.
const QUERY_PARAMS: &[&str] = &["q", "question", "query"];

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum MainInput {
    Text(String),
    Explicit {
        action: String,
        payload: Map<String, Value>,
    },
}

/// Tier and bearer credential from the request headers.
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let tier = headers
        .get(TIER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(Tier::parse);
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);
    RequestContext::new(tier, bearer)
}

/// Credential from an `Authorization` value. The scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Input for a GET request. Without a query it is a ping probe.
pub fn input_from_query(params: &HashMap<String, String>) -> MainInput {
    let text = QUERY_PARAMS
        .iter()
        .find_map(|key| params.get(*key).filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_else(|| "ping".to_string());
    MainInput::Text(text)
}

/// Input for a POST body: a JSON object, a JSON string, or raw text.
pub fn input_from_body(body: &[u8]) -> Option<MainInput> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => input_from_object(map),
        Ok(Value::String(text)) => non_blank(text),
        Ok(_) => None,
        Err(_) => std::str::from_utf8(body)
            .ok()
            .and_then(|text| non_blank(text.to_string())),
    }
}

fn input_from_object(mut map: Map<String, Value>) -> Option<MainInput> {
    let action = map
        .get("action")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .map(str::to_string);
    if let Some(action) = action {
        if let Some(Value::Object(payload)) = map.remove("payload") {
            return Some(MainInput::Explicit { action, payload });
        }
    }

    INPUT_FIELDS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(|s| MainInput::Text(s.to_string()))
}

fn non_blank(text: String) -> Option<MainInput> {
    (!text.trim().is_empty()).then_some(MainInput::Text(text))
}

//! Final response shaping.
//!
//! Decides per action whether an [`ActionResult`] goes back to the caller
//! as-is or is rewritten into natural language by the generator. A rewrite
//! forwards exactly one content field from the result. Formatting never
//! fails: when the rewrite call errors, the extracted field is returned
//! directly.

use crate::brain::Brain;
use crate::types::{Action, ActionResult, FinalResponse, RequestContext, ResponseMeta, RoutingDecision};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fields tried, in order, when picking the content to forward.
const CONTENT_FIELDS: &[&str] = &[
    "response",
    "reply",
    "answer",
    "expertReply",
    "completion",
    "interpretation",
    "message",
];

const CODE_PREVIEW_CHARS: usize = 200;
const JSON_PREVIEW_CHARS: usize = 300;

const GENERIC_GUIDE: &str = "Present the information clearly and helpfully.";

/// How a result is turned into the final response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatPolicy {
    /// Wrap the result unchanged.
    Passthrough,
    /// Rewrite through the generator.
    Rewrite,
}

/// Formatting policy for `action`, given the result it produced.
pub fn policy(action: Action, result: &ActionResult) -> FormatPolicy {
    match action {
        Action::Ping
        | Action::AuthLogin
        | Action::Encrypt
        | Action::Decrypt
        | Action::TruthStats => FormatPolicy::Passthrough,
        Action::GenerateCode => {
            let has_code = result.text("code").is_some();
            let optimized = result
                .get("optimizedVersion")
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
            if !has_code || optimized {
                FormatPolicy::Rewrite
            } else {
                FormatPolicy::Passthrough
            }
        }
        _ => FormatPolicy::Rewrite,
    }
}

/// Style guideline injected into the rewrite prompt.
pub fn action_guide(action: Action) -> &'static str {
    match action {
        Action::AskTruth => {
            "Present the factual information clearly. If sources are provided, mention them. \
             If confidence is low, acknowledge uncertainty."
        }
        Action::ExpertQuery => {
            "Present the expert analysis in a professional but accessible way. Structure the \
             response with clear sections if it's complex."
        }
        Action::Debate => {
            "Present the debate response in a balanced way. If multiple perspectives are \
             provided, structure them clearly."
        }
        Action::TheologicalQuery => {
            "Present the theological analysis respectfully and thoughtfully. Include relevant context."
        }
        Action::Swarm => {
            "Synthesize the multi-agent responses into a coherent answer. Highlight different \
             perspectives if available."
        }
        Action::GeneralLlm => "Present the response naturally and conversationally.",
        _ => GENERIC_GUIDE,
    }
}

/// The single most relevant text field of `result`, for the rewrite prompt.
pub fn extract_key_content(result: &ActionResult) -> String {
    if let Some(text) = first_content_field(result) {
        return text.to_string();
    }
    if let Some(code) = result.text("code") {
        return format!("Code: {}...", truncate_chars(code, CODE_PREVIEW_CHARS));
    }
    let dump = result.to_json().to_string();
    format!("{}...", truncate_chars(&dump, JSON_PREVIEW_CHARS))
}

/// Reply used when the rewrite call fails.
pub fn fallback_formatting(result: &ActionResult, input: &str) -> String {
    if let Some(text) = first_content_field(result) {
        return text.to_string();
    }
    if let Some(code) = result.text("code") {
        return format!("Here's the generated code:\n\n```\n{code}\n```");
    }
    format!(
        "I processed your request \"{input}\" but encountered an issue with formatting the \
         response. Here's the raw result: {}",
        result.to_json()
    )
}

pub fn formatting_prompt(result: &ActionResult, input: &str, action: Action) -> String {
    format!(
        "You are a helpful AI assistant. Answer the user's question directly and concisely.\n\n\
         USER QUESTION: \"{input}\"\n\n\
         RELEVANT INFO: {content}\n\n\
         GUIDELINES:\n\
         - {guide}\n\
         - Be conversational and natural\n\
         - No technical jargon or metadata\n\
         - Keep response focused and short\n\
         - Use simple language\n\n\
         Provide a clear, direct answer:",
        content = extract_key_content(result),
        guide = action_guide(action),
    )
}

fn first_content_field(result: &ActionResult) -> Option<&str> {
    CONTENT_FIELDS.iter().find_map(|key| result.text(key))
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct ResponseFormatter {
    brain: Arc<Brain>,
}

impl std::fmt::Debug for ResponseFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFormatter").finish_non_exhaustive()
    }
}

impl ResponseFormatter {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    /// Build the final response for `result`. Rewrites use the caller's tier.
    pub async fn format(
        &self,
        result: ActionResult,
        input: &str,
        decision: &RoutingDecision,
        ctx: &RequestContext,
    ) -> FinalResponse {
        let action = decision.action;

        if policy(action, &result) == FormatPolicy::Passthrough {
            debug!(action = %action, "Passing result through unformatted");
            return FinalResponse::Structured {
                success: true,
                data: result,
                action,
            };
        }

        let prompt = formatting_prompt(&result, input, action);
        let response = match self.brain.ask(&prompt, ctx.tier()).await {
            Ok(text) => text,
            Err(e) => {
                warn!(action = %action, error = %e, "Rewrite failed, using extracted content");
                fallback_formatting(&result, input)
            }
        };

        FinalResponse::Formatted {
            success: true,
            response,
            meta: ResponseMeta {
                action,
                processed_at: Utc::now(),
            },
        }
    }
}

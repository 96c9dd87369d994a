//! Request classification.
//!
//! [`SmartRouter::route`] never fails. It tries, in order: an explicit
//! `[DIRECT_ACTION:name]` prefix, the remote classifier (lowest tier, strict
//! JSON reply), and finally [`fallback_routing`], a deterministic keyword
//! table. A classifier transport failure yields `general_llm` at 0.5.

use crate::brain::Brain;
use crate::error::LlmError;
use crate::types::{Action, Payload, RoutingDecision, Tier};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reserved prefix naming the target action explicitly.
pub const DIRECT_ACTION_PREFIX: &str = "[DIRECT_ACTION:";

const REALTIME_KEYWORDS: &[&str] = &[
    "today",
    "now",
    "current",
    "currently",
    "this week",
    "this month",
    "this year",
    "time",
    "date today",
    "what time",
];

/// Ordered keyword table; the first action with a hit wins.
const KEYWORD_ROUTES: &[(Action, &[&str])] = &[
    (Action::Ping, &["ping", "health", "status", "alive", "working"]),
    (
        Action::GenerateCode,
        &[
            "code",
            "function",
            "script",
            "programming",
            "javascript",
            "python",
            "create function",
            "write code",
            "build app",
            "make function",
        ],
    ),
    (
        Action::Debate,
        &[
            "argue",
            "debate",
            "pros",
            "cons",
            "versus",
            "vs",
            "against",
            "why better",
            "compare",
        ],
    ),
    (
        Action::ExpertQuery,
        &[
            "analyze",
            "detailed analysis",
            "technical explanation",
            "professional",
            "expert opinion",
            "research",
        ],
    ),
    (
        Action::TheologicalQuery,
        &[
            "god",
            "jesus",
            "bible",
            "prayer",
            "faith",
            "religious",
            "christ",
            "islam",
            "spiritual",
        ],
    ),
    (
        Action::AskTruth,
        &[
            "define",
            "definition of",
            "meaning of",
            "explain concept",
            "what does mean",
            "scientific definition",
        ],
    ),
];

/// Topics answered from the static fact table when asked as "what is X".
const STATIC_FACT_TOPICS: &[&str] = &[
    "photosynthesis",
    "democracy",
    "gravity",
    "machine learning",
    "javascript",
    "python",
    "capitalism",
    "socialism",
];

/// Shape the classifier is instructed to reply with.
#[derive(Debug, Deserialize)]
struct ClassifierReply {
    action: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct SmartRouter {
    brain: Arc<Brain>,
}

impl std::fmt::Debug for SmartRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRouter").finish_non_exhaustive()
    }
}

impl SmartRouter {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self { brain }
    }

    /// Classify `input`. Always produces a decision.
    pub async fn route(&self, input: &str) -> RoutingDecision {
        if input.starts_with(DIRECT_ACTION_PREFIX) {
            return direct_action(input);
        }

        let prompt = classification_prompt(input);
        let decision = match self.brain.ask(&prompt, Tier::Free).await {
            Ok(reply) => match parse_classifier_reply(&reply) {
                Some(decision) => decision,
                None => {
                    warn!("Classifier reply unusable; using keyword routing");
                    fallback_routing(input)
                }
            },
            Err(LlmError::NotConfigured { .. }) => {
                warn!("No classifier configured; using keyword routing");
                fallback_routing(input)
            }
            Err(e) => {
                warn!(error = %e, "Classifier call failed; routing to general_llm");
                RoutingDecision::new(
                    Action::GeneralLlm,
                    0.5,
                    "Fallback due to routing error - using general LLM",
                )
            }
        };

        info!(
            action = %decision.action,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "Routed request"
        );
        decision
    }
}

/// Split a direct-action input into `(action name, remainder)`.
fn split_direct_action(input: &str) -> Option<(&str, &str)> {
    let rest = input.strip_prefix(DIRECT_ACTION_PREFIX)?;
    let end = rest.find(']')?;
    let name = &rest[..end];
    if name.is_empty() {
        return None;
    }
    Some((name, rest[end + 1..].trim_start()))
}

fn direct_action(input: &str) -> RoutingDecision {
    match split_direct_action(input).and_then(|(name, _)| name.parse::<Action>().ok()) {
        Some(action) => RoutingDecision::new(action, 1.0, "direct"),
        None => RoutingDecision::new(
            Action::GeneralLlm,
            0.8,
            "Invalid direct action, using general LLM",
        ),
    }
}

/// Prompt asking the classifier for a strict `{action, confidence, reasoning}` object.
pub fn classification_prompt(input: &str) -> String {
    let actions: Vec<String> = Action::all()
        .iter()
        .map(|a| format!("- {}: {}", a.as_str(), a.description()))
        .collect();

    format!(
        "You are an intelligent API router. Analyze the user's input and determine the BEST \
         action to handle their request.\n\n\
         AVAILABLE ACTIONS:\n{actions}\n\n\
         USER INPUT: \"{input}\"\n\n\
         ROUTING RULES:\n\
         1. general_llm for greetings, casual conversation, real-time information (today's \
         date, current time, weather, news), creative requests and opinions.\n\
         2. ask_truth only for static factual definitions (\"what is photosynthesis\", \
         \"define democracy\"), never for current or dynamic information.\n\
         3. generate_code for programming, scripts, functions and code requests.\n\
         4. expert_query for complex technical analysis and detailed professional explanations.\n\
         5. debate for arguments, pros/cons and different perspectives.\n\
         6. When in doubt, use general_llm.\n\n\
         Respond with only this JSON object:\n\
         {{\"action\": \"chosen_action_name\", \"confidence\": 0.95, \"reasoning\": \"brief explanation\"}}",
        actions = actions.join("\n"),
    )
}

/// Parse the first JSON object in `reply`. `None` when absent, malformed, or naming an unknown action.
pub fn parse_classifier_reply(reply: &str) -> Option<RoutingDecision> {
    let start = reply.find('{')?;
    let parsed = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<ClassifierReply>()
        .next()?;
    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Classifier reply is not a routing object");
            return None;
        }
    };

    let action = parsed.action.parse::<Action>().ok()?;
    let confidence = parsed.confidence.filter(|c| *c > 0.0).unwrap_or(0.8);
    let reasoning = parsed
        .reasoning
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "Auto-routed by AI".to_string());
    Some(RoutingDecision::new(action, confidence, reasoning))
}

/// Deterministic keyword classification, first match wins.
pub fn fallback_routing(input: &str) -> RoutingDecision {
    let input = input.to_lowercase();

    if let Some(keyword) = REALTIME_KEYWORDS.iter().find(|k| input.contains(*k)) {
        return RoutingDecision::new(
            Action::GeneralLlm,
            0.9,
            format!("Real-time information request detected: \"{keyword}\""),
        );
    }

    for (action, keywords) in KEYWORD_ROUTES {
        if let Some(keyword) = keywords.iter().find(|k| input.contains(*k)) {
            return RoutingDecision::new(
                *action,
                0.8,
                format!("Keyword-based routing: matched \"{keyword}\" for {action}"),
            );
        }
    }

    if input.contains("what is") {
        if STATIC_FACT_TOPICS.iter().any(|t| input.contains(t)) {
            return RoutingDecision::new(
                Action::AskTruth,
                0.8,
                "Static factual definition request",
            );
        }
        return RoutingDecision::new(Action::GeneralLlm, 0.8, "General \"what is\" question");
    }

    RoutingDecision::new(Action::GeneralLlm, 0.7, "No specific pattern matched")
}

/// Input with any leading direct-action directive removed.
pub fn clean_input(input: &str) -> &str {
    split_direct_action(input).map_or(input, |(_, rest)| rest)
}

/// Map `(input, action)` to the action's payload shape.
pub fn build_payload(input: &str, action: Action) -> Payload {
    let clean = clean_input(input);
    match action {
        Action::Ping | Action::TruthStats => Payload::new(),
        Action::AskTruth | Action::GeneralLlm => Payload::new().with("question", clean),
        Action::ExpertQuery => Payload::new()
            .with("requestText", clean)
            .with("domain", "general")
            .with("format", "report"),
        Action::EnhancePrompt => Payload::new().with("input", clean),
        Action::GenerateCode => Payload::new()
            .with("requestText", clean)
            .with("language", "javascript"),
        Action::GenerateTool => Payload::new().with("requestText", clean),
        Action::Debate => Payload::new().with("topic", clean),
        Action::TheologicalQuery => Payload::new().with("passage", clean),
        Action::Swarm => Payload::new()
            .with("task", clean)
            .with("payload", json!({})),
        Action::CreatorResponse => Payload::new().with("subject", clean),
        Action::GenerateData | Action::Optimize => {
            Payload::new().with("data", Value::String(clean.to_string()))
        }
        Action::AuthLogin | Action::Encrypt | Action::Decrypt => {
            Payload::new().with("question", clean)
        }
    }
}

//! Core data model shared by the router, dispatcher and formatter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A supported request category. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Ping,
    AskTruth,
    TruthStats,
    ExpertQuery,
    EnhancePrompt,
    GenerateCode,
    GenerateTool,
    Debate,
    TheologicalQuery,
    Swarm,
    CreatorResponse,
    AuthLogin,
    Encrypt,
    Decrypt,
    GenerateData,
    Optimize,
    GeneralLlm,
}

impl Action {
    /// All actions, in the order they are presented to the classifier.
    pub fn all() -> &'static [Action] {
        &[
            Action::Ping,
            Action::AskTruth,
            Action::TruthStats,
            Action::ExpertQuery,
            Action::EnhancePrompt,
            Action::GenerateCode,
            Action::GenerateTool,
            Action::Debate,
            Action::TheologicalQuery,
            Action::Swarm,
            Action::CreatorResponse,
            Action::AuthLogin,
            Action::Encrypt,
            Action::Decrypt,
            Action::GenerateData,
            Action::Optimize,
            Action::GeneralLlm,
        ]
    }

    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ping => "ping",
            Action::AskTruth => "ask_truth",
            Action::TruthStats => "truth_stats",
            Action::ExpertQuery => "expert_query",
            Action::EnhancePrompt => "enhance_prompt",
            Action::GenerateCode => "generate_code",
            Action::GenerateTool => "generate_tool",
            Action::Debate => "debate",
            Action::TheologicalQuery => "theological_query",
            Action::Swarm => "swarm",
            Action::CreatorResponse => "creator_response",
            Action::AuthLogin => "auth_login",
            Action::Encrypt => "encrypt",
            Action::Decrypt => "decrypt",
            Action::GenerateData => "generate_data",
            Action::Optimize => "optimize",
            Action::GeneralLlm => "general_llm",
        }
    }

    /// Routing description used to build the classification prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Action::Ping => "Health check requests, system status",
            Action::AskTruth => "Simple factual questions, definitions, basic information",
            Action::TruthStats => "Statistics about knowledge base",
            Action::ExpertQuery => {
                "Complex technical questions, detailed analysis, professional explanations"
            }
            Action::EnhancePrompt => {
                "Vague requests like \"make a game\", \"build an app\" that need clarification"
            }
            Action::GenerateCode => "Requests for code, programming, scripts, functions",
            Action::GenerateTool => "Complex tool/module generation requests",
            Action::Debate => "Questions asking for arguments, pros/cons, different perspectives",
            Action::TheologicalQuery => "Religious, spiritual, philosophical questions",
            Action::Swarm => "Complex multi-agent tasks requiring multiple perspectives",
            Action::CreatorResponse => "Questions about who created something",
            Action::AuthLogin => "Authentication/login requests",
            Action::Encrypt => "Encryption requests (admin only)",
            Action::Decrypt => "Decryption requests (admin only)",
            Action::GenerateData => "Data optimization requests",
            Action::Optimize => "Data analysis and optimization",
            Action::GeneralLlm => {
                "Everything else, complex discussions, creative tasks, casual conversation"
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// Caller service level. Parsed case-insensitively; anything unrecognised is `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Paid,
    Enterprise,
}

impl Tier {
    pub fn parse(value: &str) -> Tier {
        match value.trim().to_ascii_lowercase().as_str() {
            "pro" => Tier::Pro,
            "paid" => Tier::Paid,
            "enterprise" => Tier::Enterprise,
            _ => Tier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Paid => "paid",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the router: which action to run and why.
///
/// Confidence is advisory; nothing downstream gates on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
}

impl RoutingDecision {
    pub fn new(action: Action, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        }
    }
}

/// Action-specific input fields, built by the router and consumed once by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// A non-empty string field, if present.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// A field that is present and carries a value (not null, empty string or `false`).
    pub fn value_field(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| is_present(v))
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Structured result of one handler. Always tagged with its action and a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ActionResult {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    /// Builder-style field insert. `action` and `timestamp` are reserved.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        if key == "action" || key == "timestamp" {
            return;
        }
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A non-empty string field, if present.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Metadata attached to a language-model rewritten response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub action: Action,
    pub processed_at: DateTime<Utc>,
}

/// Terminal artifact returned to the caller of the consolidated endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalResponse {
    /// Result wrapped unchanged.
    Structured {
        success: bool,
        data: ActionResult,
        action: Action,
    },
    /// Natural-language rewrite of the result.
    Formatted {
        success: bool,
        response: String,
        meta: ResponseMeta,
    },
}

impl FinalResponse {
    pub fn action(&self) -> Action {
        match self {
            FinalResponse::Structured { action, .. } => *action,
            FinalResponse::Formatted { meta, .. } => meta.action,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            FinalResponse::Structured { success, .. } | FinalResponse::Formatted { success, .. } => {
                *success
            }
        }
    }
}

/// Per-request facts the handlers need from the transport layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Tier header value, when the caller sent one.
    pub tier: Option<Tier>,
    /// Bearer credential, without the `Bearer ` prefix.
    pub bearer_token: Option<String>,
}

impl RequestContext {
    pub fn new(tier: Option<Tier>, bearer_token: Option<String>) -> Self {
        Self { tier, bearer_token }
    }

    pub fn with_tier(tier: Tier) -> Self {
        Self {
            tier: Some(tier),
            bearer_token: None,
        }
    }

    /// Header tier, defaulting to free.
    pub fn tier(&self) -> Tier {
        self.tier.unwrap_or_default()
    }
}

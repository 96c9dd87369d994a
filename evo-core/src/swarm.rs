//! Tier-bounded multi-module responder ("swarm").
//!
//! [`SwarmAggregator`] walks a fixed, ordered registry of topic modules and
//! activates the relevant ones up to the caller tier's cap. Once the cap is
//! reached scanning stops, so later modules are never evaluated even when
//! relevant. A module failure is recorded inline and never aborts the
//! aggregation. If nothing activates, one general generation call is made.
//!
//! [`PerspectiveSwarm`] is the standalone variant: three agent prompts issued
//! concurrently and joined by position.

use crate::brain::Brain;
use crate::debate::DebateResponder;
use crate::error::LlmError;
use crate::types::Tier;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Key under which the holistic fallback answer is recorded.
pub const GENERAL_KEY: &str = "general";

/// Failure raised by a single module.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ModuleError(pub String);

/// A topic-specific responder in the swarm registry.
pub trait SwarmModule: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase keywords; any substring hit activates the module.
    fn keywords(&self) -> &[&'static str];

    fn is_relevant(&self, topic_lower: &str) -> bool {
        self.keywords().iter().any(|k| topic_lower.contains(k))
    }

    fn respond(&self, topic: &str) -> Result<String, ModuleError>;
}

/// A module backed by the debate responder.
pub struct DebateModule {
    responder: DebateResponder,
}

impl SwarmModule for DebateModule {
    fn name(&self) -> &str {
        "debate"
    }

    fn keywords(&self) -> &[&'static str] {
        &["islam", "muhammad", "atheist", "religion"]
    }

    fn respond(&self, topic: &str) -> Result<String, ModuleError> {
        Ok(self.responder.answer(topic))
    }
}

/// A module whose reply is a fixed template over the topic.
pub struct TemplateModule {
    name: &'static str,
    keywords: &'static [&'static str],
    render: fn(&str) -> String,
}

impl TemplateModule {
    pub const fn new(
        name: &'static str,
        keywords: &'static [&'static str],
        render: fn(&str) -> String,
    ) -> Self {
        Self {
            name,
            keywords,
            render,
        }
    }
}

impl SwarmModule for TemplateModule {
    fn name(&self) -> &str {
        self.name
    }

    fn keywords(&self) -> &[&'static str] {
        self.keywords
    }

    fn respond(&self, topic: &str) -> Result<String, ModuleError> {
        Ok((self.render)(topic))
    }
}

/// The built-in registry, in evaluation order.
pub fn default_modules() -> Vec<Box<dyn SwarmModule>> {
    vec![
        Box::new(DebateModule {
            responder: DebateResponder::new(),
        }),
        Box::new(TemplateModule::new(
            "prophecy",
            &["prophecy", "fulfill", "prediction"],
            |t| format!("Prophecy analysis for: {t}"),
        )),
        Box::new(TemplateModule::new(
            "endtimes",
            &["end", "gog", "tribulation", "apocalypse"],
            |_| "End times analysis completed".to_string(),
        )),
        Box::new(TemplateModule::new(
            "jesus",
            &["jesus", "teach", "christ"],
            |t| format!("Jesus's teaching on {t}"),
        )),
        Box::new(TemplateModule::new(
            "archaeology",
            &["archaeology", "scroll", "evidence", "historical"],
            |_| "Archaeological evidence summary".to_string(),
        )),
        Box::new(TemplateModule::new(
            "philosophy",
            &["philosophy", "ethics", "morality"],
            |t| format!("Philosophical analysis of: {t}"),
        )),
        Box::new(TemplateModule::new(
            "science",
            &["science", "physics", "biology", "technology"],
            |t| format!("Scientific explanation of: {t}"),
        )),
    ]
}

/// What one swarm invocation activated and produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmOutcome {
    /// Activated module names in registry order, `general` when the fallback ran.
    pub activated_modules: Vec<String>,
    /// Module replies in activation order.
    pub responses: IndexMap<String, String>,
}

pub struct SwarmAggregator {
    modules: Vec<Box<dyn SwarmModule>>,
    brain: Arc<Brain>,
}

impl std::fmt::Debug for SwarmAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        f.debug_struct("SwarmAggregator")
            .field("modules", &names)
            .finish()
    }
}

impl SwarmAggregator {
    pub fn new(brain: Arc<Brain>) -> Self {
        Self::with_modules(brain, default_modules())
    }

    pub fn with_modules(brain: Arc<Brain>, modules: Vec<Box<dyn SwarmModule>>) -> Self {
        Self { modules, brain }
    }

    /// Activation cap for `tier`.
    pub fn cap_for(&self, tier: Tier) -> usize {
        self.brain.tiers().limits(tier).swarm_max_modules
    }

    pub async fn respond(&self, topic: &str, tier: Tier) -> Result<SwarmOutcome, LlmError> {
        let cap = self.cap_for(tier);
        let topic_lower = topic.to_lowercase();
        let mut outcome = SwarmOutcome::default();

        for module in &self.modules {
            if outcome.activated_modules.len() >= cap {
                break;
            }
            if !module.is_relevant(&topic_lower) {
                continue;
            }
            let name = module.name().to_string();
            let reply = match module.respond(topic) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(module = %name, error = %e, "Swarm module failed");
                    format!("[Error in {name}]: {e}")
                }
            };
            outcome.responses.insert(name.clone(), reply);
            outcome.activated_modules.push(name);
        }

        if outcome.activated_modules.is_empty() {
            let prompt = format!("Analyze this topic comprehensively: {topic}");
            let reply = self.brain.ask(&prompt, Tier::Free).await?;
            outcome.responses.insert(GENERAL_KEY.to_string(), reply);
            outcome.activated_modules.push(GENERAL_KEY.to_string());
        }

        info!(
            topic,
            tier = %tier,
            cap,
            activated = ?outcome.activated_modules,
            "Swarm activation"
        );
        Ok(outcome)
    }
}

/// Result of a [`PerspectiveSwarm`] run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerspectiveReport {
    pub task: String,
    pub payload: Value,
    pub agent_responses: Vec<String>,
    pub synthesis: String,
    pub timestamp: DateTime<Utc>,
}

/// Three agents prompted concurrently on the same task.
#[derive(Debug)]
pub struct PerspectiveSwarm {
    brain: Arc<Brain>,
    max_agents: usize,
}

impl PerspectiveSwarm {
    pub fn new(brain: Arc<Brain>, max_agents: usize) -> Self {
        Self { brain, max_agents }
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    pub async fn run(&self, task: &str, payload: Value) -> Result<PerspectiveReport, LlmError> {
        let prompts = [
            format!("As Agent 1, analyze this task: {task}"),
            format!("As Agent 2, provide alternative perspective on: {task}"),
            format!("As Agent 3, synthesize solutions for: {task}"),
        ];

        let results = join_all(prompts.iter().map(|p| self.brain.ask(p, Tier::Free))).await;
        let agent_responses = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        Ok(PerspectiveReport {
            task: task.to_string(),
            payload,
            synthesis: format!(
                "Processed by {} agents: {}",
                self.max_agents,
                agent_responses.join(" | ")
            ),
            agent_responses,
            timestamp: Utc::now(),
        })
    }
}

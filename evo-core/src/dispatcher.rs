//! Action dispatch: one handler per [`Action`].
//!
//! Every handler validates its required payload fields before touching any
//! collaborator, and every result is stamped with its action and a timestamp.
//! Generation failures propagate as [`EvoError::Upstream`] except where a
//! handler defines its own fallback (`ask_truth`, `debate`).

use crate::brain::Brain;
use crate::config::EvoConfig;
use crate::debate::{DebateResponder, GENERIC_PLACEHOLDER};
use crate::error::{EvoError, Result};
use crate::expert::ExpertService;
use crate::knowledge::KnowledgeResponder;
use crate::security::{ALGORITHM, RbacManager, SecurityManager};
use crate::swarm::SwarmAggregator;
use crate::types::{Action, ActionResult, Payload, RequestContext, Tier};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_PREFERRED_NAME: &str = "Jesus Christ";

const ENHANCER_INSTRUCTION: &str = "You are a prompt enhancer. A user gives you a vague request \
    like 'make a game' or 'build an app', and you rewrite it as a highly specific software \
    development prompt. Be precise. Mention platform, tools, and key features.";

pub struct ActionProcessor {
    brain: Arc<Brain>,
    expert: Arc<ExpertService>,
    rbac: Arc<RbacManager>,
    knowledge: KnowledgeResponder,
    debate: DebateResponder,
    swarm: SwarmAggregator,
    security: SecurityManager,
    max_agents: usize,
    token_ttl_hours: i64,
    environment: &'static str,
}

impl std::fmt::Debug for ActionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionProcessor")
            .field("environment", &self.environment)
            .field("max_agents", &self.max_agents)
            .finish_non_exhaustive()
    }
}

impl ActionProcessor {
    pub fn new(
        brain: Arc<Brain>,
        expert: Arc<ExpertService>,
        rbac: Arc<RbacManager>,
        config: &EvoConfig,
    ) -> Self {
        Self {
            swarm: SwarmAggregator::new(brain.clone()),
            brain,
            expert,
            rbac,
            knowledge: KnowledgeResponder::new(),
            debate: DebateResponder::new(),
            security: SecurityManager::new(),
            max_agents: config.swarm.max_agents,
            token_ttl_hours: config.security.token_ttl_hours,
            environment: if config.server.production {
                "production"
            } else {
                "development"
            },
        }
    }

    /// Dispatch by wire name. Unknown names fail with [`EvoError::UnknownAction`].
    pub async fn process_named(
        &self,
        name: &str,
        payload: Payload,
        ctx: &RequestContext,
    ) -> Result<ActionResult> {
        let action = name.parse::<Action>().map_err(|_| EvoError::UnknownAction {
            name: name.to_string(),
        })?;
        self.process(action, payload, ctx).await
    }

    pub async fn process(
        &self,
        action: Action,
        payload: Payload,
        ctx: &RequestContext,
    ) -> Result<ActionResult> {
        info!(action = %action, tier = %ctx.tier(), "Processing action");
        match action {
            Action::Ping => Ok(self.handle_ping()),
            Action::AskTruth => self.handle_ask_truth(&payload, ctx).await,
            Action::TruthStats => self.handle_truth_stats(),
            Action::ExpertQuery => self.handle_expert_query(&payload).await,
            Action::EnhancePrompt => self.handle_enhance_prompt(&payload).await,
            Action::GenerateCode => self.handle_generate_code(&payload, ctx).await,
            Action::GenerateTool => self.handle_generate_tool(&payload).await,
            Action::Debate => self.handle_debate(&payload, ctx).await,
            Action::TheologicalQuery => self.handle_theological_query(&payload).await,
            Action::Swarm => self.handle_swarm(&payload, ctx).await,
            Action::CreatorResponse => self.handle_creator_response(&payload),
            Action::AuthLogin => self.handle_auth_login(&payload),
            Action::Encrypt => self.handle_encrypt(&payload, ctx),
            Action::Decrypt => self.handle_decrypt(&payload, ctx),
            Action::GenerateData => self.handle_generate_data(&payload, ctx).await,
            Action::Optimize => self.handle_optimize(&payload, ctx).await,
            Action::GeneralLlm => self.handle_general_llm(&payload, ctx).await,
        }
    }

    // ==========================================
    // Health
    // ==========================================

    fn handle_ping(&self) -> ActionResult {
        ActionResult::new(Action::Ping)
            .with("status", "ok")
            .with("environment", self.environment)
            .with(
                "services",
                json!({
                    "llm": self.brain.is_configured(),
                    "swarm": true,
                    "security": true,
                    "expertService": true,
                }),
            )
            .with("version", env!("CARGO_PKG_VERSION"))
    }

    // ==========================================
    // Knowledge
    // ==========================================

    async fn handle_ask_truth(&self, payload: &Payload, ctx: &RequestContext) -> Result<ActionResult> {
        let question = required_str(payload, "question", "Question is required for ask_truth")?;
        let truth = self.knowledge.answer(question);

        if !truth.grounded || truth.confidence < 0.5 || truth.signals_ignorance() {
            warn!(
                confidence = truth.confidence,
                "Knowledge lookup ungrounded; falling back to general_llm"
            );
            let fallback_payload = Payload::new()
                .with("question", question)
                .with("fallback_from", Action::AskTruth.as_str());
            let general = self.handle_general_llm(&fallback_payload, ctx).await?;
            let answer = general.get("response").cloned().unwrap_or(Value::Null);

            return Ok(ActionResult::new(Action::AskTruth)
                .with("answer", answer)
                .with("confidence", 0.8)
                .with("sources", json!(["general_llm_fallback"]))
                .with("grounded", false)
                .with("fallback_used", true)
                .with("original_truth_confidence", truth.confidence));
        }

        with_fields(ActionResult::new(Action::AskTruth), serde_json::to_value(&truth)?)
    }

    fn handle_truth_stats(&self) -> Result<ActionResult> {
        with_fields(
            ActionResult::new(Action::TruthStats),
            serde_json::to_value(self.knowledge.stats())?,
        )
    }

    // ==========================================
    // Expert generation
    // ==========================================

    async fn handle_expert_query(&self, payload: &Payload) -> Result<ActionResult> {
        let request =
            required_str(payload, "requestText", "RequestText is required for expert_query")?;
        let domain = payload.str_field("domain").unwrap_or("general");
        let format = payload.str_field("format").unwrap_or("report");

        let reply = self
            .expert
            .generate_expert_response(request, domain, format)
            .await?;

        Ok(ActionResult::new(Action::ExpertQuery)
            .with("expertReply", reply)
            .with("domain", domain)
            .with("format", format))
    }

    async fn handle_generate_code(
        &self,
        payload: &Payload,
        ctx: &RequestContext,
    ) -> Result<ActionResult> {
        let request =
            required_str(payload, "requestText", "RequestText is required for generate_code")?;
        let language = payload.str_field("language").unwrap_or("javascript");
        let framework = payload.str_field("framework").unwrap_or("");
        let tier = ctx.tier();

        let code = self
            .expert
            .generate_expert_code(request, language, framework)
            .await?;

        // Second review pass is a paid-tier feature only.
        let optimized = if tier == Tier::Paid {
            let prompt = format!("Review and optimize this code:\n{code}");
            Value::String(self.brain.ask(&prompt, tier).await?)
        } else {
            Value::Null
        };

        Ok(ActionResult::new(Action::GenerateCode)
            .with("code", code)
            .with("optimizedVersion", optimized)
            .with("language", language)
            .with("framework", framework)
            .with("tier", tier.as_str()))
    }

    async fn handle_generate_tool(&self, payload: &Payload) -> Result<ActionResult> {
        let request =
            required_str(payload, "requestText", "RequestText is required for generate_tool")?;
        let tool_code = self
            .expert
            .generate_expert_code(
                &format!("Create a complete tool/module for: {request}"),
                "javascript",
                "",
            )
            .await?;

        Ok(ActionResult::new(Action::GenerateTool)
            .with("toolCode", tool_code)
            .with("request", request)
            .with(
                "toolName",
                payload.str_field("toolName").unwrap_or("GeneratedTool"),
            ))
    }

    async fn handle_theological_query(&self, payload: &Payload) -> Result<ActionResult> {
        let passage =
            required_str(payload, "passage", "Passage is required for theological_query")?;
        let interpretation = self
            .expert
            .generate_expert_response(
                &format!("Provide theological analysis of: {passage}"),
                "theology",
                "detailed analysis",
            )
            .await?;

        Ok(ActionResult::new(Action::TheologicalQuery)
            .with("interpretation", interpretation)
            .with("passage", passage)
            .with("analysisType", "theological"))
    }

    // ==========================================
    // Debate and swarm
    // ==========================================

    async fn handle_debate(&self, payload: &Payload, ctx: &RequestContext) -> Result<ActionResult> {
        let topic = required_str(payload, "topic", "Topic is required for debate")?;

        let grounded = self.knowledge.answer(topic);
        if grounded.grounded {
            return Ok(ActionResult::new(Action::Debate)
                .with("reply", grounded.answer)
                .with("sources", grounded.sources)
                .with("grounded", true)
                .with("confidence", grounded.confidence));
        }

        let canned = self.debate.answer(topic);
        if canned.contains(GENERIC_PLACEHOLDER) {
            let tier = ctx.tier();
            let reply = self
                .brain
                .ask(&format!("Provide a thoughtful debate response for: {topic}"), tier)
                .await?;
            return Ok(ActionResult::new(Action::Debate)
                .with("reply", reply)
                .with("source", "generator")
                .with("tier", tier.as_str())
                .with("grounded", false));
        }

        Ok(ActionResult::new(Action::Debate)
            .with("reply", canned)
            .with("source", "debate-responder")
            .with("grounded", true)
            .with("enhanced", true))
    }

    async fn handle_swarm(&self, payload: &Payload, ctx: &RequestContext) -> Result<ActionResult> {
        let task = required_str(payload, "task", "Task is required for swarm")?;
        let tier = ctx.tier();
        let outcome = self.swarm.respond(task, tier).await?;

        Ok(ActionResult::new(Action::Swarm)
            .with("task", task)
            .with(
                "payload",
                payload.get("payload").cloned().unwrap_or_else(|| json!({})),
            )
            .with("swarmResponses", serde_json::to_value(&outcome.responses)?)
            .with("activatedModules", outcome.activated_modules)
            .with("tier", tier.as_str())
            .with("maxAgents", self.max_agents))
    }

    fn handle_creator_response(&self, payload: &Payload) -> Result<ActionResult> {
        let subject = required_str(payload, "subject", "Subject is required for creator_response")?;
        let preferred = payload
            .str_field("preferredName")
            .unwrap_or(DEFAULT_PREFERRED_NAME);

        Ok(ActionResult::new(Action::CreatorResponse)
            .with("response", self.debate.creator_response(subject, preferred))
            .with("subject", subject)
            .with("preferredName", preferred))
    }

    // ==========================================
    // Authentication and encryption
    // ==========================================

    fn handle_auth_login(&self, payload: &Payload) -> Result<ActionResult> {
        let user_id = required_str(payload, "userId", "userId is required for auth_login")?;
        let role = payload.str_field("role").unwrap_or("user");
        let token = self.rbac.generate_token(user_id, role)?;

        Ok(ActionResult::new(Action::AuthLogin)
            .with("token", token)
            .with("userId", user_id)
            .with("role", role)
            .with("expiresIn", format!("{}h", self.token_ttl_hours)))
    }

    fn handle_encrypt(&self, payload: &Payload, ctx: &RequestContext) -> Result<ActionResult> {
        let data = payload
            .value_field("data")
            .ok_or_else(|| EvoError::validation("Data is required for encrypt"))?;
        self.rbac
            .authorize(ctx.bearer_token.as_deref(), Action::Encrypt.as_str())?;

        let plaintext = serde_json::to_string(data)?;
        let sealed = self
            .security
            .encrypt(&plaintext, payload.str_field("key"))?;

        Ok(ActionResult::new(Action::Encrypt)
            .with("success", true)
            .with("metadata", json!({ "keyId": sealed.key_id(), "algorithm": ALGORITHM }))
            .with("encrypted", sealed.encrypted)
            .with("iv", sealed.iv)
            .with("tag", sealed.tag))
    }

    fn handle_decrypt(&self, payload: &Payload, ctx: &RequestContext) -> Result<ActionResult> {
        let fields = ["encrypted", "key", "iv", "tag"].map(|k| payload.str_field(k));
        let [Some(encrypted), Some(key), Some(iv), Some(tag)] = fields else {
            return Err(EvoError::validation(
                "All encryption parameters are required for decrypt",
            ));
        };
        self.rbac
            .authorize(ctx.bearer_token.as_deref(), Action::Decrypt.as_str())?;

        let plaintext = self.security.decrypt(encrypted, key, iv, tag)?;
        let data: Value = serde_json::from_str(&plaintext)?;

        Ok(ActionResult::new(Action::Decrypt)
            .with("success", true)
            .with("data", data))
    }

    // ==========================================
    // Data and conversation
    // ==========================================

    async fn handle_generate_data(
        &self,
        payload: &Payload,
        ctx: &RequestContext,
    ) -> Result<ActionResult> {
        let data = payload
            .value_field("data")
            .ok_or_else(|| EvoError::validation("Data is required for generate_data"))?;
        let tier = ctx.tier();
        let prompt = format!("Optimize the following data: {}", serde_json::to_string(data)?);
        let completion = self.brain.ask(&prompt, tier).await?;

        Ok(ActionResult::new(Action::GenerateData)
            .with("completion", completion)
            .with("tier", tier.as_str())
            .with("optimized", true))
    }

    async fn handle_optimize(&self, payload: &Payload, ctx: &RequestContext) -> Result<ActionResult> {
        let data = payload
            .value_field("data")
            .ok_or_else(|| EvoError::validation("Data is required for optimize"))?;
        let tier = ctx.tier();
        let prompt = format!("Analyze and optimize: {}", serde_json::to_string(data)?);
        let completion = self.brain.ask(&prompt, tier).await?;

        Ok(ActionResult::new(Action::Optimize)
            .with("completion", completion)
            .with("tier", tier.as_str())
            .with("analysis", true))
    }

    async fn handle_enhance_prompt(&self, payload: &Payload) -> Result<ActionResult> {
        let input = payload
            .str_field("input")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EvoError::validation("Input is required for enhance_prompt"))?;

        let enhanced = self
            .brain
            .ask(
                &format!("{ENHANCER_INSTRUCTION}\n\nUser request: {input}"),
                Tier::Paid,
            )
            .await?;

        Ok(ActionResult::new(Action::EnhancePrompt)
            .with("enhanced_prompt", enhanced)
            .with("original_input", input)
            .with("enhancement_type", "software_development"))
    }

    async fn handle_general_llm(
        &self,
        payload: &Payload,
        ctx: &RequestContext,
    ) -> Result<ActionResult> {
        let query = payload
            .str_field("question")
            .or_else(|| payload.str_field("prompt"))
            .ok_or_else(|| EvoError::validation("Question or prompt is required for general_llm"))?;
        let tier = ctx
            .tier
            .or_else(|| payload.str_field("tier").map(Tier::parse))
            .unwrap_or_default();
        let fallback_from = payload.str_field("fallback_from");

        let prompt = match fallback_from {
            Some(from) => format!(
                "Previous attempt with '{from}' action was not sufficient. Please provide a \
                 comprehensive answer to: {query}"
            ),
            None => query.to_string(),
        };
        let response = self.brain.ask(&prompt, tier).await?;

        Ok(ActionResult::new(Action::GeneralLlm)
            .with("response", response)
            .with("query", query)
            .with("tier", tier.as_str())
            .with("is_fallback", fallback_from.is_some()))
    }
}

fn required_str<'a>(payload: &'a Payload, key: &str, message: &str) -> Result<&'a str> {
    payload
        .str_field(key)
        .ok_or_else(|| EvoError::validation(message))
}

/// Copy every field of a serialized object into `result`.
fn with_fields(mut result: ActionResult, value: Value) -> Result<ActionResult> {
    if let Value::Object(map) = value {
        for (key, value) in map {
            result.insert(&key, value);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::AuthError;
    use crate::security::RbacManager;

    struct Harness {
        mock: Arc<MockLlmProvider>,
        rbac: Arc<RbacManager>,
        processor: ActionProcessor,
    }

    fn harness(mock: MockLlmProvider) -> Harness {
        let config = EvoConfig::default();
        let mock = Arc::new(mock);
        let brain = Arc::new(Brain::new(
            mock.clone(),
            &config.llm,
            config.tiers.clone(),
            config.expert.clone(),
        ));
        let expert = Arc::new(ExpertService::new(brain.clone(), &config.expert));
        let rbac = Arc::new(RbacManager::new(
            b"unit-secret".to_vec(),
            chrono::Duration::hours(24),
        ));
        let processor = ActionProcessor::new(brain, expert, rbac.clone(), &config);
        Harness {
            mock,
            rbac,
            processor,
        }
    }

    fn free() -> RequestContext {
        RequestContext::default()
    }

    #[tokio::test]
    async fn test_ping_makes_no_upstream_call() {
        let h = harness(MockLlmProvider::new());
        let r = h.processor.process(Action::Ping, Payload::new(), &free()).await.unwrap();
        assert_eq!(r.action, Action::Ping);
        assert_eq!(r.text("status"), Some("ok"));
        assert_eq!(r.get("services").unwrap()["llm"], true);
        assert_eq!(h.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_fields_fail_validation_before_upstream() {
        let h = harness(MockLlmProvider::new());
        for action in [
            Action::AskTruth,
            Action::ExpertQuery,
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
            Action::EnhancePrompt,
            Action::GeneralLlm,
        ] {
            let err = h
                .processor
                .process(action, Payload::new(), &free())
                .await
                .unwrap_err();
            assert!(
                matches!(err, EvoError::Validation { .. }),
                "{action} should fail validation, got {err}"
            );
        }
        assert_eq!(h.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_action_name() {
        let h = harness(MockLlmProvider::new());
        let err = h
            .processor
            .process_named("teleport", Payload::new(), &free())
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::UnknownAction { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_ask_truth_grounded() {
        let h = harness(MockLlmProvider::new());
        let r = h
            .processor
            .process(
                Action::AskTruth,
                Payload::new().with("question", "what is democracy"),
                &free(),
            )
            .await
            .unwrap();
        assert_eq!(r.get("grounded"), Some(&json!(true)));
        assert!(r.text("answer").unwrap().contains("elected representatives"));
        assert!(r.get("fallback_used").is_none());
        assert_eq!(h.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_ask_truth_low_confidence_falls_back() {
        let h = harness(MockLlmProvider::with_response("open answer"));
        let r = h
            .processor
            .process(
                Action::AskTruth,
                Payload::new().with("question", "zzz qqq"),
                &free(),
            )
            .await
            .unwrap();
        assert_eq!(r.action, Action::AskTruth);
        assert_eq!(r.text("answer"), Some("open answer"));
        assert_eq!(r.get("grounded"), Some(&json!(false)));
        assert_eq!(r.get("fallback_used"), Some(&json!(true)));
        assert_eq!(r.get("original_truth_confidence"), Some(&json!(0.0)));
        assert!(h.mock.last_prompt().unwrap().contains("'ask_truth' action was not sufficient"));
    }

    #[tokio::test]
    async fn test_debate_escalation_stages() {
        let h = harness(MockLlmProvider::with_response("generated debate"));

        // Stage 1: knowledge hit.
        let r = h
            .processor
            .process(Action::Debate, Payload::new().with("topic", "capitalism"), &free())
            .await
            .unwrap();
        assert_eq!(r.get("grounded"), Some(&json!(true)));
        assert!(r.get("sources").is_some());

        // Stage 2: curated reply.
        let r = h
            .processor
            .process(Action::Debate, Payload::new().with("topic", "was jesus a muslim"), &free())
            .await
            .unwrap();
        assert_eq!(r.text("source"), Some("debate-responder"));
        assert_eq!(h.mock.call_count(), 0);

        // Stage 3: generic placeholder escalates to generation.
        let r = h
            .processor
            .process(Action::Debate, Payload::new().with("topic", "cats or dogs"), &free())
            .await
            .unwrap();
        assert_eq!(r.text("reply"), Some("generated debate"));
        assert_eq!(r.get("grounded"), Some(&json!(false)));
        assert_eq!(h.mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_code_optimizes_only_for_paid() {
        let h = harness(MockLlmProvider::with_response("code"));
        let payload = Payload::new().with("requestText", "reverse a string");

        let r = h
            .processor
            .process(Action::GenerateCode, payload.clone(), &free())
            .await
            .unwrap();
        assert_eq!(r.get("optimizedVersion"), Some(&Value::Null));
        assert_eq!(r.text("language"), Some("javascript"));
        assert_eq!(h.mock.call_count(), 1);

        let r = h
            .processor
            .process(Action::GenerateCode, payload, &RequestContext::with_tier(Tier::Paid))
            .await
            .unwrap();
        // Code comes from the expert cache; only the review call goes upstream.
        assert_eq!(r.text("optimizedVersion"), Some("code"));
        assert_eq!(r.text("tier"), Some("paid"));
        assert_eq!(h.mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_swarm_result_fields() {
        let h = harness(MockLlmProvider::new());
        let r = h
            .processor
            .process(
                Action::Swarm,
                Payload::new().with("task", "science and ethics"),
                &RequestContext::with_tier(Tier::Enterprise),
            )
            .await
            .unwrap();
        assert_eq!(r.get("activatedModules"), Some(&json!(["philosophy", "science"])));
        assert_eq!(r.get("maxAgents"), Some(&json!(5)));
        assert_eq!(r.get("payload"), Some(&json!({})));
    }

    #[tokio::test]
    async fn test_encrypt_requires_admin_permission() {
        let h = harness(MockLlmProvider::new());
        let payload = Payload::new().with("data", json!({"secret": 42}));

        let err = h
            .processor
            .process(Action::Encrypt, payload.clone(), &free())
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::Authorization(AuthError::MissingCredential)));
        assert_eq!(err.status_code(), 401);

        let user = h.rbac.generate_token("u", "user").unwrap();
        let err = h
            .processor
            .process(Action::Encrypt, payload, &RequestContext::new(None, Some(user)))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let h = harness(MockLlmProvider::new());
        let admin = RequestContext::new(None, Some(h.rbac.generate_token("a", "admin").unwrap()));
        let key = "11".repeat(32);

        let sealed = h
            .processor
            .process(
                Action::Encrypt,
                Payload::new()
                    .with("data", json!({"secret": 42}))
                    .with("key", key.as_str()),
                &admin,
            )
            .await
            .unwrap();
        assert_eq!(sealed.get("metadata").unwrap()["algorithm"], "AES-256-GCM");
        assert_eq!(sealed.get("metadata").unwrap()["keyId"], "11111111...");
        assert!(sealed.get("key").is_none());

        let opened = h
            .processor
            .process(
                Action::Decrypt,
                Payload::new()
                    .with("encrypted", sealed.get("encrypted").cloned().unwrap())
                    .with("key", key.as_str())
                    .with("iv", sealed.get("iv").cloned().unwrap())
                    .with("tag", sealed.get("tag").cloned().unwrap()),
                &admin,
            )
            .await
            .unwrap();
        assert_eq!(opened.get("data"), Some(&json!({"secret": 42})));
    }

    #[tokio::test]
    async fn test_auth_login_issues_verifiable_token() {
        let h = harness(MockLlmProvider::new());
        let r = h
            .processor
            .process(Action::AuthLogin, Payload::new().with("userId", "alice"), &free())
            .await
            .unwrap();
        assert_eq!(r.text("role"), Some("user"));
        assert_eq!(r.text("expiresIn"), Some("24h"));
        let claims = h.rbac.verify_token(r.text("token").unwrap()).unwrap();
        assert_eq!(claims.user_id, "alice");
    }

    #[tokio::test]
    async fn test_general_llm_tier_resolution() {
        let h = harness(MockLlmProvider::with_response("hi"));
        let r = h
            .processor
            .process(
                Action::GeneralLlm,
                Payload::new().with("prompt", "hello").with("tier", "PRO"),
                &free(),
            )
            .await
            .unwrap();
        assert_eq!(r.text("tier"), Some("pro"));
        assert_eq!(r.get("is_fallback"), Some(&json!(false)));

        let r = h
            .processor
            .process(
                Action::GeneralLlm,
                Payload::new().with("question", "hello").with("tier", "pro"),
                &RequestContext::with_tier(Tier::Enterprise),
            )
            .await
            .unwrap();
        assert_eq!(r.text("tier"), Some("enterprise"));
    }

    #[tokio::test]
    async fn test_enhance_prompt_uses_paid_tier() {
        let h = harness(MockLlmProvider::with_response("better prompt"));
        let r = h
            .processor
            .process(
                Action::EnhancePrompt,
                Payload::new().with("input", "  make a game  "),
                &free(),
            )
            .await
            .unwrap();
        assert_eq!(r.text("original_input"), Some("make a game"));
        assert_eq!(h.mock.requests()[0].max_tokens, 800);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let h = harness(MockLlmProvider::failing());
        let err = h
            .processor
            .process(Action::GeneralLlm, Payload::new().with("question", "hi"), &free())
            .await
            .unwrap_err();
        assert!(matches!(err, EvoError::Upstream(_)));
        assert_eq!(err.status_code(), 500);
    }
}

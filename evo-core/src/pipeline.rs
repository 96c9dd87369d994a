//! Composition root: router → dispatcher → formatter.
//!
//! [`Pipeline`] owns every collaborator for the life of the process and hands
//! out shared references. Each consolidated request runs inside its own
//! `request` span.

use crate::brain::{Brain, LlmProvider};
use crate::config::EvoConfig;
use crate::dispatcher::ActionProcessor;
use crate::error::Result;
use crate::expert::ExpertService;
use crate::formatter::ResponseFormatter;
use crate::providers::create_provider;
use crate::router::{DIRECT_ACTION_PREFIX, SmartRouter, build_payload};
use crate::security::RbacManager;
use crate::swarm::PerspectiveSwarm;
use crate::types::{FinalResponse, Payload, RequestContext, RoutingDecision};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub struct Pipeline {
    config: EvoConfig,
    brain: Arc<Brain>,
    expert: Arc<ExpertService>,
    rbac: Arc<RbacManager>,
    router: SmartRouter,
    processor: ActionProcessor,
    formatter: ResponseFormatter,
    perspectives: PerspectiveSwarm,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("brain", &self.brain)
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build the pipeline with the provider named in `config.llm`.
    pub fn from_config(config: EvoConfig) -> Self {
        let provider = create_provider(&config.llm);
        Self::new(provider, config)
    }

    pub fn new(provider: Arc<dyn LlmProvider>, config: EvoConfig) -> Self {
        let brain = Arc::new(Brain::new(
            provider,
            &config.llm,
            config.tiers.clone(),
            config.expert.clone(),
        ));
        let expert = Arc::new(ExpertService::new(brain.clone(), &config.expert));
        let rbac = Arc::new(RbacManager::from_config(&config.security));
        let processor = ActionProcessor::new(brain.clone(), expert.clone(), rbac.clone(), &config);

        Self {
            router: SmartRouter::new(brain.clone()),
            formatter: ResponseFormatter::new(brain.clone()),
            perspectives: PerspectiveSwarm::new(brain.clone(), config.swarm.max_agents),
            processor,
            brain,
            expert,
            rbac,
            config,
        }
    }

    /// Route, process and format one free-form input.
    pub async fn handle(&self, input: &str, ctx: &RequestContext) -> Result<FinalResponse> {
        self.run(input, None, ctx)
            .instrument(info_span!("request", id = %Uuid::new_v4()))
            .await
    }

    /// Handle an explicit `{action, payload}` request.
    ///
    /// The pair becomes a direct-action directive. When the router accepts
    /// the named action, `payload` is passed to the handler as-is.
    pub async fn handle_explicit(
        &self,
        action: &str,
        payload: Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<FinalResponse> {
        let input = format!(
            "{DIRECT_ACTION_PREFIX}{action}] {}",
            Value::Object(payload.clone())
        );
        let explicit = (action.to_string(), Payload::from(payload));
        self.run(&input, Some(explicit), ctx)
            .instrument(info_span!("request", id = %Uuid::new_v4(), explicit = action))
            .await
    }

    async fn run(
        &self,
        input: &str,
        explicit: Option<(String, Payload)>,
        ctx: &RequestContext,
    ) -> Result<FinalResponse> {
        let decision = self.router.route(input).await;

        let payload = match explicit {
            Some((name, payload)) if name == decision.action.as_str() => payload,
            _ => build_payload(input, decision.action),
        };

        let result = self.processor.process(decision.action, payload, ctx).await?;
        info!(action = %decision.action, "Action processed");

        let response = self.formatter.format(result, input, &decision, ctx).await;
        info!(action = %response.action(), "Response formatted");
        Ok(response)
    }

    /// Routing only, with the payload the dispatcher would receive.
    pub async fn route(&self, input: &str) -> (RoutingDecision, Payload) {
        let decision = self.router.route(input).await;
        let payload = build_payload(input, decision.action);
        (decision, payload)
    }

    pub fn config(&self) -> &EvoConfig {
        &self.config
    }

    pub fn brain(&self) -> &Arc<Brain> {
        &self.brain
    }

    pub fn processor(&self) -> &ActionProcessor {
        &self.processor
    }

    pub fn expert(&self) -> &ExpertService {
        &self.expert
    }

    pub fn rbac(&self) -> &RbacManager {
        &self.rbac
    }

    pub fn perspectives(&self) -> &PerspectiveSwarm {
        &self.perspectives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::types::Action;
    use serde_json::json;

    fn pipeline(mock: Arc<MockLlmProvider>) -> Pipeline {
        Pipeline::new(mock, EvoConfig::default())
    }

    #[tokio::test]
    async fn test_direct_ping_is_passthrough() {
        let mock = Arc::new(MockLlmProvider::new());
        let p = pipeline(mock.clone());
        let out = p
            .handle("[DIRECT_ACTION:ping] hello", &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(out.action(), Action::Ping);
        assert!(matches!(out, FinalResponse::Structured { .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_payload_used_when_action_accepted() {
        let mock = Arc::new(MockLlmProvider::new());
        let p = pipeline(mock.clone());
        let mut payload = Map::new();
        payload.insert("userId".into(), json!("alice"));
        payload.insert("role".into(), json!("admin"));

        let out = p
            .handle_explicit("auth_login", payload, &RequestContext::default())
            .await
            .unwrap();
        let FinalResponse::Structured { data, .. } = out else {
            panic!("auth_login should pass through");
        };
        assert_eq!(data.text("role"), Some("admin"));
        let claims = p.rbac().verify_token(data.text("token").unwrap()).unwrap();
        assert_eq!(claims.user_id, "alice");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_unknown_action_routes_to_general() {
        let mock = Arc::new(MockLlmProvider::with_response("chat"));
        let p = pipeline(mock);
        let out = p
            .handle_explicit("teleport", Map::new(), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(out.action(), Action::GeneralLlm);
    }

    #[tokio::test]
    async fn test_validation_error_surfaces() {
        let p = pipeline(Arc::new(MockLlmProvider::new()));
        let err = p
            .handle_explicit("auth_login", Map::new(), &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_route_returns_payload() {
        let p = pipeline(Arc::new(MockLlmProvider::failing()));
        let (decision, payload) = p.route("[DIRECT_ACTION:debate] cats or dogs").await;
        assert_eq!(decision.action, Action::Debate);
        assert_eq!(payload.str_field("topic"), Some("cats or dogs"));
    }
}

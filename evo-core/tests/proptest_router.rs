//! Property-based tests for routing, payload shaping and tokens.

use proptest::prelude::*;

use evo_core::config::SecurityConfig;
use evo_core::knowledge::KnowledgeResponder;
use evo_core::router::{build_payload, clean_input, fallback_routing};
use evo_core::security::RbacManager;
use evo_core::{Action, EvoConfig, MockLlmProvider, Pipeline, RequestContext};
use std::sync::Arc;

fn current_thread() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn any_action() -> impl Strategy<Value = Action> {
    proptest::sample::select(Action::all().to_vec())
}

// --- Direct action properties ---

proptest! {
    #[test]
    fn direct_action_always_wins(action in any_action(), rest in "[a-z ]{0,30}") {
        let mock = Arc::new(MockLlmProvider::failing());
        let pipeline = Pipeline::new(mock.clone(), EvoConfig::default());
        let input = format!("[DIRECT_ACTION:{}] {rest}", action.as_str());

        let (decision, _) = current_thread().block_on(pipeline.route(&input));
        prop_assert_eq!(decision.action, action);
        prop_assert_eq!(decision.confidence, 1.0);
        prop_assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn direct_debate_payload_carries_topic(topic in "[a-zA-Z0-9][a-zA-Z0-9 ?!.,]{0,40}") {
        let input = format!("[DIRECT_ACTION:debate] {topic}");
        let payload = build_payload(&input, Action::Debate);
        prop_assert_eq!(payload.str_field("topic"), Some(topic.as_str()));
        prop_assert_eq!(clean_input(&input), topic.as_str());

        let pipeline = Pipeline::new(
            Arc::new(MockLlmProvider::with_response("a measured reply")),
            EvoConfig::default(),
        );
        let result = current_thread().block_on(pipeline.processor().process(
            Action::Debate,
            payload,
            &RequestContext::default(),
        ));
        prop_assert!(result.is_ok());
    }
}

// --- Keyword routing properties ---

proptest! {
    #[test]
    fn realtime_keyword_routes_to_general(
        prefix in "[a-z ]{0,20}",
        keyword in proptest::sample::select(vec!["today", "now", "current", "this week", "what time"]),
        suffix in "[a-z ]{0,20}",
    ) {
        let decision = fallback_routing(&format!("{prefix} {keyword} {suffix}"));
        prop_assert_eq!(decision.action, Action::GeneralLlm);
        prop_assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn fallback_routing_is_total(input in "\\PC{0,200}") {
        let decision = fallback_routing(&input);
        prop_assert!((0.7..=0.9).contains(&decision.confidence));
        prop_assert!(!decision.reasoning.is_empty());
    }

    #[test]
    fn fallback_routing_ignores_case(input in "[a-zA-Z ]{0,60}") {
        let lower = fallback_routing(&input.to_lowercase());
        let mixed = fallback_routing(&input);
        prop_assert_eq!(lower.action, mixed.action);
    }
}

// --- Knowledge properties ---

proptest! {
    #[test]
    fn retrieval_is_sorted_best_first(query in "[a-z ]{0,60}") {
        let knowledge = KnowledgeResponder::new();
        let scored = knowledge.retrieve(&query);
        prop_assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
        prop_assert!(scored.iter().all(|s| s.score > 0.0));
    }

    #[test]
    fn ungrounded_answers_have_no_sources(query in "[xqz]{3,12}") {
        let answer = KnowledgeResponder::new().answer(&query);
        prop_assert!(!answer.grounded);
        prop_assert!(answer.sources.is_empty());
    }
}

// --- Token properties ---

proptest! {
    #[test]
    fn issued_tokens_verify(user in "[a-zA-Z0-9_]{1,24}", role in "(admin|user|guest)") {
        let rbac = RbacManager::from_config(&SecurityConfig::default());
        let token = rbac.generate_token(&user, &role).unwrap();
        let claims = rbac.verify_token(&token).unwrap();
        prop_assert_eq!(claims.user_id, user);
        prop_assert_eq!(claims.role, role);
    }

    #[test]
    fn spliced_tokens_are_rejected(user in "[a-z]{1,12}") {
        let rbac = RbacManager::from_config(&SecurityConfig::default());
        let genuine = rbac.generate_token(&user, "guest").unwrap();
        let escalated = rbac.generate_token(&user, "admin").unwrap();

        let parts: Vec<&str> = genuine.split('.').collect();
        let claims = escalated.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", parts[0], claims, parts[2]);
        prop_assert!(rbac.verify_token(&spliced).is_err());
    }
}

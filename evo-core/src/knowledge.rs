//! Static fact lookup with keyword scoring.
//!
//! Answers only from an in-memory topic table. Anything scoring below the
//! confidence threshold is reported as ungrounded so callers can escalate to
//! open-ended generation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Answer text used when no topic scores high enough.
pub const UNKNOWN_ANSWER: &str =
    "I don't know - I cannot find relevant information in my knowledge base to answer this question.";

const CONFIDENCE_THRESHOLD: f64 = 0.5;

static WHAT_IS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"what\s+is\s+(.+)").expect("valid regex"));

const DEFAULT_FACTS: &[(&str, &str)] = &[
    (
        "javascript",
        "JavaScript is a high-level, dynamic programming language used for web development, both frontend and backend",
    ),
    (
        "python",
        "Python is a high-level, interpreted programming language known for simplicity and readability",
    ),
    (
        "react",
        "React is a JavaScript library for building user interfaces, developed by Facebook",
    ),
    (
        "nodejs",
        "Node.js is a JavaScript runtime environment that allows running JavaScript on servers",
    ),
    (
        "api",
        "API (Application Programming Interface) is a set of protocols and tools for building software applications",
    ),
    (
        "photosynthesis",
        "Process by which plants convert sunlight, carbon dioxide, and water into glucose and oxygen",
    ),
    (
        "democracy",
        "A system of government where power is held by the people through elected representatives",
    ),
    (
        "gravity",
        "The force that attracts objects toward each other, keeping us grounded on Earth",
    ),
    (
        "evolution",
        "The process by which species change over time through natural selection and genetic variation",
    ),
    (
        "capitalism",
        "An economic system based on private ownership and free market competition",
    ),
    (
        "debate_enhancements",
        "Comparative religion overviews, scripture-based answers and faith claim reviews",
    ),
    (
        "casualty_data",
        "Historical accounts of early conflicts as recorded by classical historians",
    ),
    (
        "security_features",
        "AES-256-GCM encryption, RBAC middleware, JWT authentication",
    ),
    (
        "api_structure",
        "Centralized generation front, expert services, code generation endpoints",
    ),
    (
        "evo_swarm",
        "Multi-agent processing, debate responder, theological query analysis",
    ),
];

/// One entry of the fact table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub topic: String,
    pub content: String,
}

/// A fact with its relevance score for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFact<'a> {
    pub fact: &'a Fact,
    pub score: f64,
}

/// Result of a knowledge lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub grounded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_content: Option<usize>,
}

impl KnowledgeAnswer {
    fn unknown() -> Self {
        Self {
            answer: UNKNOWN_ANSWER.to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            grounded: false,
            retrieved_content: None,
        }
    }

    /// Whether the answer text itself admits ignorance.
    pub fn signals_ignorance(&self) -> bool {
        self.answer.contains("I don't know")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub topics: Vec<String>,
    pub confidence_threshold: f64,
}

/// Keyword-scored lookup over a fixed fact table.
#[derive(Debug, Clone)]
pub struct KnowledgeResponder {
    facts: Vec<Fact>,
    threshold: f64,
}

impl Default for KnowledgeResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeResponder {
    /// Responder over the built-in fact table.
    pub fn new() -> Self {
        Self::with_facts(DEFAULT_FACTS.iter().map(|(topic, content)| Fact {
            topic: topic.to_string(),
            content: content.to_string(),
        }))
    }

    pub fn with_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            facts: facts.into_iter().collect(),
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    /// Score every fact against the query, best first. Zero scores are dropped.
    pub fn retrieve(&self, query: &str) -> Vec<ScoredFact<'_>> {
        let query = query.to_lowercase();
        let words: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .collect();
        let target = WHAT_IS
            .captures(&query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());

        let mut scored: Vec<ScoredFact<'_>> = self
            .facts
            .iter()
            .filter_map(|fact| {
                let topic = fact.topic.to_lowercase();
                let content = fact.content.to_lowercase();
                let mut score = 0.0;

                if query.contains(&topic) || topic.contains(&query) {
                    score += 10.0;
                }
                if let Some(target) = &target {
                    if topic.contains(target.as_str()) || target.contains(&topic) {
                        score += 15.0;
                    }
                }
                for word in &words {
                    if content.contains(word) {
                        score += 1.0;
                    }
                    if topic.contains(word) {
                        score += 2.0;
                    }
                }

                (score > 0.0).then(|| ScoredFact {
                    fact,
                    score: score / words.len().max(1) as f64,
                })
            })
            .collect();

        // Stable sort keeps table order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }

    /// Answer from the fact table only.
    pub fn answer(&self, question: &str) -> KnowledgeAnswer {
        let scored = self.retrieve(question);
        let Some(best) = scored.first() else {
            return KnowledgeAnswer::unknown();
        };
        if best.score < self.threshold {
            return KnowledgeAnswer::unknown();
        }

        KnowledgeAnswer {
            answer: format!("Based on the available information: {}", best.fact.content),
            confidence: best.score,
            sources: vec![best.fact.topic.clone()],
            grounded: true,
            retrieved_content: Some(scored.len()),
        }
    }

    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            total_entries: self.facts.len(),
            topics: self.facts.iter().map(|f| f.topic.clone()).collect(),
            confidence_threshold: self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_what_is_democracy_is_grounded() {
        let kb = KnowledgeResponder::new();
        let answer = kb.answer("what is democracy");
        assert!(answer.grounded);
        assert_eq!(answer.sources, vec!["democracy".to_string()]);
        assert!(answer.answer.starts_with("Based on the available information:"));
        // 10 (topic in query) + 15 (what-is target) + 2 (word in topic), over 2 words.
        assert!((answer.confidence - 13.5).abs() < 1e-9);
        assert!(answer.retrieved_content.unwrap() >= 1);
    }

    #[test]
    fn test_unrelated_question_is_unknown() {
        let kb = KnowledgeResponder::new();
        let answer = kb.answer("zzz qqq xxx");
        assert!(!answer.grounded);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
        assert!(answer.signals_ignorance());
    }

    #[test]
    fn test_weak_match_below_threshold() {
        let kb = KnowledgeResponder::with_facts([Fact {
            topic: "gravity".into(),
            content: "force between masses".into(),
        }]);
        // One content word in a four-word query: 1/4 = 0.25.
        let answer = kb.answer("tell about masses please");
        assert!(!answer.grounded);
        assert_eq!(answer.answer, UNKNOWN_ANSWER);
    }

    #[test]
    fn test_retrieve_orders_by_score() {
        let kb = KnowledgeResponder::new();
        let scored = kb.retrieve("python javascript");
        assert!(scored.len() >= 2);
        assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_short_words_ignored() {
        let kb = KnowledgeResponder::with_facts([Fact {
            topic: "xyz".into(),
            content: "an of to".into(),
        }]);
        assert!(kb.retrieve("an of to").is_empty());
    }

    #[test]
    fn test_stats() {
        let kb = KnowledgeResponder::new();
        let stats = kb.stats();
        assert_eq!(stats.total_entries, 15);
        assert!(stats.topics.contains(&"photosynthesis".to_string()));
        assert_eq!(stats.confidence_threshold, 0.5);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalEntries"], 15);
        assert_eq!(json["confidenceThreshold"], 0.5);
    }
}

//! Canned responses for comparative-religion and debate topics.
//!
//! Topics that hit none of the curated overrides get a generic reply carrying
//! [`GENERIC_PLACEHOLDER`]; the debate handler treats that marker as a miss
//! and escalates to open-ended generation.

use regex::Regex;
use std::sync::LazyLock;

/// Marker embedded in the generic reply.
pub const GENERIC_PLACEHOLDER: &str = "[Generic debate response would go here]";

const CREATOR: &str = "Byron Knoll & Sushil";

static CREATOR_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"who (created|made) (you|this bot|system)").expect("valid regex")
});

static PROPHECY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"prophecy|fulfilled prophecy|came true").expect("valid regex"));

/// A titled set of claim/evidence pairs.
struct ClaimReview {
    title: &'static str,
    entries: &'static [(&'static str, &'static str, &'static str)],
}

impl ClaimReview {
    fn to_text(&self) -> String {
        let mut lines = vec![format!("=== {} ===", self.title)];
        for (topic, claim, evidence) in self.entries {
            lines.push(format!("\n**{topic}:**"));
            lines.push(format!("Claim: {claim}"));
            lines.push(format!("Evidence: {evidence}"));
        }
        lines.join("\n")
    }
}

const FAITH_CLAIMS: ClaimReview = ClaimReview {
    title: "Reviewing Faith Claims: Latter-day Saints & Jehovah's Witnesses",
    entries: &[
        (
            "Book of Mormon Archaeology",
            "Archaeological evidence supports Book of Mormon civilizations in the Americas.",
            "Mainstream archaeology has not identified the large-scale civilizations described in the Book of Mormon.",
        ),
        (
            "New World Translation (JW Bible)",
            "The New World Translation is the most accurate Bible translation.",
            "Many scholars note translation choices regarding the divine name and Christological passages.",
        ),
    ],
};

const COMPARATIVE_OVERVIEW: &[(&str, &str)] = &[
    (
        "Scripture",
        "Christians read the Bible; Muslims read the Qur'an and also honour earlier revelations.",
    ),
    (
        "Jesus",
        "Christians confess Jesus as the Son of God; Islam reveres Isa as a prophet and the Messiah.",
    ),
    (
        "Prophethood",
        "Islam regards Muhammad as the final prophet; Christianity holds that revelation is fulfilled in Christ.",
    ),
    (
        "Historical sources",
        "Early biographies (Ibn Ishaq via Ibn Hisham) and the Gospels are read differently by each tradition.",
    ),
];

/// Topic-keyword responder for debate questions.
#[derive(Debug, Clone, Default)]
pub struct DebateResponder;

impl DebateResponder {
    pub fn new() -> Self {
        Self
    }

    /// Reply for a debate topic. First matching rule wins.
    pub fn answer(&self, topic: &str) -> String {
        let lc = topic.to_lowercase();

        if lc.contains("was jesus a muslim") {
            return "According to Islamic belief, Jesus (Isa, peace be upon him) was a prophet who \
                    submitted to the will of God, which aligns with the meaning of 'Muslim'. \
                    Historically, however, Jesus lived before Islam was established as a religion."
                .to_string();
        }

        if lc.contains("how was the universe made") || lc.contains("universe made") {
            return "In different scriptures, the Creator is referred to by different names: \
                    'Yahweh' in the Bible, 'Allah' in the Qur'an. He created the universe with \
                    wisdom and purpose."
                .to_string();
        }

        if lc.contains("muhammad") || lc.contains("islam") {
            return comparative_overview();
        }

        if CREATOR_QUESTION.is_match(&lc) {
            return format!("I was created by {CREATOR}.");
        }

        if PROPHECY.is_match(&lc) {
            return "Prophecy analysis: traditions differ on which prophecies are fulfilled, \
                    pending, or symbolic. Each reading depends on its scripture and commentary."
                .to_string();
        }

        if lc.contains("mormon") || lc.contains("jehovah") {
            return FAITH_CLAIMS.to_text();
        }

        generic_debate(topic)
    }

    /// Reply attributing `subject` to its Creator, addressed by `preferred_name`.
    pub fn creator_response(&self, subject: &str, preferred_name: &str) -> String {
        format!(
            "Regarding {subject}: in the Christian tradition every part of creation, {subject} \
             included, is understood as the work of God. Speaking of Him as {preferred_name}, \
             believers see in {subject} the order and purpose of its Creator, while other \
             traditions describe the same Creator by other names."
        )
    }
}

fn comparative_overview() -> String {
    let mut parts = vec!["Comparative Overview: Islam and Christianity".to_string()];
    for (heading, text) in COMPARATIVE_OVERVIEW {
        parts.push(format!("- {heading}: {text}"));
    }
    parts.join("\n")
}

fn generic_debate(topic: &str) -> String {
    format!("Here's my analysis of \"{topic}\": {GENERIC_PLACEHOLDER}")
}

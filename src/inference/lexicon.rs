//! Deterministic lexicon-based engine.
//!
//! Used when no model directory is configured, and as a test double.
//!
//! Scoring counts positive and negative cue words and squashes the margin
//! through a logistic curve, so the score is always the confidence of the
//! winning label (never below 0.5). Entity recognition groups runs of
//! capitalized words: runs containing an institution marker are `ORG`,
//! runs introduced by a place preposition are `LOC`, and mixed
//! letter/digit identifiers are `MISC`.

use async_trait::async_trait;
use tracing::trace;

use super::{EntityGroup, EntityToken, InferenceEngine, TextScore};
use crate::error::ModelError;

const POSITIVE_CUES: &[&str] = &[
    "approved", "confirm", "confirmed", "complete", "completed", "thank", "thanks",
    "pleased", "received", "success", "successful", "welcome", "glad", "great",
    "appreciate", "agreed", "good", "timely",
];

const NEGATIVE_CUES: &[&str] = &[
    "overdue", "late", "failed", "failure", "default", "error", "problem",
    "issue", "urgent", "penalty", "rejected", "declined", "missing", "dispute",
    "cancel", "cancelled", "unable", "delay", "delayed",
];

/// Words that make a capitalized run an organization.
const ORG_MARKERS: &[&str] = &[
    "bank", "bancorp", "corp", "corporation", "inc", "llc", "ltd", "lp", "llp",
    "plc", "capital", "partners", "holdings", "group", "trust", "company", "co",
    "financial", "securities", "credit", "fund", "ag", "sa", "na",
];

/// Prepositions that make the following capitalized run a location.
const PLACE_PREPOSITIONS: &[&str] = &["in", "at", "near", "from"];

/// Lowercase words allowed inside a capitalized run ("Bank of America").
const CONNECTORS: &[&str] = &["of", "and", "&"];

const CLAUSE_END: &[char] = &[',', '.', ';', ':', '!', '?', ')'];

/// Fallback engine with no external model files.
#[derive(Debug, Default, Clone)]
pub struct LexiconEngine;

impl LexiconEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InferenceEngine for LexiconEngine {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn score(&self, text: &str) -> Result<TextScore, ModelError> {
        Ok(score_text(text))
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityToken>, ModelError> {
        let entities = recognize(text);
        trace!(count = entities.len(), "Lexicon entities recognized");
        Ok(entities)
    }
}

fn score_text(text: &str) -> TextScore {
    let (mut positive, mut negative) = (0i32, 0i32);
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if POSITIVE_CUES.contains(&word.as_str()) {
            positive += 1;
        } else if NEGATIVE_CUES.contains(&word.as_str()) {
            negative += 1;
        }
    }

    let margin = (positive - negative) as f32;
    let label = if margin >= 0.0 { "POSITIVE" } else { "NEGATIVE" };
    let score = 1.0 / (1.0 + (-(1.0 + margin.abs() * 0.75)).exp());

    TextScore {
        label: label.to_string(),
        score,
    }
}

fn recognize(text: &str) -> Vec<EntityToken> {
    let mut entities = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut lead: Option<String> = None;
    let mut previous: Option<String> = None;

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '&'));
        if word.is_empty() {
            close_run(&mut run, lead.as_deref(), &mut entities);
            previous = None;
            continue;
        }
        let lower = word.to_lowercase();

        if is_identifier(word) {
            close_run(&mut run, lead.as_deref(), &mut entities);
            entities.push(EntityToken::new(EntityGroup::Misc, word));
        } else if starts_upper(word) || (!run.is_empty() && CONNECTORS.contains(&lower.as_str())) {
            if run.is_empty() {
                lead = previous.clone();
            }
            run.push(word);
        } else {
            close_run(&mut run, lead.as_deref(), &mut entities);
        }

        previous = Some(lower);
        if raw.ends_with(CLAUSE_END) {
            close_run(&mut run, lead.as_deref(), &mut entities);
            previous = None;
        }
    }
    close_run(&mut run, lead.as_deref(), &mut entities);

    entities
}

fn close_run(run: &mut Vec<&str>, lead: Option<&str>, entities: &mut Vec<EntityToken>) {
    while run
        .last()
        .is_some_and(|w| CONNECTORS.contains(&w.to_lowercase().as_str()))
    {
        run.pop();
    }
    if run.is_empty() {
        return;
    }

    let is_org = run
        .iter()
        .any(|w| ORG_MARKERS.contains(&w.to_lowercase().as_str()));
    let group = if is_org {
        Some(EntityGroup::Org)
    } else if lead.is_some_and(|l| PLACE_PREPOSITIONS.contains(&l)) {
        Some(EntityGroup::Loc)
    } else {
        None
    };

    if let Some(group) = group {
        entities.push(EntityToken::new(group, run.join(" ")));
    }
    run.clear();
}

fn starts_upper(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

/// Account-style identifiers: letters and digits, optionally hyphenated.
fn is_identifier(word: &str) -> bool {
    word.len() >= 5
        && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && word.chars().any(|c| c.is_ascii_digit())
        && word.chars().any(|c| c.is_ascii_alphabetic())
}

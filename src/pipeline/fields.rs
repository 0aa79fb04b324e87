//! Structured field extraction.
//!
//! Entity-backed fields come from the engine's token classification,
//! grouped by category in document order. Amount, date and the deal-name
//! fallback come from fixed patterns tried in order; the first hit wins.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::inference::{EntityGroup, EntityToken, InferenceEngine};
use crate::pipeline::types::ExtractedFields;

static AMOUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\$\s*([0-9,.]+)").unwrap(),
        Regex::new(r"(?i)USD\s*([0-9,.]+)").unwrap(),
        Regex::new(r"(?i)([0-9,.]+)\s*dollars").unwrap(),
    ]
});

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"([0-9]{1,2}[-/][0-9]{1,2}[-/][0-9]{2,4})").unwrap(),
        Regex::new(r"([A-Za-z0-9_]+ [0-9]{1,2},? [0-9]{4})").unwrap(),
    ]
});

static DEAL_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)deal(?:\s+name)?[:\s]+([^,.\n]+)").unwrap(),
        Regex::new(r"(?i)(?:for|regarding)\s+(?:the\s+)?([^,.\n]+)\s+deal").unwrap(),
    ]
});

/// Word-piece continuation marker emitted by sub-word tokenizers.
const CONTINUATION_MARKER: &str = "##";

/// Pulls amount, date, deal name, borrower, bank and account number out of text.
pub struct FieldExtractor {
    engine: Arc<dyn InferenceEngine>,
}

impl FieldExtractor {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self { engine }
    }

    /// Extract fields from combined subject + body text.
    ///
    /// If the entity pass fails nothing is extracted at all.
    pub async fn extract(&self, text: &str) -> ExtractedFields {
        let entities = match self.engine.extract_entities(text).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Entity extraction failed, returning no fields");
                return ExtractedFields::new();
            }
        };

        let mut fields = ExtractedFields::new();
        apply_entities(&mut fields, &entities);

        if let Some(amount) = first_capture(&AMOUNT_PATTERNS, text) {
            fields.set(ExtractedFields::AMOUNT, amount);
        }
        if let Some(date) = first_capture(&DATE_PATTERNS, text) {
            fields.set(ExtractedFields::DATE, date);
        }
        if !fields.contains(ExtractedFields::DEAL_NAME) {
            if let Some(deal) = first_capture(&DEAL_NAME_PATTERNS, text) {
                fields.set(ExtractedFields::DEAL_NAME, deal);
            }
        }

        debug!(count = fields.len(), "Fields extracted");
        fields
    }
}

/// Map grouped entities onto fields: ORG → borrower then bank, LOC → deal
/// name, MISC → account number.
fn apply_entities(fields: &mut ExtractedFields, entities: &[EntityToken]) {
    let mut grouped: HashMap<&EntityGroup, Vec<&str>> = HashMap::new();
    for entity in entities {
        grouped.entry(&entity.group).or_default().push(&entity.word);
    }

    let nth = |group: EntityGroup, n: usize| {
        grouped
            .get(&group)
            .and_then(|words| words.get(n))
            .map(|word| strip_continuation(word))
    };

    if let Some(borrower) = nth(EntityGroup::Org, 0) {
        fields.set(ExtractedFields::BORROWER, borrower);
    }
    if let Some(bank) = nth(EntityGroup::Org, 1) {
        fields.set(ExtractedFields::BANK, bank);
    }
    if let Some(deal) = nth(EntityGroup::Loc, 0) {
        fields.set(ExtractedFields::DEAL_NAME, deal);
    }
    if let Some(account) = nth(EntityGroup::Misc, 0) {
        fields.set(ExtractedFields::ACCOUNT_NUMBER, account);
    }
}

fn strip_continuation(word: &str) -> &str {
    word.strip_prefix(CONTINUATION_MARKER).unwrap_or(word)
}

fn first_capture<'t>(patterns: &[Regex], text: &'t str) -> Option<&'t str> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

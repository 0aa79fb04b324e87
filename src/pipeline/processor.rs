//! Email classifier: runs one email through the full pipeline.
//!
//! Flow:
//! 1. Resolve subject/body (falling back to the first attachment)
//! 2. Request classification and field extraction, concurrently
//! 3. Duplicate check against the shared history (records the email)
//! 4. Result assembly with team routing

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::inference::InferenceEngine;
use crate::pipeline::duplicates::{DuplicateDetector, HistoryStore};
use crate::pipeline::fields::FieldExtractor;
use crate::pipeline::rules::{RequestClassifier, RuleSet};
use crate::pipeline::source;
use crate::pipeline::types::{
    ClassificationResult, EmailDocument, EmailInput, HistoryEntry, RequestType,
};

/// Team that handles anything without a mapping.
pub const DEFAULT_TEAM: &str = "General Team";

/// Team responsible for a request type.
pub fn assigned_team(request_type: RequestType) -> &'static str {
    match request_type {
        RequestType::Adjustment => "Servicing Team",
        RequestType::AuTransfer => "Transfer Team",
        RequestType::ClosingNotice => "Closing Team",
        RequestType::CommitmentChange => "Credit Team",
        RequestType::FeePayment => "Finance Team",
        RequestType::MoneyMovementInbound | RequestType::MoneyMovementOutbound => "Treasury Team",
    }
}

/// Team for a request-type label; unknown labels go to the general team.
pub fn assigned_team_for_label(label: &str) -> &'static str {
    RequestType::from_label(label)
        .map(assigned_team)
        .unwrap_or(DEFAULT_TEAM)
}

/// Classifies emails: request type, fields, duplicate verdict, team.
pub struct EmailClassifier {
    engine: Arc<dyn InferenceEngine>,
    ready: OnceCell<()>,
    classifier: RequestClassifier,
    extractor: FieldExtractor,
    duplicates: DuplicateDetector,
    config: ClassifierConfig,
}

impl EmailClassifier {
    /// Create a classifier with the default rule tables.
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        history: Arc<HistoryStore>,
        config: ClassifierConfig,
    ) -> Self {
        Self::with_rules(engine, history, config, RuleSet::default_rules())
    }

    pub fn with_rules(
        engine: Arc<dyn InferenceEngine>,
        history: Arc<HistoryStore>,
        config: ClassifierConfig,
        rules: RuleSet,
    ) -> Self {
        Self {
            classifier: RequestClassifier::new(Arc::clone(&engine), rules),
            extractor: FieldExtractor::new(Arc::clone(&engine)),
            duplicates: DuplicateDetector::new(history, config.duplicate_threshold),
            ready: OnceCell::new(),
            engine,
            config,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        self.duplicates.history()
    }

    /// Classify a single email.
    ///
    /// The only error is an engine that cannot be initialized; every later
    /// failure degrades to a default value inside the pipeline.
    pub async fn classify(&self, input: EmailInput) -> Result<ClassificationResult> {
        self.ready
            .get_or_try_init(|| async {
                self.engine.warm_up().await?;
                info!(engine = self.engine.name(), "Inference engine ready");
                Ok::<(), crate::error::ModelError>(())
            })
            .await?;

        if !self.config.model_latency.is_zero() {
            tokio::time::sleep(self.config.model_latency).await;
        }

        let document = resolve_document(input);
        let text = document.combined_text();

        let (outcome, extracted_fields) = tokio::join!(
            self.classifier.classify(&text),
            self.extractor.extract(&text),
        );

        let duplicate_reason = self
            .duplicates
            .check_and_record(HistoryEntry::from(&document))
            .await;

        let result = ClassificationResult {
            id: Uuid::new_v4(),
            assigned_team: assigned_team(outcome.request_type).to_string(),
            is_primary_intent: true,
            is_duplicate: duplicate_reason.is_some(),
            duplicate_reason: duplicate_reason.map(str::to_string),
            created_at: Utc::now(),
            document,
            outcome,
            extracted_fields,
        };

        info!(
            id = %result.id,
            request_type = %result.outcome.request_type,
            confidence = result.outcome.confidence_score,
            fields = result.extracted_fields.len(),
            is_duplicate = result.is_duplicate,
            "Email classified"
        );

        Ok(result)
    }

    /// Classify emails one after another, in order.
    ///
    /// Failures are logged and skipped rather than failing the batch.
    pub async fn classify_batch(&self, inputs: Vec<EmailInput>) -> Vec<ClassificationResult> {
        let count = inputs.len();
        info!(count, "Classifying email batch");

        let mut results = Vec::with_capacity(count);
        for input in inputs {
            match self.classify(input).await {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Failed to classify email in batch"),
            }
        }

        info!(classified = results.len(), total = count, "Batch classification complete");
        results
    }
}

/// Use the submitted subject/body, or the first attachment when either is missing.
fn resolve_document(input: EmailInput) -> EmailDocument {
    let attachment_names = input.attachments.iter().map(|a| a.name.clone()).collect();

    let (subject, body) = match input.attachments.first() {
        Some(first) if input.subject.is_empty() || input.body.is_empty() => {
            let extracted = source::extract_from_attachment(first);
            (extracted.subject, extracted.body)
        }
        _ => (input.subject, input.body),
    };

    EmailDocument {
        subject,
        body,
        attachment_names,
    }
}

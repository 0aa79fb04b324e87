//! Shared types for the classification pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

// ── Input ───────────────────────────────────────────────────────────

/// An uploaded file accompanying the email.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "AttachmentPayload")]
pub struct Attachment {
    /// Display name of the file.
    pub name: String,
    /// Raw file contents; `None` when the file could not be read.
    pub data: Option<Vec<u8>>,
}

/// Wire form: a file name plus its text content.
#[derive(Deserialize)]
struct AttachmentPayload {
    name: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<AttachmentPayload> for Attachment {
    fn from(payload: AttachmentPayload) -> Self {
        Self {
            name: payload.name,
            data: payload.content.map(String::into_bytes),
        }
    }
}

impl Attachment {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Some(data.into()),
        }
    }

    /// An attachment whose contents are unavailable.
    pub fn unreadable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    /// Load a file from disk. Read failures produce an unreadable attachment
    /// rather than an error, so classification can still proceed.
    pub async fn load(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match tokio::fs::read(path).await {
            Ok(data) => Self::new(name, data),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read attachment");
                Self::unreadable(name)
            }
        }
    }
}

/// What a caller submits for classification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// The resolved email that was actually classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDocument {
    #[serde(rename = "emailSubject")]
    pub subject: String,
    #[serde(rename = "emailBody")]
    pub body: String,
    #[serde(rename = "attachments")]
    pub attachment_names: Vec<String>,
}

impl EmailDocument {
    /// Subject and body joined the way every text pass sees them.
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }
}

// ── Request taxonomy ────────────────────────────────────────────────

/// Top-level category of a servicing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "Adjustment")]
    Adjustment,
    #[serde(rename = "AU Transfer")]
    AuTransfer,
    #[serde(rename = "Closing Notice")]
    ClosingNotice,
    #[serde(rename = "Commitment Change")]
    CommitmentChange,
    #[serde(rename = "Fee Payment")]
    FeePayment,
    #[serde(rename = "Money Movement-Inbound")]
    MoneyMovementInbound,
    #[serde(rename = "Money Movement - Outbound")]
    MoneyMovementOutbound,
}

impl RequestType {
    pub const ALL: [RequestType; 7] = [
        Self::Adjustment,
        Self::AuTransfer,
        Self::ClosingNotice,
        Self::CommitmentChange,
        Self::FeePayment,
        Self::MoneyMovementInbound,
        Self::MoneyMovementOutbound,
    ];

    /// Display label, identical to the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Adjustment => "Adjustment",
            Self::AuTransfer => "AU Transfer",
            Self::ClosingNotice => "Closing Notice",
            Self::CommitmentChange => "Commitment Change",
            Self::FeePayment => "Fee Payment",
            Self::MoneyMovementInbound => "Money Movement-Inbound",
            Self::MoneyMovementOutbound => "Money Movement - Outbound",
        }
    }

    /// Parse an exact display label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Finer-grained category nested under a `RequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubRequestType {
    #[serde(rename = "Reallocation Fees")]
    ReallocationFees,
    #[serde(rename = "Amendment Fees")]
    AmendmentFees,
    #[serde(rename = "Reallocation Principal")]
    ReallocationPrincipal,
    #[serde(rename = "Cashless Roll")]
    CashlessRoll,
    #[serde(rename = "Decrease")]
    Decrease,
    #[serde(rename = "Increase")]
    Increase,
    #[serde(rename = "Ongoing Fee")]
    OngoingFee,
    #[serde(rename = "Letter of Credit Fee")]
    LetterOfCreditFee,
    #[serde(rename = "Principal")]
    Principal,
    #[serde(rename = "Interest")]
    Interest,
    #[serde(rename = "Principal + Interest")]
    PrincipalInterest,
    #[serde(rename = "Principal+Interest+Fee")]
    PrincipalInterestFee,
    #[serde(rename = "Timebound")]
    Timebound,
    #[serde(rename = "Foreign Currency")]
    ForeignCurrency,
}

impl SubRequestType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReallocationFees => "Reallocation Fees",
            Self::AmendmentFees => "Amendment Fees",
            Self::ReallocationPrincipal => "Reallocation Principal",
            Self::CashlessRoll => "Cashless Roll",
            Self::Decrease => "Decrease",
            Self::Increase => "Increase",
            Self::OngoingFee => "Ongoing Fee",
            Self::LetterOfCreditFee => "Letter of Credit Fee",
            Self::Principal => "Principal",
            Self::Interest => "Interest",
            Self::PrincipalInterest => "Principal + Interest",
            Self::PrincipalInterestFee => "Principal+Interest+Fee",
            Self::Timebound => "Timebound",
            Self::ForeignCurrency => "Foreign Currency",
        }
    }

    /// The only request type this sub-type may appear under.
    pub fn parent(&self) -> RequestType {
        match self {
            Self::ReallocationFees | Self::AmendmentFees | Self::ReallocationPrincipal => {
                RequestType::ClosingNotice
            }
            Self::CashlessRoll | Self::Decrease | Self::Increase => RequestType::CommitmentChange,
            Self::OngoingFee | Self::LetterOfCreditFee => RequestType::FeePayment,
            Self::Principal
            | Self::Interest
            | Self::PrincipalInterest
            | Self::PrincipalInterestFee => RequestType::MoneyMovementInbound,
            Self::Timebound | Self::ForeignCurrency => RequestType::MoneyMovementOutbound,
        }
    }
}

impl fmt::Display for SubRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Output of the request classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_request_type: Option<SubRequestType>,
    pub confidence_score: f32,
}

impl ClassificationOutcome {
    /// Used whenever the scoring engine cannot be reached.
    pub const FALLBACK_SCORE: f32 = 0.5;

    pub fn fallback() -> Self {
        Self {
            request_type: RequestType::Adjustment,
            sub_request_type: None,
            confidence_score: Self::FALLBACK_SCORE,
        }
    }
}

// ── Extracted fields ────────────────────────────────────────────────

/// Structured fields pulled out of the email text.
///
/// A key is present only when a non-empty value was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFields(BTreeMap<String, String>);

impl ExtractedFields {
    pub const DEAL_NAME: &'static str = "dealName";
    pub const BORROWER: &'static str = "borrower";
    pub const AMOUNT: &'static str = "amount";
    pub const DATE: &'static str = "date";
    pub const BANK: &'static str = "bank";
    pub const ACCOUNT_NUMBER: &'static str = "accountNumber";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; empty or whitespace-only values are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ── History ─────────────────────────────────────────────────────────

/// A previously classified email, kept for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub subject: String,
    pub body: String,
}

impl From<&EmailDocument> for HistoryEntry {
    fn from(doc: &EmailDocument) -> Self {
        Self {
            subject: doc.subject.clone(),
            body: doc.body.clone(),
        }
    }
}

// ── Result ──────────────────────────────────────────────────────────

/// Everything the presentation layer shows for one classified email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub id: Uuid,
    #[serde(flatten)]
    pub document: EmailDocument,
    #[serde(flatten)]
    pub outcome: ClassificationOutcome,
    /// Every result is treated as the email's primary intent.
    pub is_primary_intent: bool,
    pub extracted_fields: ExtractedFields,
    pub is_duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_reason: Option<String>,
    pub assigned_team: String,
    pub created_at: DateTime<Utc>,
}

/// Receipt returned by the ticketing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReceipt {
    pub ticket_id: String,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_labels_round_trip() {
        for request_type in RequestType::ALL {
            assert_eq!(RequestType::from_label(request_type.label()), Some(request_type));
            let json = serde_json::to_value(request_type).unwrap();
            assert_eq!(json, request_type.label());
        }
        assert_eq!(RequestType::from_label("Money Movement"), None);
    }

    #[test]
    fn sub_request_type_serializes_as_label() {
        let json = serde_json::to_value(SubRequestType::PrincipalInterestFee).unwrap();
        assert_eq!(json, "Principal+Interest+Fee");
        assert_eq!(
            SubRequestType::PrincipalInterest.parent(),
            RequestType::MoneyMovementInbound
        );
    }

    #[test]
    fn extracted_fields_skip_empty_values() {
        let mut fields = ExtractedFields::new();
        fields.set(ExtractedFields::AMOUNT, "100");
        fields.set(ExtractedFields::BANK, "   ");
        fields.set(ExtractedFields::DATE, "");
        assert_eq!(fields.len(), 1);
        assert!(!fields.contains(ExtractedFields::BANK));
        assert_eq!(fields.get(ExtractedFields::AMOUNT), Some("100"));
    }

    #[test]
    fn attachment_payload_deserializes_text_content() {
        let attachment: Attachment =
            serde_json::from_str(r#"{"name": "a.eml", "content": "Subject: hi\nbody"}"#).unwrap();
        assert_eq!(attachment.name, "a.eml");
        assert_eq!(attachment.data.as_deref(), Some("Subject: hi\nbody".as_bytes()));

        let missing: Attachment = serde_json::from_str(r#"{"name": "b.eml"}"#).unwrap();
        assert!(missing.data.is_none());
    }

    #[tokio::test]
    async fn attachment_load_reads_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.txt");
        tokio::fs::write(&path, "Closing notice").await.unwrap();

        let loaded = Attachment::load(&path).await;
        assert_eq!(loaded.name, "notice.txt");
        assert_eq!(loaded.data.as_deref(), Some("Closing notice".as_bytes()));

        let missing = Attachment::load(&dir.path().join("gone.txt")).await;
        assert_eq!(missing.name, "gone.txt");
        assert!(missing.data.is_none());
    }

    #[test]
    fn result_serializes_with_flattened_fields() {
        let mut fields = ExtractedFields::new();
        fields.set(ExtractedFields::DEAL_NAME, "Project Atlas");
        let result = ClassificationResult {
            id: Uuid::new_v4(),
            document: EmailDocument {
                subject: "Fee".into(),
                body: "Ongoing fee due".into(),
                attachment_names: vec![],
            },
            outcome: ClassificationOutcome {
                request_type: RequestType::FeePayment,
                sub_request_type: Some(SubRequestType::OngoingFee),
                confidence_score: 0.9,
            },
            is_primary_intent: true,
            extracted_fields: fields,
            is_duplicate: false,
            duplicate_reason: None,
            assigned_team: "Finance Team".into(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["emailSubject"], "Fee");
        assert_eq!(json["requestType"], "Fee Payment");
        assert_eq!(json["subRequestType"], "Ongoing Fee");
        assert_eq!(json["extractedFields"]["dealName"], "Project Atlas");
        assert!(json.get("duplicateReason").is_none());

        let back: ClassificationResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}

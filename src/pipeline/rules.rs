//! Keyword rules for request classification.
//!
//! Two ordered tables drive the decision:
//! - request rules: the first rule with any keyword present picks the type
//! - sub-type rules, one list per request type: the first rule whose
//!   keywords are *all* present picks the sub-type
//!
//! Matching is plain substring search over the lower-cased text, so
//! "refund" matches "fund".

use std::sync::Arc;

use tracing::{debug, warn};

use crate::inference::InferenceEngine;
use crate::pipeline::types::{ClassificationOutcome, RequestType, SubRequestType};

/// Picks a request type when any keyword is present.
#[derive(Debug, Clone)]
pub struct RequestRule {
    pub any_of: Vec<&'static str>,
    pub request_type: RequestType,
}

/// Picks a sub-type when every keyword is present.
#[derive(Debug, Clone)]
pub struct SubRequestRule {
    pub all_of: Vec<&'static str>,
    pub sub_request_type: SubRequestType,
}

impl SubRequestRule {
    fn new(all_of: &[&'static str], sub_request_type: SubRequestType) -> Self {
        Self {
            all_of: all_of.to_vec(),
            sub_request_type,
        }
    }
}

/// Ordered keyword tables.
#[derive(Debug, Clone)]
pub struct RuleSet {
    request_rules: Vec<RequestRule>,
    sub_rules: Vec<(RequestType, Vec<SubRequestRule>)>,
    default_type: RequestType,
}

impl RuleSet {
    /// The servicing-desk rule tables.
    pub fn default_rules() -> Self {
        use RequestType as R;
        use SubRequestType as S;

        let request_rules = vec![
            RequestRule {
                any_of: vec!["transfer"],
                request_type: R::AuTransfer,
            },
            RequestRule {
                any_of: vec!["closing", "notice"],
                request_type: R::ClosingNotice,
            },
            RequestRule {
                any_of: vec!["commitment", "change"],
                request_type: R::CommitmentChange,
            },
            RequestRule {
                any_of: vec!["fee", "payment"],
                request_type: R::FeePayment,
            },
            RequestRule {
                any_of: vec!["inbound", "fund"],
                request_type: R::MoneyMovementInbound,
            },
            RequestRule {
                any_of: vec!["outbound", "remit"],
                request_type: R::MoneyMovementOutbound,
            },
        ];

        let sub_rules = vec![
            (
                R::ClosingNotice,
                vec![
                    SubRequestRule::new(&["reallocation fees"], S::ReallocationFees),
                    SubRequestRule::new(&["amendment fees"], S::AmendmentFees),
                    SubRequestRule::new(&["reallocation principal"], S::ReallocationPrincipal),
                ],
            ),
            (
                R::CommitmentChange,
                vec![
                    SubRequestRule::new(&["cashless"], S::CashlessRoll),
                    SubRequestRule::new(&["roll"], S::CashlessRoll),
                    SubRequestRule::new(&["decrease"], S::Decrease),
                    SubRequestRule::new(&["increase"], S::Increase),
                ],
            ),
            (
                R::FeePayment,
                vec![
                    SubRequestRule::new(&["ongoing"], S::OngoingFee),
                    SubRequestRule::new(&["letter of credit"], S::LetterOfCreditFee),
                ],
            ),
            (
                R::MoneyMovementInbound,
                vec![
                    SubRequestRule::new(&["principal", "interest", "fee"], S::PrincipalInterestFee),
                    SubRequestRule::new(&["principal", "interest"], S::PrincipalInterest),
                    SubRequestRule::new(&["principal"], S::Principal),
                    SubRequestRule::new(&["interest"], S::Interest),
                ],
            ),
            (
                R::MoneyMovementOutbound,
                vec![
                    SubRequestRule::new(&["timebound"], S::Timebound),
                    SubRequestRule::new(&["foreign"], S::ForeignCurrency),
                    SubRequestRule::new(&["currency"], S::ForeignCurrency),
                ],
            ),
        ];

        Self {
            request_rules,
            sub_rules,
            default_type: R::Adjustment,
        }
    }

    /// Resolve the request type and sub-type for already lower-cased text.
    pub fn evaluate(&self, lower_text: &str) -> (RequestType, Option<SubRequestType>) {
        let request_type = self
            .request_rules
            .iter()
            .find(|rule| rule.any_of.iter().any(|kw| lower_text.contains(kw)))
            .map(|rule| rule.request_type)
            .unwrap_or(self.default_type);

        (request_type, self.sub_request_for(request_type, lower_text))
    }

    /// Narrow an already resolved request type using its own sub-type list.
    pub fn sub_request_for(
        &self,
        request_type: RequestType,
        lower_text: &str,
    ) -> Option<SubRequestType> {
        self.sub_rules
            .iter()
            .find(|(parent, _)| *parent == request_type)
            .and_then(|(_, rules)| {
                rules
                    .iter()
                    .find(|rule| rule.all_of.iter().all(|kw| lower_text.contains(kw)))
            })
            .map(|rule| rule.sub_request_type)
    }
}

/// Maps email text to a request type, sub-type and confidence score.
pub struct RequestClassifier {
    engine: Arc<dyn InferenceEngine>,
    rules: RuleSet,
}

impl RequestClassifier {
    pub fn new(engine: Arc<dyn InferenceEngine>, rules: RuleSet) -> Self {
        Self { engine, rules }
    }

    /// Classify combined subject + body text.
    ///
    /// The engine score becomes the confidence regardless of its label. If
    /// the engine fails or returns a non-finite score, the outcome is the
    /// Adjustment fallback at 0.5.
    pub async fn classify(&self, text: &str) -> ClassificationOutcome {
        let score = match self.engine.score(text).await {
            Ok(score) => score,
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Scoring failed, using fallback outcome");
                return ClassificationOutcome::fallback();
            }
        };
        if !score.score.is_finite() {
            warn!(
                engine = self.engine.name(),
                score = score.score,
                "Non-finite score, using fallback outcome"
            );
            return ClassificationOutcome::fallback();
        }

        let (request_type, sub_request_type) = self.rules.evaluate(&text.to_lowercase());

        debug!(
            request_type = %request_type,
            sub_request_type = sub_request_type.map(|s| s.label()).unwrap_or(""),
            score = score.score,
            "Request classified"
        );

        ClassificationOutcome {
            request_type,
            sub_request_type,
            confidence_score: score.score.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::inference::{EntityToken, TextScore};

    struct FixedScore(f32);

    #[async_trait::async_trait]
    impl InferenceEngine for FixedScore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(&self, _text: &str) -> Result<TextScore, ModelError> {
            Ok(TextScore {
                label: "NEGATIVE".into(),
                score: self.0,
            })
        }

        async fn extract_entities(&self, _text: &str) -> Result<Vec<EntityToken>, ModelError> {
            Ok(vec![])
        }
    }

    struct BrokenScore;

    #[async_trait::async_trait]
    impl InferenceEngine for BrokenScore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn score(&self, _text: &str) -> Result<TextScore, ModelError> {
            Err(ModelError::InferenceFailed {
                model: "broken".into(),
                reason: "offline".into(),
            })
        }

        async fn extract_entities(&self, _text: &str) -> Result<Vec<EntityToken>, ModelError> {
            Ok(vec![])
        }
    }

    fn evaluate(text: &str) -> (RequestType, Option<SubRequestType>) {
        RuleSet::default_rules().evaluate(&text.to_lowercase())
    }

    #[test]
    fn transfer_resolves_to_au_transfer() {
        assert_eq!(
            evaluate("Please process the AU transfer for this lender"),
            (RequestType::AuTransfer, None)
        );
    }

    #[test]
    fn transfer_wins_over_closing() {
        let (request_type, _) = evaluate("Closing notice and transfer of commitment");
        assert_eq!(request_type, RequestType::AuTransfer);
    }

    #[test]
    fn no_keywords_defaults_to_adjustment() {
        assert_eq!(evaluate("Hello, just checking in"), (RequestType::Adjustment, None));
    }

    #[test]
    fn closing_notice_sub_types_in_order() {
        assert_eq!(
            evaluate("Notice: reallocation fees and amendment fees apply"),
            (RequestType::ClosingNotice, Some(SubRequestType::ReallocationFees))
        );
        assert_eq!(
            evaluate("Closing - amendment fees"),
            (RequestType::ClosingNotice, Some(SubRequestType::AmendmentFees))
        );
        assert_eq!(
            evaluate("Closing - reallocation principal"),
            (RequestType::ClosingNotice, Some(SubRequestType::ReallocationPrincipal))
        );
        assert_eq!(evaluate("Closing soon"), (RequestType::ClosingNotice, None));
    }

    #[test]
    fn commitment_change_sub_types() {
        assert_eq!(
            evaluate("Commitment cashless roll"),
            (RequestType::CommitmentChange, Some(SubRequestType::CashlessRoll))
        );
        assert_eq!(
            evaluate("Commitment roll over"),
            (RequestType::CommitmentChange, Some(SubRequestType::CashlessRoll))
        );
        assert_eq!(
            evaluate("Change: decrease then increase"),
            (RequestType::CommitmentChange, Some(SubRequestType::Decrease))
        );
        assert_eq!(
            evaluate("Commitment increase"),
            (RequestType::CommitmentChange, Some(SubRequestType::Increase))
        );
    }

    #[test]
    fn fee_payment_sub_types() {
        assert_eq!(
            evaluate("Ongoing fee invoice"),
            (RequestType::FeePayment, Some(SubRequestType::OngoingFee))
        );
        assert_eq!(
            evaluate("Payment for the letter of credit"),
            (RequestType::FeePayment, Some(SubRequestType::LetterOfCreditFee))
        );
    }

    #[test]
    fn inbound_combinations_take_precedence() {
        // "fund" with no fee keyword so the request type stays inbound
        assert_eq!(
            evaluate("Inbound wire: principal and interest"),
            (RequestType::MoneyMovementInbound, Some(SubRequestType::PrincipalInterest))
        );
        assert_eq!(
            evaluate("Inbound funds for principal only"),
            (RequestType::MoneyMovementInbound, Some(SubRequestType::Principal))
        );
        assert_eq!(
            evaluate("Inbound interest"),
            (RequestType::MoneyMovementInbound, Some(SubRequestType::Interest))
        );
    }

    #[test]
    fn inbound_principal_interest_fee_beats_pairs_and_singles() {
        // "fee" alone routes to Fee Payment first, so exercise the inbound list directly.
        let rules = RuleSet::default_rules();
        assert_eq!(
            rules.sub_request_for(
                RequestType::MoneyMovementInbound,
                "principal, interest and fee received",
            ),
            Some(SubRequestType::PrincipalInterestFee)
        );
        assert_eq!(
            evaluate("Inbound principal, interest and fee"),
            (RequestType::FeePayment, None)
        );
    }

    #[test]
    fn outbound_sub_types() {
        assert_eq!(
            evaluate("Outbound timebound wire"),
            (RequestType::MoneyMovementOutbound, Some(SubRequestType::Timebound))
        );
        assert_eq!(
            evaluate("Remit in foreign currency"),
            (RequestType::MoneyMovementOutbound, Some(SubRequestType::ForeignCurrency))
        );
    }

    #[test]
    fn sub_type_always_belongs_to_request_type() {
        let samples = [
            "transfer reallocation fees",
            "closing principal interest",
            "change ongoing letter of credit",
            "fee payment cashless",
            "fund principal interest fee",
            "remit foreign decrease",
            "misc text increase",
        ];
        for text in samples {
            let (request_type, sub) = evaluate(text);
            if let Some(sub) = sub {
                assert_eq!(sub.parent(), request_type, "text: {text}");
            }
        }
    }

    #[tokio::test]
    async fn confidence_is_raw_engine_score_regardless_of_label() {
        let classifier = RequestClassifier::new(Arc::new(FixedScore(0.87)), RuleSet::default_rules());
        let outcome = classifier.classify("Outbound remittance").await;
        assert_eq!(outcome.request_type, RequestType::MoneyMovementOutbound);
        assert!((outcome.confidence_score - 0.87).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn engine_failure_falls_back_to_adjustment() {
        let classifier = RequestClassifier::new(Arc::new(BrokenScore), RuleSet::default_rules());
        let outcome = classifier.classify("AU transfer request").await;
        assert_eq!(outcome, ClassificationOutcome::fallback());
        assert!((outcome.confidence_score - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn non_finite_score_falls_back_to_adjustment() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let classifier = RequestClassifier::new(Arc::new(FixedScore(bad)), RuleSet::default_rules());
            let outcome = classifier.classify("AU transfer request").await;
            assert_eq!(outcome, ClassificationOutcome::fallback());

            let json = serde_json::to_value(&outcome).unwrap();
            assert_eq!(json["confidenceScore"], 0.5);
        }
    }
}

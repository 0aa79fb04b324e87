//! Duplicate detection against a bounded rolling history.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::pipeline::types::HistoryEntry;

/// Reason attached to every duplicate verdict.
pub const DUPLICATE_REASON: &str = "Similar email found in the previous submissions";

/// Word-set Jaccard similarity of two texts.
///
/// Tokens are whitespace-separated and lower-cased. Two empty texts have
/// similarity 0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left = word_set(a);
    let right = word_set(b);

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    intersection as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// In-memory FIFO of recently classified emails.
///
/// One store per session; it is never persisted.
pub struct HistoryStore {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl HistoryStore {
    /// Create an empty store. The queue grows on demand, so `capacity` only
    /// bounds the number of entries kept.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Snapshot of the history, oldest first.
    pub async fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        info!("History cleared");
    }
}

/// Flags emails that repeat one of the recent submissions.
pub struct DuplicateDetector {
    history: Arc<HistoryStore>,
    threshold: f64,
}

impl DuplicateDetector {
    pub fn new(history: Arc<HistoryStore>, threshold: f64) -> Self {
        Self { history, threshold }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Decide whether `candidate` duplicates a history entry, then record it.
    ///
    /// The candidate is appended whatever the verdict. The check and the
    /// append happen under one lock, so each call records exactly once.
    pub async fn check_and_record(&self, candidate: HistoryEntry) -> Option<&'static str> {
        let mut entries = self.history.entries.lock().await;

        let is_duplicate = entries.iter().any(|previous| {
            previous.subject == candidate.subject
                || previous.body == candidate.body
                || jaccard_similarity(&previous.body, &candidate.body) > self.threshold
        });

        entries.push_back(candidate);
        while entries.len() > self.history.capacity {
            entries.pop_front();
        }

        debug!(is_duplicate, history_len = entries.len(), "Duplicate check complete");
        is_duplicate.then_some(DUPLICATE_REASON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject: &str, body: &str) -> HistoryEntry {
        HistoryEntry {
            subject: subject.into(),
            body: body.into(),
        }
    }

    #[test]
    fn jaccard_identical_is_one() {
        let text = "Please fund the principal payment";
        assert!((jaccard_similarity(text, text) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_disjoint_is_zero() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn jaccard_empty_is_zero() {
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert_eq!(jaccard_similarity("   ", "\n"), 0.0);
    }

    #[test]
    fn jaccard_is_case_insensitive_and_set_based() {
        // {a, b, c} vs {a, b, d}: 2 shared of 4 total
        assert!((jaccard_similarity("A b C c", "a B d") - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn first_submission_is_never_duplicate() {
        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.7);
        assert_eq!(detector.check_and_record(entry("s", "b")).await, None);
        assert_eq!(detector.history().len().await, 1);
    }

    #[tokio::test]
    async fn exact_subject_match_is_duplicate() {
        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.7);
        detector.check_and_record(entry("Same subject", "one two three")).await;
        let verdict = detector
            .check_and_record(entry("Same subject", "four five six"))
            .await;
        assert_eq!(verdict, Some(DUPLICATE_REASON));
    }

    #[tokio::test]
    async fn exact_body_match_is_duplicate() {
        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.7);
        detector.check_and_record(entry("first", "identical body")).await;
        let verdict = detector.check_and_record(entry("second", "identical body")).await;
        assert!(verdict.is_some());
    }

    #[tokio::test]
    async fn similarity_must_exceed_threshold() {
        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.7);
        // 8 of 10 words shared → 0.8
        detector
            .check_and_record(entry("a", "w1 w2 w3 w4 w5 w6 w7 w8 w9"))
            .await;
        let similar = detector
            .check_and_record(entry("b", "w1 w2 w3 w4 w5 w6 w7 w8 x1"))
            .await;
        assert!(similar.is_some());

        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.5);
        // {p, q} vs {p, r}: 1/3, below threshold
        detector.check_and_record(entry("c", "p q")).await;
        assert!(detector.check_and_record(entry("d", "p r")).await.is_none());
    }

    #[tokio::test]
    async fn similarity_equal_to_threshold_is_not_duplicate() {
        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.7);
        let first = "w1 w2 w3 w4 w5 w6 w7 x1 x2";
        let second = "w1 w2 w3 w4 w5 w6 w7 y1";
        // 7 shared of 10 distinct words: exactly 0.7
        assert_eq!(jaccard_similarity(first, second), 0.7);

        detector.check_and_record(entry("a", first)).await;
        let verdict = detector.check_and_record(entry("b", second)).await;
        assert_eq!(verdict, None);
    }

    #[tokio::test]
    async fn huge_capacity_does_not_preallocate() {
        let history = HistoryStore::new(usize::MAX);
        assert_eq!(history.capacity(), usize::MAX);
        let detector = DuplicateDetector::new(Arc::clone(&history), 0.7);
        detector.check_and_record(entry("s", "b")).await;
        assert_eq!(history.len().await, 1);
    }

    #[tokio::test]
    async fn duplicates_are_still_recorded() {
        let detector = DuplicateDetector::new(HistoryStore::new(20), 0.7);
        detector.check_and_record(entry("s", "b")).await;
        detector.check_and_record(entry("s", "b")).await;
        assert_eq!(detector.history().len().await, 2);
    }

    #[tokio::test]
    async fn oldest_entry_is_evicted_past_capacity() {
        let history = HistoryStore::new(3);
        let detector = DuplicateDetector::new(Arc::clone(&history), 0.7);
        for i in 0..4 {
            detector
                .check_and_record(entry(&format!("subject {i}"), &format!("body{i}")))
                .await;
        }

        let snapshot = history.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].subject, "subject 1");
        assert_eq!(snapshot[2].subject, "subject 3");

        assert!(detector.check_and_record(entry("new", "body0")).await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let history = HistoryStore::new(5);
        let detector = DuplicateDetector::new(Arc::clone(&history), 0.7);
        detector.check_and_record(entry("s", "b")).await;
        history.clear().await;
        assert!(history.is_empty().await);
        assert!(detector.check_and_record(entry("s", "b")).await.is_none());
    }
}

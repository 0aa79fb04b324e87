//! Inference engine abstraction.
//!
//! The pipeline treats the "model" as an opaque capability with two calls:
//! a binary text score and a token-classification pass. `OnnxEngine` runs
//! the exported transformer models; `LexiconEngine` is the deterministic
//! fallback when no model directory is configured. Tests swap in doubles.

mod lexicon;
#[cfg(feature = "onnx")]
mod onnx;

pub use lexicon::LexiconEngine;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Output of the binary scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextScore {
    /// Predicted label (e.g. "POSITIVE"). The pipeline never reads it.
    pub label: String,
    /// Confidence of the predicted label, in [0, 1].
    pub score: f32,
}

/// Entity category produced by the token-classification pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityGroup {
    Org,
    Loc,
    Per,
    Misc,
}

/// A single recognized entity span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityToken {
    pub group: EntityGroup,
    /// Surface text; word-piece engines may prefix continuations with `##`.
    pub word: String,
}

impl EntityToken {
    pub fn new(group: EntityGroup, word: impl Into<String>) -> Self {
        Self {
            group,
            word: word.into(),
        }
    }
}

/// Black-box model capability used by the classifier and field extractor.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// One-time initialization, run lazily before the first classification.
    async fn warm_up(&self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Score the text with a binary classifier.
    async fn score(&self, text: &str) -> Result<TextScore, ModelError>;

    /// Recognize entities in document order.
    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityToken>, ModelError>;
}

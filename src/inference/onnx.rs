//! ONNX Runtime engine for the sentiment and named-entity models.
//!
//! The model directory holds one sub-directory per model:
//!
//! ```text
//! <model_dir>/sentiment/  distilbert-base-uncased-finetuned-sst-2-english
//! <model_dir>/ner/        bert-base-NER
//! ```
//!
//! Each must contain `model.onnx` and `tokenizer.json`. An optional
//! `config.json` supplies the `id2label` table; without it the labels the
//! stock models ship with are used.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tokenizers::{Encoding, Tokenizer};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{EntityGroup, EntityToken, InferenceEngine, TextScore};
use crate::error::ModelError;

/// BERT-family context window.
const MAX_SEQUENCE_LENGTH: usize = 512;

/// Which model a directory holds and how to feed it.
struct ModelSpec {
    name: &'static str,
    dir: &'static str,
    default_labels: &'static [&'static str],
    /// DistilBERT has no segment embeddings; BERT does.
    token_type_ids: bool,
}

static SENTIMENT: ModelSpec = ModelSpec {
    name: "sentiment",
    dir: "sentiment",
    default_labels: &["NEGATIVE", "POSITIVE"],
    token_type_ids: false,
};

static NER: ModelSpec = ModelSpec {
    name: "ner",
    dir: "ner",
    default_labels: &[
        "O", "B-MISC", "I-MISC", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC",
    ],
    token_type_ids: true,
};

/// The subset of a Hugging Face `config.json` we read.
#[derive(Deserialize)]
struct ModelConfig {
    id2label: BTreeMap<usize, String>,
}

/// A loaded session, its tokenizer and output labels.
struct LoadedModel {
    spec: &'static ModelSpec,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
}

/// Raw logits for one input, row-major `[tokens, width]` (one row for
/// sequence classification).
struct Inference {
    encoding: Encoding,
    logits: Vec<f32>,
    width: usize,
}

impl LoadedModel {
    /// Load from a directory containing `model.onnx` and `tokenizer.json`.
    fn load(dir: &Path, spec: &'static ModelSpec) -> Result<Self, ModelError> {
        let unavailable = |reason: String| ModelError::Unavailable {
            model: spec.name.to_string(),
            reason,
        };

        let model_path = dir.join("model.onnx");
        let tokenizer_path = dir.join("tokenizer.json");
        if !model_path.exists() {
            return Err(unavailable(format!("model.onnx not found in {}", dir.display())));
        }
        if !tokenizer_path.exists() {
            return Err(unavailable(format!(
                "tokenizer.json not found in {}",
                dir.display()
            )));
        }

        let session = open_session(&model_path).map_err(|e| unavailable(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| unavailable(format!("load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| unavailable(format!("set truncation: {e}")))?;

        let labels = read_labels(&dir.join("config.json")).unwrap_or_else(|| {
            spec.default_labels.iter().map(|l| l.to_string()).collect()
        });

        info!(model = spec.name, labels = labels.len(), path = %model_path.display(), "Loaded ONNX model");
        Ok(Self {
            spec,
            session: Mutex::new(session),
            tokenizer,
            labels,
        })
    }

    fn failed(&self, reason: impl Display) -> ModelError {
        ModelError::InferenceFailed {
            model: self.spec.name.to_string(),
            reason: reason.to_string(),
        }
    }

    fn label(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{index}"))
    }

    /// Tokenize and run a single text through the session.
    fn infer(&self, text: &str) -> Result<Inference, ModelError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| self.failed(format!("tokenize: {e}")))?;

        let seq_len = encoding.get_ids().len();
        let shape = [1i64, seq_len as i64];
        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        let ids_tensor =
            Tensor::from_array((shape, input_ids.into_boxed_slice())).map_err(|e| self.failed(e))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.into_boxed_slice()))
            .map_err(|e| self.failed(e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| self.failed("session lock poisoned"))?;

        let run = if self.spec.token_type_ids {
            let token_type_ids: Vec<i64> =
                encoding.get_type_ids().iter().map(|&t| t as i64).collect();
            let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))
                .map_err(|e| self.failed(e))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])
        };
        let outputs = run.map_err(|e| self.failed(e))?;

        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| self.failed(e))?;
        let dims: &[i64] = output_shape;
        let width = match dims.last() {
            Some(&w) if w > 0 => w as usize,
            _ => return Err(self.failed(format!("unexpected output shape: {dims:?}"))),
        };

        Ok(Inference {
            encoding,
            logits: output_data.to_vec(),
            width,
        })
    }
}

fn open_session(model_path: &Path) -> Result<Session, ort::Error> {
    Ok(Session::builder()?.commit_from_file(model_path)?)
}

/// Labels from `config.json`, ordered by id. `None` if absent or unreadable.
fn read_labels(path: &Path) -> Option<Vec<String>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ModelConfig>(&raw) {
        Ok(config) if !config.id2label.is_empty() => {
            Some(config.id2label.into_values().collect())
        }
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable model config");
            None
        }
    }
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// Entity group of a BIO tag (`B-ORG`, `I-LOC`, ...). `O` and unknown
/// categories have none.
fn entity_group(tag: &str) -> Option<EntityGroup> {
    let category = tag
        .strip_prefix("B-")
        .or_else(|| tag.strip_prefix("I-"))
        .unwrap_or(tag);
    match category {
        "ORG" => Some(EntityGroup::Org),
        "LOC" => Some(EntityGroup::Loc),
        "PER" => Some(EntityGroup::Per),
        "MISC" => Some(EntityGroup::Misc),
        _ => None,
    }
}

/// Group tagged word pieces by entity category, in document order.
///
/// Each tagged piece becomes one entity; `##` continuation pieces are kept
/// as the tokenizer produced them.
fn group_entities<'a>(tagged: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<EntityToken> {
    tagged
        .into_iter()
        .filter_map(|(word, tag)| entity_group(tag).map(|group| EntityToken::new(group, word)))
        .collect()
}

/// Inference engine backed by ONNX Runtime.
///
/// Sessions load lazily on the first call (or on `warm_up`) and are shared
/// by every later call.
pub struct OnnxEngine {
    model_dir: PathBuf,
    sentiment: OnceCell<Arc<LoadedModel>>,
    ner: OnceCell<Arc<LoadedModel>>,
}

impl OnnxEngine {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            sentiment: OnceCell::new(),
            ner: OnceCell::new(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    async fn model(
        &self,
        cell: &OnceCell<Arc<LoadedModel>>,
        spec: &'static ModelSpec,
    ) -> Result<Arc<LoadedModel>, ModelError> {
        cell.get_or_try_init(|| async {
            let dir = self.model_dir.join(spec.dir);
            let loaded = tokio::task::spawn_blocking(move || LoadedModel::load(&dir, spec))
                .await
                .map_err(|e| ModelError::Unavailable {
                    model: spec.name.to_string(),
                    reason: e.to_string(),
                })??;
            Ok::<_, ModelError>(Arc::new(loaded))
        })
        .await
        .map(Arc::clone)
    }

    async fn run(
        &self,
        cell: &OnceCell<Arc<LoadedModel>>,
        spec: &'static ModelSpec,
        text: &str,
    ) -> Result<(Arc<LoadedModel>, Inference), ModelError> {
        let model = self.model(cell, spec).await?;
        let worker = Arc::clone(&model);
        let text = text.to_string();
        let inference = tokio::task::spawn_blocking(move || worker.infer(&text))
            .await
            .map_err(|e| model.failed(e))??;
        Ok((model, inference))
    }
}

#[async_trait]
impl InferenceEngine for OnnxEngine {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn warm_up(&self) -> Result<(), ModelError> {
        self.model(&self.sentiment, &SENTIMENT).await?;
        self.model(&self.ner, &NER).await?;
        Ok(())
    }

    async fn score(&self, text: &str) -> Result<TextScore, ModelError> {
        let (model, inference) = self.run(&self.sentiment, &SENTIMENT, text).await?;
        let row = inference
            .logits
            .get(..inference.width)
            .ok_or_else(|| model.failed("empty logits"))?;
        let probabilities = softmax(row);
        let (index, score) = argmax(&probabilities).ok_or_else(|| model.failed("no labels"))?;

        let label = model.label(index);
        debug!(label = %label, score, "Sentiment scored");
        Ok(TextScore { label, score })
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<EntityToken>, ModelError> {
        let (model, inference) = self.run(&self.ner, &NER, text).await?;
        let encoding = &inference.encoding;

        let tags: Vec<String> = inference
            .logits
            .chunks(inference.width)
            .map(|row| argmax(row).map(|(i, _)| model.label(i)).unwrap_or_default())
            .collect();

        let tagged = encoding
            .get_tokens()
            .iter()
            .zip(encoding.get_special_tokens_mask())
            .zip(&tags)
            .filter(|((_, special), _)| **special == 0)
            .map(|((token, _), tag)| (token.as_str(), tag.as_str()));

        let entities = group_entities(tagged);
        debug!(count = entities.len(), "Entities recognized");
        Ok(entities)
    }
}

//! CLIP zero-shot classifier via ONNX Runtime.
//!
//! The model is split into a vision encoder and a text encoder, both
//! projecting into the same joint embedding space. Images are classified by
//! the softmax of scaled cosine similarity against a fixed set of prompts.

use crate::pipeline::ModelPaths;
use crate::types::{softmax, Embedding};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use photosecours_advice::Classification;
use std::collections::BTreeMap;
use thiserror::Error;
use tokenizers::Tokenizer;

const CLIP_INPUT_SIZE: u32 = 224;
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];
const CLIP_CONTEXT_LENGTH: usize = 77;
/// exp(logit_scale) of the released ViT-B/32 checkpoint.
const CLIP_LOGIT_SCALE: f32 = 100.0;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("CLIP file not found: {0}")]
    ModelNotFound(String),
    #[error("tokenizer: {0}")]
    Tokenizer(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("prompt set is empty")]
    EmptyPromptSet,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct ClipModel {
    vision: Session,
    text: Session,
    tokenizer: Tokenizer,
    vision_output: usize,
    text_output: usize,
    text_wants_mask: bool,
}

impl ClipModel {
    /// Load the vision encoder, text encoder and tokenizer.
    pub fn load(paths: &ModelPaths) -> Result<Self, ClipError> {
        let vision_path = paths.clip_vision.as_path();
        let text_path = paths.clip_text.as_path();
        let tokenizer_path = paths.clip_tokenizer.as_path();
        for path in [vision_path, text_path, tokenizer_path] {
            if !path.exists() {
                return Err(ClipError::ModelNotFound(path.display().to_string()));
            }
        }

        let vision = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(vision_path)?;
        let text = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(text_path)?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| ClipError::Tokenizer(e.to_string()))?;

        let vision_outputs: Vec<String> = vision.outputs().iter().map(|o| o.name().to_string()).collect();
        let text_outputs: Vec<String> = text.outputs().iter().map(|o| o.name().to_string()).collect();
        let text_inputs: Vec<String> = text.inputs().iter().map(|i| i.name().to_string()).collect();

        tracing::info!(
            vision = %vision_path.display(),
            text = %text_path.display(),
            ?vision_outputs,
            ?text_inputs,
            ?text_outputs,
            "loaded CLIP encoders"
        );

        Ok(Self {
            vision_output: output_index(&vision_outputs, "image_embeds"),
            text_output: output_index(&text_outputs, "text_embeds"),
            text_wants_mask: text_inputs.iter().any(|n| n == "attention_mask"),
            vision,
            text,
            tokenizer,
        })
    }

    /// Embed an image into the joint space (L2-normalised).
    pub fn embed_image(&mut self, image: &RgbImage) -> Result<Embedding, ClipError> {
        let input = pixel_values(image);
        let outputs = self.vision.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[self.vision_output]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::InferenceFailed(format!("image embedding: {e}")))?;

        Ok(Embedding { values: raw.to_vec() }.normalized())
    }

    /// Embed a text prompt into the joint space (L2-normalised).
    pub fn embed_text(&mut self, prompt: &str) -> Result<Embedding, ClipError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ClipError::Tokenizer(e.to_string()))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let (ids, mask) = fit_context(ids);
        let input_ids = Array2::from_shape_vec((1, CLIP_CONTEXT_LENGTH), ids)
            .map_err(|e| ClipError::InferenceFailed(format!("input_ids shape: {e}")))?;

        let outputs = if self.text_wants_mask {
            let mask = Array2::from_shape_vec((1, CLIP_CONTEXT_LENGTH), mask)
                .map_err(|e| ClipError::InferenceFailed(format!("attention_mask shape: {e}")))?;
            self.text.run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(input_ids.view())?,
                "attention_mask" => TensorRef::from_array_view(mask.view())?
            ])?
        } else {
            self.text.run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(input_ids.view())?
            ])?
        };

        let (_, raw) = outputs[self.text_output]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::InferenceFailed(format!("text embedding: {e}")))?;

        Ok(Embedding { values: raw.to_vec() }.normalized())
    }
}

/// Truncate or pad token ids to the fixed context length.
///
/// Returns the ids and the attention mask. Text features are pooled at the
/// end-of-text token, so truncation keeps it last and padding repeats it.
fn fit_context(mut ids: Vec<i64>) -> (Vec<i64>, Vec<i64>) {
    let Some(&eot) = ids.last() else {
        return (vec![0; CLIP_CONTEXT_LENGTH], vec![0; CLIP_CONTEXT_LENGTH]);
    };
    if ids.len() > CLIP_CONTEXT_LENGTH {
        ids.truncate(CLIP_CONTEXT_LENGTH - 1);
        ids.push(eot);
    }
    let len = ids.len();
    let mut mask = vec![1; len];
    ids.resize(CLIP_CONTEXT_LENGTH, eot);
    mask.resize(CLIP_CONTEXT_LENGTH, 0);
    (ids, mask)
}

/// Index of the named output, or 0 when the export uses other names.
fn output_index(names: &[String], wanted: &str) -> usize {
    names.iter().position(|n| n == wanted).unwrap_or(0)
}

/// Shortest-side resize to 224, centre crop, CLIP normalisation, NCHW.
fn pixel_values(image: &RgbImage) -> Array4<f32> {
    let side = CLIP_INPUT_SIZE;
    let (w, h) = image.dimensions();
    let scale = side as f32 / w.min(h).max(1) as f32;
    let rw = ((w as f32 * scale).round() as u32).max(side);
    let rh = ((h as f32 * scale).round() as u32).max(side);

    let resized = image::imageops::resize(image, rw, rh, FilterType::CatmullRom);
    let cropped = image::imageops::crop_imm(&resized, (rw - side) / 2, (rh - side) / 2, side, side).to_image();

    let n = side as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, n, n));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
        }
    }
    tensor
}

/// A fixed set of labelled prompts, embedded once at load time.
pub struct PromptSet {
    labels: Vec<String>,
    embeddings: Vec<Embedding>,
}

impl PromptSet {
    /// Embed every `(label, prompt)` pair.
    pub fn build<I, L, P>(clip: &mut ClipModel, entries: I) -> Result<Self, ClipError>
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: AsRef<str>,
    {
        let mut labels = Vec::new();
        let mut embeddings = Vec::new();
        for (label, prompt) in entries {
            embeddings.push(clip.embed_text(prompt.as_ref())?);
            labels.push(label.into());
        }
        if labels.is_empty() {
            return Err(ClipError::EmptyPromptSet);
        }
        Ok(Self { labels, embeddings })
    }

    /// Build from precomputed embeddings.
    pub fn from_embeddings(entries: Vec<(String, Embedding)>) -> Result<Self, ClipError> {
        if entries.is_empty() {
            return Err(ClipError::EmptyPromptSet);
        }
        let (labels, embeddings) = entries.into_iter().unzip();
        Ok(Self { labels, embeddings })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Probability of each prompt, in label order.
    pub fn probabilities(&self, image: &Embedding) -> Vec<f32> {
        let logits: Vec<f32> = self
            .embeddings
            .iter()
            .map(|e| CLIP_LOGIT_SCALE * image.similarity(e))
            .collect();
        softmax(&logits)
    }

    /// Most probable label, with every label's score.
    pub fn classify(&self, image: &Embedding) -> Classification {
        let probs = self.probabilities(image);
        let best = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);

        let Some(best) = best else {
            return Classification::undetermined();
        };

        Classification {
            category: self.labels[best].clone(),
            confidence: probs[best],
            all_scores: self.labels.iter().cloned().zip(probs.iter().copied()).collect::<BTreeMap<_, _>>(),
        }
    }
}

//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes RGB images into the 640×640 SCRFD input, decodes the three
//! anchor-free stride heads, then applies NMS. Only boxes are decoded; the
//! landmark heads are ignored.

use crate::types::BoundingBox;
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Faces smaller than this (in either dimension, source pixels) are dropped.
pub const MIN_FACE_SIZE: f32 = 30.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("face detection model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Mapping between letterboxed model space and source image space.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    new_w: u32,
    new_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let side = SCRFD_INPUT_SIZE as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
        Self {
            scale,
            pad_x: (SCRFD_INPUT_SIZE - new_w) / 2,
            pad_y: (SCRFD_INPUT_SIZE - new_h) / 2,
            new_w,
            new_h,
        }
    }

    /// Model-space point → source-image point.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x as f32) / self.scale, (y - self.pad_y as f32) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputs = (usize, usize);

pub struct FaceDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = locate_stride_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output tensor mapping");

        Ok(Self { session, stride_outputs })
    }

    /// Detect faces, returning boxes in image coordinates sorted by confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(width, height);
        let input = preprocess(image, &letterbox);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        let faces = finalize(candidates, width, height);

        tracing::debug!(count = faces.len(), width, height, "faces detected");
        Ok(faces)
    }
}

/// Letterbox an RGB image into a normalised NCHW tensor.
///
/// Padding uses the mean value, so it normalises to 0.0.
fn preprocess(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let side = SCRFD_INPUT_SIZE as usize;
    let resized = image::imageops::resize(image, letterbox.new_w, letterbox.new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    tensor
}

/// Locate score/bbox outputs by name ("score_8", "bbox_8", ...).
///
/// Exports with generic numeric names fall back to the standard positional
/// order: [0-2] = scores, [3-5] = bboxes (strides 8, 16, 32).
fn locate_stride_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode the detections of one stride head.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    (0..anchors.min(scores.len()))
        .filter(|&idx| scores[idx] > SCRFD_CONFIDENCE_THRESHOLD)
        .filter_map(|idx| {
            let d = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * s;
            let cy = (cell / grid_w) as f32 * s;

            let (x1, y1) = letterbox.unmap(cx - d[0] * s, cy - d[1] * s);
            let (x2, y2) = letterbox.unmap(cx + d[2] * s, cy + d[3] * s);

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: scores[idx],
            })
        })
        .collect()
}

/// Greedy non-maximum suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| k.iou(&det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Clamp to the image, drop faces under [`MIN_FACE_SIZE`], then suppress
/// overlaps.
fn finalize(candidates: Vec<BoundingBox>, width: u32, height: u32) -> Vec<BoundingBox> {
    let in_image = candidates
        .into_iter()
        .map(|b| clamp_to_image(b, width, height))
        .filter(|b| b.width >= MIN_FACE_SIZE && b.height >= MIN_FACE_SIZE)
        .collect();
    nms(in_image, SCRFD_NMS_THRESHOLD)
}

fn clamp_to_image(b: BoundingBox, width: u32, height: u32) -> BoundingBox {
    let x1 = b.x.clamp(0.0, width as f32);
    let y1 = b.y.clamp(0.0, height as f32);
    let x2 = (b.x + b.width).clamp(0.0, width as f32);
    let y2 = (b.y + b.height).clamp(0.0, height as f32);
    BoundingBox { x: x1, y: y1, width: x2 - x1, height: y2 - y1, confidence: b.confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(1280, 640);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!((lb.new_w, lb.new_h), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let lb = Letterbox::fit(320, 240);
        let (ox, oy) = (100.0f32, 50.0f32);
        let mx = ox * lb.scale + lb.pad_x as f32;
        let my = oy * lb.scale + lb.pad_y as f32;
        let (rx, ry) = lb.unmap(mx, my);
        assert!((rx - ox).abs() < 0.1, "x: {rx} vs {ox}");
        assert!((ry - oy).abs() < 0.1, "y: {ry} vs {oy}");
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let image = RgbImage::from_pixel(64, 32, image::Rgb([255, 255, 255]));
        let lb = Letterbox::fit(64, 32);
        let tensor = preprocess(&image, &lb);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        // Top padding row normalises to zero.
        assert_eq!(tensor[[0, 0, 0, 320]], 0.0);
        // Image content is bright.
        let centre = tensor[[0, 1, 320, 320]];
        assert!((centre - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        let stride = 32usize;
        let lb = Letterbox::fit(640, 640);
        let anchors = (640 / stride) * (640 / stride) * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];

        // Cell (x=2, y=1), first anchor.
        let idx = (20 + 2) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let dets = decode_stride(&scores, &bboxes, stride, &lb);
        assert_eq!(dets.len(), 1);
        let d = dets[0];
        assert!((d.x - 32.0).abs() < 1e-4);
        assert!((d.y - 0.0).abs() < 1e-4);
        assert!((d.width - 64.0).abs() < 1e-4);
        assert!((d.height - 64.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_below_threshold_dropped() {
        let lb = Letterbox::fit(640, 640);
        let scores = vec![0.5f32; 800];
        let bboxes = vec![1.0f32; 3200];
        assert!(decode_stride(&scores, &bboxes, 32, &lb).is_empty());
    }

    #[test]
    fn test_locate_stride_outputs_named() {
        let names: Vec<String> = ["bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(locate_stride_outputs(&names), [(1, 0), (3, 2), (5, 4)]);
    }

    #[test]
    fn test_locate_stride_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(locate_stride_outputs(&names), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_clamp_to_image() {
        let b = clamp_to_image(make_bbox(-10.0, -5.0, 50.0, 50.0, 0.9), 30, 100);
        assert_eq!((b.x, b.y), (0.0, 0.0));
        assert_eq!(b.width, 30.0);
        assert_eq!(b.height, 45.0);
    }

    #[test]
    fn test_finalize_suppresses_on_clamped_boxes() {
        // Only overlap heavily once the first box is clamped to the frame.
        let candidates = vec![
            make_bbox(-200.0, 0.0, 260.0, 60.0, 0.9),
            make_bbox(0.0, 0.0, 60.0, 60.0, 0.8),
            make_bbox(70.0, 70.0, 20.0, 20.0, 0.95),
        ];
        let faces = finalize(candidates, 100, 100);
        assert_eq!(faces.len(), 1);
        assert!((faces[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(faces[0].x, 0.0);
        assert!((faces[0].width - 60.0).abs() < 1e-4);
    }
}

//! Image preprocessing — resizing, face cropping, anonymisation and CLAHE.

use crate::types::BoundingBox;
use image::{imageops, imageops::FilterType, RgbImage};

/// Wound photos are downscaled so their longest side fits this.
pub const WOUND_MAX_SIDE: u32 = 1024;
pub const WOUND_CLAHE_TILES: u32 = 8;
pub const WOUND_CLAHE_CLIP: f32 = 3.0;
/// Gaussian sigma used to blur faces found in wound photos.
pub const FACE_BLUR_SIGMA: f32 = 30.0;

pub const SKIN_INPUT_SIZE: u32 = 224;
pub const SKIN_CLAHE_TILES: u32 = 4;
pub const SKIN_CLAHE_CLIP: f32 = 2.0;
/// Extra border around the detected face, as a fraction of its longest side.
pub const SKIN_FACE_MARGIN: f32 = 0.2;

/// Downscale so that `max(width, height) <= max_side`, keeping aspect ratio.
pub fn limit_size(image: RgbImage, max_side: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_side {
        return image;
    }
    let scale = max_side as f32 / longest as f32;
    let nw = ((w as f32 * scale) as u32).max(1);
    let nh = ((h as f32 * scale) as u32).max(1);
    imageops::resize(&image, nw, nh, FilterType::Triangle)
}

/// Crop a face with a margin of `margin * max(w, h)` on every side, clamped
/// to the image.
pub fn crop_with_margin(image: &RgbImage, face: &BoundingBox, margin: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let pad = (margin * face.width.max(face.height)) as i64;

    let x1 = (face.x as i64 - pad).clamp(0, w as i64) as u32;
    let y1 = (face.y as i64 - pad).clamp(0, h as i64) as u32;
    let x2 = ((face.x + face.width) as i64 + pad).clamp(0, w as i64) as u32;
    let y2 = ((face.y + face.height) as i64 + pad).clamp(0, h as i64) as u32;

    if x2 <= x1 || y2 <= y1 {
        return image.clone();
    }
    imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image()
}

/// Gaussian-blur every face region in place.
pub fn anonymize_faces(image: &mut RgbImage, faces: &[BoundingBox], sigma: f32) {
    let (w, h) = image.dimensions();
    for face in faces {
        let x = (face.x.max(0.0) as u32).min(w);
        let y = (face.y.max(0.0) as u32).min(h);
        let fw = (face.width.max(0.0) as u32).min(w - x);
        let fh = (face.height.max(0.0) as u32).min(h - y);
        if fw == 0 || fh == 0 {
            continue;
        }
        let region = imageops::crop_imm(image, x, y, fw, fh).to_image();
        let blurred = imageops::blur(&region, sigma);
        imageops::replace(image, &blurred, x as i64, y as i64);
    }
}

/// Skin preprocessing: crop around the face (whole image if none), resize
/// to the model input, then a light contrast boost.
pub fn prepare_skin(image: &RgbImage, face: Option<&BoundingBox>) -> RgbImage {
    let region = match face {
        Some(face) => crop_with_margin(image, face, SKIN_FACE_MARGIN),
        None => image.clone(),
    };
    let mut resized = imageops::resize(&region, SKIN_INPUT_SIZE, SKIN_INPUT_SIZE, FilterType::Triangle);
    enhance_contrast(&mut resized, SKIN_CLAHE_TILES, SKIN_CLAHE_CLIP);
    resized
}

/// Contrast-Limited Adaptive Histogram Equalization on luma only.
///
/// Each pixel's BT.601 luma is equalised and the luma delta is added back to
/// all three channels, which leaves chroma (Cb, Cr) unchanged. `clip_limit`
/// is relative to a uniform histogram bin.
pub fn enhance_contrast(image: &mut RgbImage, tiles: u32, clip_limit: f32) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    let original: Vec<u8> = image.pixels().map(|p| luma(p.0)).collect();
    let mut equalized = original.clone();
    clahe(&mut equalized, w as usize, h as usize, tiles.max(1) as usize, clip_limit);

    for ((pixel, &before), &after) in image.pixels_mut().zip(&original).zip(&equalized) {
        let delta = after as i16 - before as i16;
        for c in pixel.0.iter_mut() {
            *c = (*c as i16 + delta).clamp(0, 255) as u8;
        }
    }
}

fn luma([r, g, b]: [u8; 3]) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round().clamp(0.0, 255.0) as u8
}

/// CLAHE over a single 8-bit plane.
fn clahe(plane: &mut [u8], width: usize, height: usize, tiles: usize, clip_limit: f32) {
    let tile_w = width.div_ceil(tiles.min(width));
    let tile_h = height.div_ceil(tiles.min(height));
    let tx = width.div_ceil(tile_w);
    let ty = height.div_ceil(tile_h);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity(tx * ty);
    for row in 0..ty {
        for col in 0..tx {
            let xs = col * tile_w..((col + 1) * tile_w).min(width);
            let ys = row * tile_h..((row + 1) * tile_h).min(height);
            let count = xs.len() * ys.len();

            let mut hist = [0u32; 256];
            for y in ys {
                for x in xs.clone() {
                    hist[plane[y * width + x] as usize] += 1;
                }
            }
            luts.push(clipped_equalization(&mut hist, count, clip_limit));
        }
    }

    for y in 0..height {
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, (ty - 1) as f32);
        let r0 = fy as usize;
        let r1 = (r0 + 1).min(ty - 1);
        let dy = fy - r0 as f32;

        for x in 0..width {
            let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, (tx - 1) as f32);
            let c0 = fx as usize;
            let c1 = (c0 + 1).min(tx - 1);
            let dx = fx - c0 as f32;

            let v = plane[y * width + x] as usize;
            let at = |r: usize, c: usize| luts[r * tx + c][v] as f32;
            let top = at(r0, c0) * (1.0 - dx) + at(r0, c1) * dx;
            let bottom = at(r1, c0) * (1.0 - dx) + at(r1, c1) * dx;

            plane[y * width + x] = (top * (1.0 - dy) + bottom * dy).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Clip a tile histogram, redistribute the excess evenly, and return the
/// equalisation lookup table.
fn clipped_equalization(hist: &mut [u32; 256], count: usize, clip_limit: f32) -> [u8; 256] {
    let clip = ((clip_limit * count as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let scale = 255.0 / count.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, &bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

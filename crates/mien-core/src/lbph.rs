//! LBPH face recognition model.
//!
//! Local Binary Patterns Histograms: each training crop is reduced to a
//! grid of 256-bin LBP histograms, and prediction is nearest-neighbor
//! chi-square distance against the stored histograms. Pure Rust, no
//! native dependencies; the artifact is a JSON document.

use crate::types::{ModelError, Prediction, RecognitionModel};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

// --- Named constants ---
const LBPH_GRID_X: usize = 8;
const LBPH_GRID_Y: usize = 8;
const LBPH_BINS: usize = 256;

/// Persisted model state. One histogram per training sample, with the
/// parallel label sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LbphArtifact {
    grid_x: usize,
    grid_y: usize,
    histograms: Vec<Vec<f32>>,
    labels: Vec<i64>,
}

/// LBPH recognizer (P=8, R=1, 8x8 spatial grid).
///
/// Distances follow the classical LBPH scale: identical crops score 0,
/// same-person crops typically land well under 100, strangers above it.
#[derive(Debug, Default)]
pub struct LbphModel {
    histograms: Vec<Vec<f32>>,
    labels: Vec<i64>,
}

impl LbphModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self) -> bool {
        !self.histograms.is_empty()
    }
}

impl RecognitionModel for LbphModel {
    fn train(&mut self, samples: &[GrayImage], labels: &[i64]) -> Result<(), ModelError> {
        if samples.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                samples: samples.len(),
                labels: labels.len(),
            });
        }
        if samples.is_empty() {
            return Err(ModelError::Untrained);
        }

        // Full retrain: any previous fit is discarded.
        self.histograms = samples.iter().map(spatial_histogram).collect();
        self.labels = labels.to_vec();
        tracing::info!(samples = samples.len(), "LBPH model trained");
        Ok(())
    }

    fn predict(&self, sample: &GrayImage) -> Result<Prediction, ModelError> {
        if self.histograms.is_empty() {
            return Err(ModelError::Untrained);
        }

        let probe = spatial_histogram(sample);

        let mut best_distance = f32::INFINITY;
        let mut best_label = self.labels[0];
        for (hist, &label) in self.histograms.iter().zip(self.labels.iter()) {
            let d = chi_square(hist, &probe);
            if d < best_distance {
                best_distance = d;
                best_label = label;
            }
        }

        Ok(Prediction {
            label: best_label,
            distance: best_distance,
        })
    }

    fn save(&self, path: &Path) -> Result<(), ModelError> {
        let artifact = LbphArtifact {
            grid_x: LBPH_GRID_X,
            grid_y: LBPH_GRID_Y,
            histograms: self.histograms.clone(),
            labels: self.labels.clone(),
        };
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &artifact)?;
        tracing::info!(path = %path.display(), samples = self.labels.len(), "LBPH artifact saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), ModelError> {
        if !path.exists() {
            return Err(ModelError::ArtifactNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        let artifact: LbphArtifact = serde_json::from_reader(BufReader::new(file))?;
        self.histograms = artifact.histograms;
        self.labels = artifact.labels;
        tracing::info!(path = %path.display(), samples = self.labels.len(), "LBPH artifact loaded");
        Ok(())
    }
}

/// Compute the LBP code image over the interior pixels.
///
/// Each interior pixel yields one byte: 8 neighbor comparisons, clockwise
/// from the top-left, MSB first. Returns the code buffer plus its
/// dimensions ((w-2) x (h-2)); images narrower than 3px yield nothing.
fn lbp_codes(img: &GrayImage) -> (Vec<u8>, usize, usize) {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return (Vec::new(), 0, 0);
    }
    let (w, h) = (w as usize, h as usize);
    let data = img.as_raw();

    // (dy, dx) clockwise from top-left.
    const NEIGHBORS: [(isize, isize); 8] = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
        (1, 0),
        (1, -1),
        (0, -1),
    ];

    let mut codes = Vec::with_capacity((w - 2) * (h - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = data[y * w + x];
            let mut code = 0u8;
            for (bit, (dy, dx)) in NEIGHBORS.iter().enumerate() {
                let ny = (y as isize + dy) as usize;
                let nx = (x as isize + dx) as usize;
                if data[ny * w + nx] >= center {
                    code |= 1 << (7 - bit);
                }
            }
            codes.push(code);
        }
    }
    (codes, w - 2, h - 2)
}

/// Concatenated per-cell LBP histograms over an 8x8 grid (raw counts).
fn spatial_histogram(img: &GrayImage) -> Vec<f32> {
    let (codes, w, h) = lbp_codes(img);
    let mut hist = vec![0f32; LBPH_GRID_X * LBPH_GRID_Y * LBPH_BINS];
    if codes.is_empty() {
        return hist;
    }

    let cell_w = (w / LBPH_GRID_X).max(1);
    let cell_h = (h / LBPH_GRID_Y).max(1);

    for y in 0..h {
        for x in 0..w {
            let cx = (x / cell_w).min(LBPH_GRID_X - 1);
            let cy = (y / cell_h).min(LBPH_GRID_Y - 1);
            let cell = cy * LBPH_GRID_X + cx;
            hist[cell * LBPH_BINS + codes[y * w + x] as usize] += 1.0;
        }
    }
    hist
}

/// Chi-square distance against a stored training histogram:
/// sum of (a-b)^2 / a over bins where the training count is non-zero.
fn chi_square(train: &[f32], probe: &[f32]) -> f32 {
    train
        .iter()
        .zip(probe.iter())
        .filter(|(&a, _)| a > 0.0)
        .map(|(&a, &b)| (a - b) * (a - b) / a)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic textured test image: distinct spatial pattern per seed.
    fn textured(seed: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let v = (x.wrapping_mul(31 + seed) ^ y.wrapping_mul(17 + seed * 7)) % 251;
            image::Luma([v as u8])
        })
    }

    #[test]
    fn test_lbp_codes_uniform_image() {
        // All-equal pixels: every neighbor >= center, so every code is 0xFF.
        let img = GrayImage::from_pixel(5, 5, image::Luma([90]));
        let (codes, w, h) = lbp_codes(&img);
        assert_eq!((w, h), (3, 3));
        assert!(codes.iter().all(|&c| c == 0xFF));
    }

    #[test]
    fn test_lbp_codes_bright_center() {
        // Center strictly brighter than all neighbors: code 0.
        let mut img = GrayImage::from_pixel(3, 3, image::Luma([10]));
        img.put_pixel(1, 1, image::Luma([200]));
        let (codes, w, h) = lbp_codes(&img);
        assert_eq!((w, h), (1, 1));
        assert_eq!(codes[0], 0);
    }

    #[test]
    fn test_lbp_codes_tiny_image() {
        let img = GrayImage::new(2, 2);
        let (codes, w, h) = lbp_codes(&img);
        assert!(codes.is_empty());
        assert_eq!((w, h), (0, 0));
    }

    #[test]
    fn test_chi_square_identical_is_zero() {
        let h = vec![3.0, 0.0, 5.0, 1.0];
        assert_eq!(chi_square(&h, &h), 0.0);
    }

    #[test]
    fn test_chi_square_skips_empty_train_bins() {
        // Probe mass in a bin the training histogram never saw is ignored,
        // matching the classical asymmetric definition.
        let train = vec![0.0, 4.0];
        let probe = vec![100.0, 4.0];
        assert_eq!(chi_square(&train, &probe), 0.0);
    }

    #[test]
    fn test_predict_untrained() {
        let model = LbphModel::new();
        let err = model.predict(&textured(1, 64)).unwrap_err();
        assert!(matches!(err, ModelError::Untrained));
    }

    #[test]
    fn test_train_length_mismatch() {
        let mut model = LbphModel::new();
        let samples = vec![textured(1, 64)];
        let err = model.train(&samples, &[1, 2]).unwrap_err();
        assert!(matches!(err, ModelError::LengthMismatch { .. }));
    }

    #[test]
    fn test_predict_exact_match_distance_zero() {
        let mut model = LbphModel::new();
        let samples = vec![textured(1, 64), textured(2, 64)];
        model.train(&samples, &[7, 9]).unwrap();

        let p = model.predict(&textured(2, 64)).unwrap();
        assert_eq!(p.label, 9);
        assert_eq!(p.distance, 0.0);
    }

    #[test]
    fn test_predict_nearest_texture() {
        let mut model = LbphModel::new();
        let samples = vec![textured(1, 64), textured(40, 64)];
        model.train(&samples, &[7, 9]).unwrap();

        // A lightly perturbed copy of texture 1 should still land on label 7.
        let mut probe = textured(1, 64);
        for x in 0..8 {
            probe.put_pixel(x, 0, image::Luma([255]));
        }
        let p = model.predict(&probe).unwrap();
        assert_eq!(p.label, 7);
        assert!(p.distance > 0.0);
    }

    #[test]
    fn test_retrain_replaces_previous_fit() {
        let mut model = LbphModel::new();
        model.train(&[textured(1, 64)], &[7]).unwrap();
        model.train(&[textured(2, 64)], &[9]).unwrap();
        let p = model.predict(&textured(1, 64)).unwrap();
        assert_eq!(p.label, 9, "old samples must not survive a retrain");
    }

    #[test]
    fn test_save_load_preserves_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user7.faceModel.json");

        let mut model = LbphModel::new();
        model.train(&[textured(3, 64)], &[7]).unwrap();
        model.save(&path).unwrap();

        let mut loaded = LbphModel::new();
        loaded.load(&path).unwrap();
        let p = loaded.predict(&textured(3, 64)).unwrap();
        assert_eq!(p.label, 7);
        assert_eq!(p.distance, 0.0);
    }

    #[test]
    fn test_load_missing_artifact() {
        let mut model = LbphModel::new();
        let err = model.load(Path::new("/nonexistent/user1.faceModel.json")).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactNotFound(_)));
    }
}

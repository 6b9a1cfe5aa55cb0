use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A captured single-channel camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    /// View the frame as a `GrayImage` for detection and cropping.
    pub fn to_image(&self) -> Result<GrayImage, FrameError> {
        GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: (self.width * self.height) as usize,
                actual: self.data.len(),
            },
        )
    }

}

/// Rectangular face region within a frame, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Build a `Region` from float box corners, clamped to the frame bounds.
    /// Returns `None` when the clamped rectangle degenerates to zero area.
    pub fn from_corners(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<Self> {
        let x = (x1.max(0.0) as u32).min(frame_w);
        let y = (y1.max(0.0) as u32).min(frame_h);
        let x2 = (x2.max(0.0) as u32).min(frame_w);
        let y2 = (y2.max(0.0) as u32).min(frame_h);
        if x2 <= x || y2 <= y {
            return None;
        }
        Some(Self {
            x,
            y,
            width: x2 - x,
            height: y2 - y,
        })
    }
}

/// Extract the pixels under `region` as a standalone grayscale crop.
pub fn crop_region(image: &GrayImage, region: &Region) -> GrayImage {
    image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}

/// One recognition result: the model's integer label plus a distance.
/// Lower distance means higher confidence; this is a distance, not a
/// similarity score.
#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub label: i64,
    pub distance: f32,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("capture failed: {0}")]
    Capture(String),
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    ArtifactNotFound(String),
    #[error("model has no trained samples")]
    Untrained,
    #[error("samples and labels differ in length: {samples} vs {labels}")]
    LengthMismatch { samples: usize, labels: usize },
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact encode/decode failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Lazily produced, unbounded, non-restartable sequence of frames.
///
/// `Ok(None)` signals exhaustion; implementations release the underlying
/// device on `Drop`.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameError>;
}

/// Face-region detection capability: zero or more rectangles per image.
pub trait RegionDetector {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, DetectorError>;
}

/// Trainable per-identity recognition model with a persistent artifact.
pub trait RecognitionModel {
    /// Fully (re)fit the model over `samples`, labeled by the parallel
    /// `labels` sequence. Replaces any previous fit.
    fn train(&mut self, samples: &[GrayImage], labels: &[i64]) -> Result<(), ModelError>;

    /// Predict the closest known label and its distance for one face crop.
    fn predict(&self, sample: &GrayImage) -> Result<Prediction, ModelError>;

    fn save(&self, path: &std::path::Path) -> Result<(), ModelError>;

    fn load(&mut self, path: &std::path::Path) -> Result<(), ModelError>;
}

/// Cooperative cancellation flag, polled once per loop iteration.
/// There is no preemption mid-frame.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

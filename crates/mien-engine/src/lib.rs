//! mien-engine — enrollment, training, and recognition orchestration.
//!
//! The three session drivers are written purely against the capability
//! contracts in `mien-core` (frame source, region detector, recognition
//! model) plus the identity store, with all paths and thresholds
//! injected through [`PipelineConfig`]. Sessions are single-threaded and
//! blocking; cancellation is cooperative, polled once per frame.

use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod enroll;
pub mod recognize;
pub mod reset;
pub mod train;

pub use config::PipelineConfig;
pub use enroll::{run_enroll, EnrollOutcome, EnrollRequest};
pub use recognize::{gate, run_recognition, Overlay, RecognitionSummary, Verdict};
pub use reset::reset;
pub use train::{run_training, TrainReport};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("store error: {0}")]
    Store(#[from] mien_store::StoreError),
    #[error("frame source error: {0}")]
    Frame(#[from] mien_core::FrameError),
    #[error("detector error: {0}")]
    Detector(#[from] mien_core::DetectorError),
    #[error("recognition model error: {0}")]
    Model(#[from] mien_core::ModelError),
    #[error("image I/O error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile for user {0} could not be read back after registration")]
    ProfileUnavailable(i64),
    #[error("no enrolled profile for user {0}")]
    UnknownIdentity(i64),
    #[error("recognition artifact missing or unreadable: {0}")]
    ArtifactUnavailable(PathBuf),
}

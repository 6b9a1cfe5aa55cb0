//! Training pass: rebuild one identity's recognition artifact from its
//! stored face samples.

use crate::config::PipelineConfig;
use crate::SessionError;
use image::GrayImage;
use mien_core::types::crop_region;
use mien_core::{RecognitionModel, RegionDetector};
use mien_store::{parse_sample_label, IdentityStore};
use std::path::PathBuf;

/// Outcome of one training pass.
#[derive(Debug, Default)]
pub struct TrainReport {
    /// Labeled samples the model was fitted over.
    pub samples: usize,
    /// Stored paths that contributed nothing (unreadable, no face found,
    /// or label mismatch), each logged as a recoverable fault.
    pub skipped: usize,
    /// Artifact written, when at least one sample was collected.
    pub artifact: Option<PathBuf>,
}

/// Fully retrain the recognition model for `stable_id` and overwrite its
/// artifact. Idempotent; repeated calls retrain from scratch.
///
/// A store fault is logged and aborts without error; zero collectable
/// samples is a normal "nothing to train yet" outcome. Individual bad
/// samples are skipped, never session-fatal.
pub fn run_training(
    cfg: &PipelineConfig,
    store: &IdentityStore,
    detector: &mut dyn RegionDetector,
    model: &mut dyn RecognitionModel,
    stable_id: &str,
) -> Result<TrainReport, SessionError> {
    let (labels, paths) = match store.get_images(stable_id) {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::error!(stable_id, error = %e, "could not fetch image references; training aborted");
            return Ok(TrainReport::default());
        }
    };
    tracing::info!(stable_id, count = paths.len(), "training pass started");

    let mut report = TrainReport::default();
    let mut samples: Vec<GrayImage> = Vec::new();
    let mut sample_labels: Vec<i64> = Vec::new();

    for (&label, path) in labels.iter().zip(paths.iter()) {
        match collect_path(detector, label, path) {
            Ok(crops) if !crops.is_empty() => {
                sample_labels.extend(std::iter::repeat(label).take(crops.len()));
                samples.extend(crops);
            }
            Ok(_) => {
                tracing::warn!(path, "no face region found in stored sample, skipping");
                report.skipped += 1;
            }
            Err(reason) => {
                tracing::warn!(path, reason, "skipping stored sample");
                report.skipped += 1;
            }
        }
    }

    if samples.is_empty() {
        tracing::info!(stable_id, skipped = report.skipped, "no samples available for training");
        return Ok(report);
    }

    model.train(&samples, &sample_labels)?;

    // All samples for one stable identity share one numeric label.
    let label = sample_labels[0];
    std::fs::create_dir_all(&cfg.model_dir)?;
    let artifact = cfg.model_artifact_path(label);
    model.save(&artifact)?;

    report.samples = samples.len();
    report.artifact = Some(artifact.clone());
    tracing::info!(
        stable_id,
        label,
        samples = report.samples,
        skipped = report.skipped,
        artifact = %artifact.display(),
        "model trained and saved"
    );
    Ok(report)
}

/// Load one stored sample and re-derive its face crops. Any failure is a
/// per-sample fault described by the returned reason.
fn collect_path(
    detector: &mut dyn RegionDetector,
    label: i64,
    path: &str,
) -> Result<Vec<GrayImage>, &'static str> {
    let img = image::open(path)
        .map_err(|_| "unreadable image")?
        .to_luma8();

    // The stored record is authoritative for the label; the file-name
    // convention is cross-checked so a mixed-up directory surfaces as a
    // detectable fault instead of silently mistraining.
    if let Some(parsed) = parse_sample_label(path) {
        if parsed != label {
            return Err("file name label does not match stored record");
        }
    }

    let regions = detector.detect(&img).map_err(|_| "detector fault")?;
    Ok(regions.iter().map(|r| crop_region(&img, r)).collect())
}

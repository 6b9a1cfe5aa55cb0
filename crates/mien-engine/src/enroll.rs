//! Enrollment session: capture face samples, persist them under the
//! stable identity, then hand off to training.

use crate::config::PipelineConfig;
use crate::train::{run_training, TrainReport};
use crate::SessionError;
use mien_core::types::crop_region;
use mien_core::{CancelToken, FrameSource, RecognitionModel, RegionDetector};
use mien_store::IdentityStore;
use std::path::Path;

/// Caller-supplied identity fields for one enrollment.
#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub numeric_id: i64,
    pub name: String,
    pub age: i64,
    pub role: String,
}

/// What an enrollment session accomplished.
#[derive(Debug)]
pub struct EnrollOutcome {
    /// Face crops written to disk this session.
    pub captured: u32,
    /// Report of the training pass that closes every session;
    /// `None` when training itself failed (already logged).
    pub training: Option<TrainReport>,
}

/// Run one enrollment session to completion.
///
/// Registers (or updates) the user, then consumes frames until the
/// sample quota is reached, the source is exhausted, or `cancel` fires.
/// Whatever way the capture loop ends, including a mid-loop fault, the
/// accumulated samples are persisted as one batch and a training pass is
/// invoked, which no-ops gracefully on empty input.
pub fn run_enroll(
    cfg: &PipelineConfig,
    store: &IdentityStore,
    source: &mut dyn FrameSource,
    detector: &mut dyn RegionDetector,
    model: &mut dyn RecognitionModel,
    cancel: &CancelToken,
    request: &EnrollRequest,
) -> Result<EnrollOutcome, SessionError> {
    store.register_or_update(request.numeric_id, &request.name, request.age, &request.role)?;

    // Fail closed: a profile that cannot be read back right after
    // registration means the store is not trustworthy for this session.
    let profile = store
        .get_profile(request.numeric_id)?
        .ok_or(SessionError::ProfileUnavailable(request.numeric_id))?;

    let sample_dir = cfg.user_image_dir(&profile.stable_id);
    std::fs::create_dir_all(&sample_dir)?;

    tracing::info!(
        user = request.numeric_id,
        stable_id = %profile.stable_id,
        quota = cfg.sample_quota,
        "enrollment session started"
    );

    let mut paths: Vec<String> = Vec::new();
    let mut captured = 0u32;
    let loop_result = capture_loop(
        cfg,
        source,
        detector,
        cancel,
        request.numeric_id,
        &sample_dir,
        &mut paths,
        &mut captured,
    );
    if let Err(e) = &loop_result {
        tracing::error!(error = %e, "capture loop aborted; finalizing session anyway");
    }

    // Unconditional finalize: persist whatever was captured, then train.
    if !paths.is_empty() {
        if let Err(e) = store.add_images(&profile.stable_id, &paths) {
            tracing::error!(error = %e, "failed to persist image batch");
        }
    }

    let training = match run_training(cfg, store, detector, model, &profile.stable_id) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::error!(error = %e, "training failed after enrollment");
            None
        }
    };

    loop_result?;
    tracing::info!(captured, "enrollment session completed");
    Ok(EnrollOutcome { captured, training })
}

/// Pull frames and persist one crop per detected region until the quota
/// fills, the source runs dry, or cancellation is observed.
#[allow(clippy::too_many_arguments)]
fn capture_loop(
    cfg: &PipelineConfig,
    source: &mut dyn FrameSource,
    detector: &mut dyn RegionDetector,
    cancel: &CancelToken,
    numeric_id: i64,
    sample_dir: &Path,
    paths: &mut Vec<String>,
    captured: &mut u32,
) -> Result<(), SessionError> {
    while !cancel.is_cancelled() {
        let Some(frame) = source.next_frame()? else {
            tracing::debug!("frame source exhausted");
            break;
        };
        let gray = frame.to_image()?;

        // Every region counts toward the quota, duplicates included.
        for region in detector.detect(&gray)? {
            *captured += 1;
            let path = sample_dir.join(format!("{numeric_id}.{captured}.jpg"));
            crop_region(&gray, &region).save(&path)?;
            paths.push(path.to_string_lossy().into_owned());
            tracing::debug!(sample = *captured, "face sample stored");

            if *captured >= cfg.sample_quota {
                tracing::info!(quota = cfg.sample_quota, "sample quota reached");
                return Ok(());
            }
        }
    }
    Ok(())
}

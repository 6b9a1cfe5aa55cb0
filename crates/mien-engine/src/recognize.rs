//! Live recognition session: load the per-identity artifact, predict on
//! every detected region, and gate each prediction by distance.

use crate::config::PipelineConfig;
use crate::SessionError;
use mien_core::types::crop_region;
use mien_core::{CancelToken, Frame, FrameSource, Prediction, RecognitionModel, Region, RegionDetector};
use mien_store::{IdentityStore, UserProfile};

/// Decision for one detected region. The rendering layer draws it; the
/// decision itself is made here.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Accepted: distance within the gate and the predicted label is the
    /// requested identity. Carries the profile fields to display.
    Match {
        label: i64,
        distance: f32,
        name: String,
        role: String,
        stable_id: String,
    },
    /// Distance beyond the gate: face does not match.
    Rejected { distance: f32 },
    /// Distance within the gate but the predicted label is not the
    /// requested identity; the face cannot be resolved to this user.
    Unresolvable { distance: f32 },
}

/// Rendering seam: receives each region's verdict for display.
/// `release` is called on every session exit path.
pub trait Overlay {
    fn draw(&mut self, frame: &Frame, region: &Region, verdict: &Verdict);
    fn release(&mut self) {}
}

/// Tally of one recognition session.
#[derive(Debug, Default)]
pub struct RecognitionSummary {
    pub frames: usize,
    pub matches: usize,
    pub rejections: usize,
}

/// Apply the confidence gate: `distance > threshold` rejects, the exact
/// boundary still accepts (lower distance means higher confidence).
pub fn gate(prediction: &Prediction, profile: &UserProfile, threshold: f32) -> Verdict {
    if prediction.distance > threshold {
        Verdict::Rejected {
            distance: prediction.distance,
        }
    } else if prediction.label != profile.numeric_id {
        Verdict::Unresolvable {
            distance: prediction.distance,
        }
    } else {
        Verdict::Match {
            label: prediction.label,
            distance: prediction.distance,
            name: profile.name.clone(),
            role: profile.role.clone(),
            stable_id: profile.stable_id.clone(),
        }
    }
}

/// Run one recognition session for `numeric_id` until cancellation or
/// frame-source exhaustion.
///
/// A missing/corrupt artifact or an unknown identity aborts before any
/// frame is pulled. Inside the loop, faults are logged and the session
/// moves on to the next frame.
#[allow(clippy::too_many_arguments)]
pub fn run_recognition(
    cfg: &PipelineConfig,
    store: &IdentityStore,
    source: &mut dyn FrameSource,
    detector: &mut dyn RegionDetector,
    model: &mut dyn RecognitionModel,
    overlay: &mut dyn Overlay,
    cancel: &CancelToken,
    numeric_id: i64,
) -> Result<RecognitionSummary, SessionError> {
    // Setup faults are fatal to the session, before the loop.
    let artifact = cfg.model_artifact_path(numeric_id);
    if let Err(e) = model.load(&artifact) {
        tracing::error!(user = numeric_id, path = %artifact.display(), error = %e,
            "recognition artifact unavailable");
        return Err(SessionError::ArtifactUnavailable(artifact));
    }

    let profile = store
        .get_profile(numeric_id)?
        .ok_or(SessionError::UnknownIdentity(numeric_id))?;

    tracing::info!(user = numeric_id, name = %profile.name, "recognition session started");

    let mut summary = RecognitionSummary::default();
    let result = frame_loop(cfg, source, detector, model, overlay, cancel, &profile, &mut summary);

    // Unconditional cleanup: the rendering surface is released on every
    // exit path; the frame source releases its device on drop.
    overlay.release();

    result?;
    tracing::info!(
        frames = summary.frames,
        matches = summary.matches,
        rejections = summary.rejections,
        "recognition session ended"
    );
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn frame_loop(
    cfg: &PipelineConfig,
    source: &mut dyn FrameSource,
    detector: &mut dyn RegionDetector,
    model: &mut dyn RecognitionModel,
    overlay: &mut dyn Overlay,
    cancel: &CancelToken,
    profile: &UserProfile,
    summary: &mut RecognitionSummary,
) -> Result<(), SessionError> {
    while !cancel.is_cancelled() {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            // A dead stream would spin forever under log-and-continue;
            // acquisition faults end the session instead.
            Err(e) => {
                tracing::error!(error = %e, "frame acquisition failed, ending session");
                return Err(e.into());
            }
        };
        summary.frames += 1;

        let gray = match frame.to_image() {
            Ok(gray) => gray,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame, skipping");
                continue;
            }
        };

        let regions = match detector.detect(&gray) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!(error = %e, "detection fault, skipping frame");
                continue;
            }
        };

        for region in regions {
            let face = crop_region(&gray, &region);
            let prediction = match model.predict(&face) {
                Ok(prediction) => prediction,
                Err(e) => {
                    tracing::warn!(error = %e, "prediction fault, skipping region");
                    continue;
                }
            };

            let verdict = gate(&prediction, profile, cfg.distance_threshold);
            match verdict {
                Verdict::Match { .. } => summary.matches += 1,
                _ => summary.rejections += 1,
            }
            overlay.draw(&frame, &region, &verdict);
        }
    }
    Ok(())
}

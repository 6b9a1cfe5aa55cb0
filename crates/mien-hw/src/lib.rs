//! mien-hw — camera capture for the enrollment/recognition pipeline.
//!
//! Wraps a V4L2 device as a `mien_core::FrameSource` producing mirrored
//! grayscale frames, and persists the camera selection side file.

pub mod camera;
pub mod frame;
pub mod settings;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo};
pub use settings::{CameraSettings, SettingsError};

//! mien-core — shared pipeline types and capability contracts.
//!
//! Defines the three capability seams the orchestrators are written
//! against (frame source, face-region detector, recognition model) plus
//! two compliant implementations: an LBPH recognizer and an SCRFD
//! detector running via ONNX Runtime.

pub mod lbph;
pub mod scrfd;
pub mod types;

pub use lbph::LbphModel;
pub use scrfd::ScrfdDetector;
pub use types::{
    CancelToken, DetectorError, Frame, FrameError, FrameSource, ModelError, Prediction,
    RecognitionModel, Region, RegionDetector,
};

pub mod arbitration;
pub mod color_utils;
pub mod config;
pub mod deduction;
pub mod edge_map;
pub mod engine;
pub mod error;
pub mod face_detector;
pub mod focus_params;
pub mod geometry;
pub mod image_input;
pub mod metadata;
pub mod onnx_session;
pub mod power_window;
pub mod quality_gate;
pub mod region;
pub mod score;
pub mod vlog;
pub mod yunet;

pub use engine::{FocusEngine, FocusOutcome, FocusReport};
pub use error::FocusError;
pub use face_detector::{FaceDetection, FaceDetector};
pub use focus_params::FocusParams;
pub use quality_gate::QualityGate;

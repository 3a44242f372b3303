pub mod controller;
pub mod detector;
pub mod embedding;
pub mod enrollment;
pub mod matcher;
pub mod onnx;
pub mod pipeline;
pub mod recognizer;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{AccessController, ControllerSettings, DoorStatus, LockState};
pub use detector::{FaceBox, FaceDetector};
pub use embedding::{euclidean_distance, l2_normalize, Embedding};
pub use enrollment::{CaptureOutcome, EnrollmentSession};
pub use matcher::{confidence_from_distance, find_best_match, Gallery, Identity, MatchResult};
pub use pipeline::FacePipeline;
pub use recognizer::FaceRecognizer;
pub use source::{Announcer, EmbeddingSource, Silent, SourceOpener};

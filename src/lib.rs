// Core modules
pub mod core;
pub mod camera;
pub mod storage;
pub mod cli;
pub mod common;

// Re-export commonly used types
pub use common::{Config, DevMode, FaceLockError, Result};
pub use core::{
    AccessController, CaptureOutcome, ControllerSettings, DoorStatus, EnrollmentSession,
    Embedding, FacePipeline, Gallery, Identity, LockState, MatchResult,
    Announcer, EmbeddingSource, Silent, SourceOpener,
};
pub use camera::{Camera, CameraOpener};
pub use storage::{AccessEvent, AccessOutcome, Datastore, FileStore, MemoryStore};

use crate::common::Result;
use crate::core::embedding::Embedding;

/// A live face-embedding feed. Holding one keeps the camera open; dropping
/// it releases the device.
pub trait EmbeddingSource {
    /// Grabs one frame and returns the embedding of the face in it, or
    /// `None` when no face was found. Frame-level failures are
    /// `FaceLockError::Camera`; a lost device is `CameraUnavailable`.
    fn detect(&mut self) -> Result<Option<Embedding>>;
}

/// Camera acquisition.
pub trait SourceOpener {
    fn open(&mut self) -> Result<Box<dyn EmbeddingSource>>;
}

impl<F> SourceOpener for F
where
    F: FnMut() -> Result<Box<dyn EmbeddingSource>>,
{
    fn open(&mut self) -> Result<Box<dyn EmbeddingSource>> {
        self()
    }
}

/// Spoken feedback. Implementations must not fail loudly.
pub trait Announcer {
    fn announce(&self, text: &str);
}

/// Discards every announcement.
pub struct Silent;

impl Announcer for Silent {
    fn announce(&self, _text: &str) {}
}

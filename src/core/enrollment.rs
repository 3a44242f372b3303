use crate::common::{FaceLockError, Result};
use crate::core::embedding::Embedding;
use crate::core::matcher::Identity;
use crate::core::source::{EmbeddingSource, SourceOpener};
use crate::storage::Datastore;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Nothing usable in the frame; the attempt does not count.
    NoFace,
    Captured { count: usize, total: usize },
    /// The last sample was taken and the identity stored.
    Enrolled(Identity),
}

/// Collects a fixed number of embeddings for one new identity.
///
/// The camera stays open from `start` until the identity is committed, the
/// session is cancelled, or it is dropped. Nothing is persisted unless all
/// samples were collected.
pub struct EnrollmentSession<'a> {
    name: String,
    target: usize,
    samples: Vec<Embedding>,
    source: Option<Box<dyn EmbeddingSource>>,
    store: &'a dyn Datastore,
}

impl<'a> EnrollmentSession<'a> {
    /// The name is checked against the store once, here. Another session
    /// enrolling the same name concurrently is not detected.
    pub fn start(
        name: &str,
        store: &'a dyn Datastore,
        opener: &mut dyn SourceOpener,
        sample_count: usize,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FaceLockError::InvalidName("please enter a name".into()));
        }
        if sample_count == 0 {
            return Err(FaceLockError::Config("enrollment needs at least one sample".into()));
        }
        if store.identity_exists(name)? {
            return Err(FaceLockError::DuplicateIdentity(name.to_string()));
        }

        let source = opener.open().map_err(|e| match e {
            FaceLockError::CameraUnavailable(_) => e,
            other => FaceLockError::CameraUnavailable(other.to_string()),
        })?;

        tracing::info!("Starting enrollment for {} ({} samples)", name, sample_count);
        Ok(Self {
            name: name.to_string(),
            target: sample_count,
            samples: Vec::with_capacity(sample_count),
            source: Some(source),
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Takes one sample. Reaching the target commits the identity and closes
    /// the session; a failed commit also closes it and drops the samples.
    pub fn capture(&mut self) -> Result<CaptureOutcome> {
        let source = self.source.as_mut().ok_or(FaceLockError::SessionClosed)?;

        let Some(embedding) = source.detect()? else {
            tracing::debug!("No face detected for {}", self.name);
            return Ok(CaptureOutcome::NoFace);
        };

        self.samples.push(embedding);
        let count = self.samples.len();
        tracing::debug!("Captured sample {}/{} for {}", count, self.target, self.name);

        if count < self.target {
            return Ok(CaptureOutcome::Captured { count, total: self.target });
        }

        self.commit().map(CaptureOutcome::Enrolled)
    }

    fn commit(&mut self) -> Result<Identity> {
        self.source = None;
        let samples = std::mem::take(&mut self.samples);

        match self.store.create_identity(&self.name, samples) {
            Ok(identity) => {
                tracing::info!("Enrolled {} with {} samples", identity.name, identity.embeddings.len());
                Ok(identity)
            }
            Err(e) => {
                tracing::error!("Failed to store identity {}: {}", self.name, e);
                Err(match e {
                    FaceLockError::Persistence(_) => e,
                    other => FaceLockError::Persistence(other.to_string()),
                })
            }
        }
    }

    /// Discards every collected sample and releases the camera.
    pub fn cancel(self) {
        tracing::info!("Enrollment for {} cancelled after {} samples", self.name, self.samples.len());
    }
}

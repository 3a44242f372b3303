use crate::camera::v4l2::Camera;
use crate::common::config::CameraConfig;
use crate::common::{FaceLockError, Result};
use crate::core::embedding::Embedding;
use crate::core::pipeline::FacePipeline;
use crate::core::source::{EmbeddingSource, SourceOpener};
use std::sync::Arc;

/// Live embeddings from a V4L2 camera. The device closes when this drops.
pub struct CameraSource {
    camera: Camera,
    pipeline: Arc<FacePipeline>,
    consecutive_failures: u32,
    max_failures: u32,
}

impl CameraSource {
    pub fn open(config: &CameraConfig, pipeline: Arc<FacePipeline>) -> Result<Self> {
        let mut camera = Camera::new(config)?;
        camera.warm_up()?;
        tracing::info!("Camera ready");

        Ok(Self {
            camera,
            pipeline,
            consecutive_failures: 0,
            max_failures: config.max_capture_failures.max(1),
        })
    }
}

impl EmbeddingSource for CameraSource {
    fn detect(&mut self) -> Result<Option<Embedding>> {
        let frame = match self.camera.capture_frame() {
            Ok(frame) => {
                self.consecutive_failures = 0;
                frame
            }
            Err(e) => {
                self.consecutive_failures += 1;
                return Err(escalate(e, self.consecutive_failures, self.max_failures));
            }
        };

        self.pipeline.embed(&frame)
    }
}

/// Repeated capture failures mean the device is gone.
fn escalate(error: FaceLockError, failures: u32, max_failures: u32) -> FaceLockError {
    if failures >= max_failures {
        FaceLockError::CameraUnavailable(format!(
            "{} consecutive capture failures, last: {}", failures, error
        ))
    } else {
        error
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        tracing::debug!("Closing camera");
    }
}

/// Opens a `CameraSource` per session; models are loaded once and shared.
pub struct CameraOpener {
    config: CameraConfig,
    pipeline: Arc<FacePipeline>,
}

impl CameraOpener {
    pub fn new(config: CameraConfig, pipeline: Arc<FacePipeline>) -> Self {
        Self { config, pipeline }
    }
}

impl SourceOpener for CameraOpener {
    fn open(&mut self) -> Result<Box<dyn EmbeddingSource>> {
        Ok(Box::new(CameraSource::open(&self.config, self.pipeline.clone())?))
    }
}

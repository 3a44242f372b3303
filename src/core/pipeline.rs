use crate::common::{Config, Result};
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::embedding::Embedding;
use crate::core::recognizer::FaceRecognizer;
use image::DynamicImage;

/// Detector and recognizer loaded once and shared by every camera session.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            detector: FaceDetector::new(config)?,
            recognizer: FaceRecognizer::new(config)?,
        })
    }

    pub fn detect(&self, frame: &DynamicImage) -> Result<Vec<FaceBox>> {
        self.detector.detect(frame)
    }

    /// Embedding of the most confident face in `frame`, if any.
    pub fn embed(&self, frame: &DynamicImage) -> Result<Option<Embedding>> {
        let faces = self.detector.detect(frame)?;
        match faces.first() {
            Some(face) => {
                tracing::debug!("Face detected with confidence {:.3}", face.confidence);
                self.recognizer.get_embedding(frame, face).map(Some)
            }
            None => Ok(None),
        }
    }
}

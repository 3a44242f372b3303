use crate::common::{Config, FaceLockError, Result};
use crate::common::config::RecognizerConfig;
use crate::core::detector::FaceBox;
use crate::core::embedding::{l2_normalize, Embedding};
use crate::core::onnx::ModelSession;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::Value;

/// Turns a detected face crop into a unit-length embedding.
pub struct FaceRecognizer {
    model: ModelSession,
    config: RecognizerConfig,
}

impl FaceRecognizer {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            model: ModelSession::load("face_recognizer", &config.models.recognizer_path, config)?,
            config: config.recognizer.clone(),
        })
    }

    pub fn get_embedding(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding> {
        let face_img = crop_face(image, face);
        let resized = face_img.resize_exact(
            self.config.input_size,
            self.config.input_size,
            FilterType::Triangle,
        );

        let input = preprocess_face(&resized, &self.config);
        let cow_array = CowArray::from(input.into_dyn());
        let input_tensor = Value::from_array(self.model.session.allocator(), &cow_array)?;
        let outputs = self.model.session.run(vec![input_tensor])?;

        let mut embedding: Embedding = outputs
            .first()
            .ok_or_else(|| FaceLockError::Model("Recognizer produced no outputs".into()))?
            .try_extract::<f32>()?
            .view()
            .iter()
            .copied()
            .collect();

        if embedding.is_empty() {
            return Err(FaceLockError::Model("Recognizer produced an empty embedding".into()));
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    let width = face.width().max(1.0) as u32;
    let height = face.height().max(1.0) as u32;

    image.crop_imm(x, y, width, height)
}

/// Single-channel input centred on `normalization_value`.
fn preprocess_face(img: &DynamicImage, config: &RecognizerConfig) -> Array4<f32> {
    let gray = img.to_luma8();
    let size = config.input_size as usize;
    let norm = config.normalization_value;
    let mut array = Array4::<f32>::zeros((1, 1, size, size));

    for (x, y, pixel) in gray.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        if x < size && y < size {
            array[[0, 0, y, x]] = (pixel[0] as f32 - norm) / norm;
        }
    }

    array
}

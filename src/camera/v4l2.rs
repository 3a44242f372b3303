use crate::common::config::CameraConfig;
use crate::common::{FaceLockError, Result};
use image::{DynamicImage, ImageBuffer, Luma};
use std::fs;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// A capture device as reported by `Camera::list_all_cameras`.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub formats: Vec<String>,
    pub can_capture: bool,
}

pub struct Camera {
    device: Device,
    format: v4l::Format,
    config: CameraConfig,
}

impl Camera {
    /// Opens and configures the device. Any failure here means the camera
    /// is unavailable.
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let index = config.device_index;
        tracing::info!("Opening camera device {}", index);

        let device = Device::new(index as usize)
            .map_err(|e| FaceLockError::CameraUnavailable(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| FaceLockError::CameraUnavailable(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture ({:?})", index, caps.capabilities);
        }

        let mut fmt = device.format()
            .map_err(|e| FaceLockError::CameraUnavailable(format!("Failed to get format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        if !is_supported(&fmt.fourcc) {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let format = device.format()
            .map_err(|e| FaceLockError::CameraUnavailable(format!("Failed to get final format: {}", e)))?;
        if !is_supported(&format.fourcc) {
            return Err(FaceLockError::CameraUnavailable(format!(
                "Unsupported pixel format {}", format.fourcc
            )));
        }
        if format.width != config.width || format.height != config.height {
            tracing::warn!("Camera resolution {}x{} differs from requested {}x{}",
                           format.width, format.height, config.width, config.height);
        }
        tracing::debug!("Camera format: {}x{} {}", format.width, format.height, format.fourcc);

        Ok(Self { device, format, config: config.clone() })
    }

    /// Discards `warmup_frames` frames so exposure settles.
    pub fn warm_up(&mut self) -> Result<()> {
        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| FaceLockError::CameraUnavailable(format!("Failed to create stream: {}", e)))?;

        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| FaceLockError::CameraUnavailable(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(Duration::from_millis(self.config.warmup_delay_ms));
        }
        Ok(())
    }

    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| FaceLockError::Camera(format!("Failed to create stream: {}", e)))?;

        let (buf, _meta) = stream.next()
            .map_err(|e| FaceLockError::Camera(format!("Failed to capture: {}", e)))?;

        decode_frame(buf, &self.format.fourcc, self.format.width, self.format.height)
    }

    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let path = entry?.path();
            let Some(index) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else {
                continue;
            };
            let Ok(caps) = device.query_caps() else {
                continue;
            };

            let formats = device
                .enum_formats()
                .unwrap_or_default()
                .iter()
                .map(|fmt| fmt.fourcc.to_string())
                .collect();

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                formats,
                can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }
}

fn is_supported(fourcc: &FourCC) -> bool {
    matches!(&fourcc.repr, b"GREY" | b"YUYV" | b"MJPG")
}

/// Converts a raw buffer into an image. Everything downstream works on
/// luma, so YUYV keeps only its Y samples.
pub fn decode_frame(data: &[u8], fourcc: &FourCC, width: u32, height: u32) -> Result<DynamicImage> {
    match &fourcc.repr {
        b"GREY" => {
            let expected = (width * height) as usize;
            let pixels = data.get(..expected)
                .ok_or_else(|| FaceLockError::Camera("Short GREY frame".into()))?;
            let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels.to_vec())
                .ok_or_else(|| FaceLockError::Camera("Failed to create grayscale image buffer".into()))?;
            Ok(DynamicImage::ImageLuma8(buffer))
        }
        b"YUYV" => {
            let expected = (width * height * 2) as usize;
            let frame = data.get(..expected)
                .ok_or_else(|| FaceLockError::Camera("Short YUYV frame".into()))?;
            let luma: Vec<u8> = frame.iter().step_by(2).copied().collect();
            let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, luma)
                .ok_or_else(|| FaceLockError::Camera("Failed to create YUYV image buffer".into()))?;
            Ok(DynamicImage::ImageLuma8(buffer))
        }
        b"MJPG" => image::load_from_memory(data)
            .map_err(|e| FaceLockError::Camera(format!("Failed to decode MJPG frame: {}", e))),
        _ => Err(FaceLockError::Camera(format!("Unsupported format {}", fourcc))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_grey() {
        let data = vec![0, 64, 128, 255];
        let img = decode_frame(&data, &FourCC::new(b"GREY"), 2, 2).unwrap();
        assert_eq!(img.to_luma8().into_raw(), data);
    }

    #[test]
    fn decodes_yuyv_luma() {
        // Y0 U Y1 V per pixel pair.
        let data = vec![10, 128, 20, 128, 30, 128, 40, 128];
        let img = decode_frame(&data, &FourCC::new(b"YUYV"), 2, 2).unwrap();
        assert_eq!(img.to_luma8().into_raw(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn short_frames_are_camera_errors() {
        let err = decode_frame(&[1, 2], &FourCC::new(b"GREY"), 2, 2).unwrap_err();
        assert!(matches!(err, FaceLockError::Camera(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unknown_formats_are_rejected() {
        assert!(decode_frame(&[0; 16], &FourCC::new(b"RGB3"), 2, 2).is_err());
        assert!(!is_supported(&FourCC::new(b"RGB3")));
    }
}

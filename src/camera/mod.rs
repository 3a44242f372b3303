pub mod source;
pub mod v4l2;

pub use source::{CameraOpener, CameraSource};
pub use v4l2::{Camera, CameraInfo};

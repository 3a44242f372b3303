use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceLockError {
    /// The camera could not be opened or was lost mid-session.
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// A single frame could not be captured; the next attempt may succeed.
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Identity already exists: {0}")]
    DuplicateIdentity(String),

    #[error("Invalid identity name: {0}")]
    InvalidName(String),

    #[error("Enrollment session is closed")]
    SessionClosed,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FaceLockError {
    /// Errors that end an active session rather than a single tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FaceLockError::CameraUnavailable(_))
    }

    /// Whether a failed `EnrollmentSession::capture` leaves nothing to retry.
    /// Per-frame detection failures do not count against the session.
    pub fn ends_enrollment(&self) -> bool {
        self.is_fatal() || matches!(self, FaceLockError::Persistence(_) | FaceLockError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lost_camera_is_fatal() {
        assert!(FaceLockError::CameraUnavailable("gone".into()).is_fatal());
        assert!(!FaceLockError::Camera("timeout".into()).is_fatal());
        assert!(!FaceLockError::Model("bad output".into()).is_fatal());
    }

    #[test]
    fn frame_level_failures_do_not_end_enrollment() {
        assert!(!FaceLockError::Camera("timeout".into()).ends_enrollment());
        assert!(!FaceLockError::Model("empty embedding".into()).ends_enrollment());
        assert!(!FaceLockError::Other(anyhow::anyhow!("glitch")).ends_enrollment());

        assert!(FaceLockError::CameraUnavailable("gone".into()).ends_enrollment());
        assert!(FaceLockError::Persistence("disk full".into()).ends_enrollment());
        assert!(FaceLockError::SessionClosed.ends_enrollment());
    }
}

pub type Result<T> = std::result::Result<T, FaceLockError>;

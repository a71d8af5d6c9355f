//! Camera access
//!
//! A [`CaptureSession`] owns an open camera device and releases it when
//! dropped, whether the capture was confirmed, cancelled or failed.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available")]
    NotFound,
    #[error("camera is in use by another application")]
    Busy,
    #[error("not supported by this camera: {0}")]
    Unsupported(String),
    #[error("camera failure: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Photo,
    Video,
}

/// Preview image, RGB8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Encoded output of a confirmed capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Platform camera
#[async_trait]
pub trait Camera: Send + Sync {
    /// Acquire a device. Fails if permission is denied or no device matches.
    async fn open(&self, mode: CaptureMode, facing: Facing) -> Result<Box<dyn CameraDevice>, DeviceError>;
}

/// An acquired camera device
#[async_trait]
pub trait CameraDevice: Send {
    async fn preview_frame(&mut self) -> Result<Frame, DeviceError>;

    /// Take the photo, or finish the recording
    async fn capture(&mut self) -> Result<CapturedBlob, DeviceError>;

    fn set_torch(&mut self, _on: bool) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("torch".to_string()))
    }

    /// Stop every track and hand the device back to the platform
    fn release(&mut self);
}

/// Stand-in for hosts without a camera
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCamera;

#[async_trait]
impl Camera for UnavailableCamera {
    async fn open(&self, _mode: CaptureMode, _facing: Facing) -> Result<Box<dyn CameraDevice>, DeviceError> {
        Err(DeviceError::NotFound)
    }
}

/// An open camera. Dropping it releases the device.
pub struct CaptureSession {
    device: Option<Box<dyn CameraDevice>>,
    mode: CaptureMode,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("mode", &self.mode)
            .field("open", &self.device.is_some())
            .finish()
    }
}

impl CaptureSession {
    pub async fn open(camera: &dyn Camera, mode: CaptureMode, facing: Facing) -> Result<Self, DeviceError> {
        let device = camera.open(mode, facing).await?;
        tracing::debug!(?mode, ?facing, "camera acquired");
        Ok(Self {
            device: Some(device),
            mode,
        })
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    fn device(&mut self) -> Result<&mut Box<dyn CameraDevice>, DeviceError> {
        self.device
            .as_mut()
            .ok_or_else(|| DeviceError::Failed("session already closed".to_string()))
    }

    pub async fn preview(&mut self) -> Result<Frame, DeviceError> {
        self.device()?.preview_frame().await
    }

    pub fn set_torch(&mut self, on: bool) -> Result<(), DeviceError> {
        self.device()?.set_torch(on)
    }

    /// Capture and close the session
    pub async fn confirm(mut self) -> Result<CapturedBlob, DeviceError> {
        self.device()?.capture().await
    }

    /// Close without capturing
    pub fn cancel(self) {}
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            tracing::debug!(mode = ?self.mode, "camera released");
        }
    }
}

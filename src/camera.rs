use crate::config::{CameraConfig, SurfaceConfig};
use crate::cv_utils::{CvImage, CvUtilsError};
use crate::frame::{FrameHandle, FramePool, FrameSource, FrameTensor};
use crate::platform::Platform;
use crate::prediction::Prediction;
use async_trait::async_trait;
use ndarray::Array3;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio,
};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    OpenCameraFailed(opencv::Error),
    #[error("Camera {0} is not available")]
    CameraUnavailable(i32),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(opencv::Error),
    #[error("Failed to convert frame: {0}")]
    ConvertFrameFailed(String),
    #[error("Cv utils error: {0}")]
    CvUtils(#[from] CvUtilsError),
    #[error("OpenCV error: {0}")]
    OpenCvError(opencv::Error),
    #[error("Camera task failed: {0}")]
    TaskFailed(String),
}

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::OpenCvError(err)
    }
}

/// Most recent capture, shared between the sampler and the video feed so the
/// feed never reads the device itself.
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    frame: Arc<Mutex<Option<Mat>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: &Mat) -> Result<(), CameraError> {
        let copy = frame.try_clone()?;
        *self.frame.lock() = Some(copy);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.frame.lock().is_none()
    }

    /// JPEG of the latest frame with boxes and the count drawn on it.
    /// `Ok(None)` until the first frame has been captured.
    pub fn annotated_jpg(
        &self,
        predictions: &[Prediction],
        surface: &SurfaceConfig,
    ) -> Result<Option<Vec<u8>>, CameraError> {
        let frame = match self.frame.lock().as_ref() {
            Some(frame) => frame.try_clone()?,
            None => return Ok(None),
        };

        let mut image = CvImage::from_mat(frame);
        image
            .annotate(predictions, surface)?
            .overlay_count(predictions.len())?;
        Ok(Some(image.to_jpg()?))
    }
}

#[derive(Debug)]
pub struct Camera {
    capture: Arc<Mutex<videoio::VideoCapture>>,
    latest: LatestFrame,
}

impl Camera {
    pub async fn open(camera_config: &CameraConfig, platform: Platform) -> Result<Self, CameraError> {
        let device_index = camera_config.device_index;
        let texture = platform.native_texture_size();

        let capture = tokio::task::spawn_blocking(move || -> Result<_, CameraError> {
            let mut capture = videoio::VideoCapture::new(device_index, videoio::CAP_ANY)
                .map_err(CameraError::OpenCameraFailed)?;
            if !capture.is_opened().map_err(CameraError::OpenCameraFailed)? {
                return Err(CameraError::CameraUnavailable(device_index));
            }
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, texture.width as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, texture.height as f64)?;
            Ok(capture)
        })
        .await
        .map_err(|e| CameraError::TaskFailed(e.to_string()))??;

        tracing::info!(
            "Camera {} opened at {}x{} ({})",
            device_index,
            texture.width,
            texture.height,
            platform.as_str()
        );

        Ok(Self {
            capture: Arc::new(Mutex::new(capture)),
            latest: LatestFrame::new(),
        })
    }

    /// `Ok(None)` when the device had no frame ready. A captured frame also
    /// becomes the latest frame served by the video feed.
    pub async fn capture_frame(&self) -> Result<Option<Mat>, CameraError> {
        let capture = self.capture.clone();
        let latest = self.latest.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<Mat>, CameraError> {
            let mut frame = Mat::default();
            let grabbed = capture
                .lock()
                .read(&mut frame)
                .map_err(CameraError::ReadFrameFailed)?;
            if !grabbed || frame.empty() {
                return Ok(None);
            }
            latest.store(&frame)?;
            Ok(Some(frame))
        })
        .await
        .map_err(|e| CameraError::TaskFailed(e.to_string()))?
    }

    pub async fn get_annotated_frame(
        &self,
        predictions: Vec<Prediction>,
        surface: SurfaceConfig,
    ) -> Result<Option<Vec<u8>>, CameraError> {
        let latest = self.latest.clone();
        tokio::task::spawn_blocking(move || latest.annotated_jpg(&predictions, &surface))
            .await
            .map_err(|e| CameraError::TaskFailed(e.to_string()))?
    }
}

/// Resizes a BGR capture to the surface's tensor shape, in RGB order.
pub fn mat_to_tensor(frame: &Mat, surface: &SurfaceConfig) -> Result<FrameTensor, CameraError> {
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(surface.resize_width as i32, surface.resize_height as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(&resized, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let bytes = rgb.data_bytes()?.to_vec();
    Array3::from_shape_vec(
        (
            surface.resize_height as usize,
            surface.resize_width as usize,
            surface.resize_depth as usize,
        ),
        bytes,
    )
    .map_err(|e| CameraError::ConvertFrameFailed(e.to_string()))
}

pub struct CameraFrames {
    camera: Arc<Camera>,
    pool: FramePool,
    surface: SurfaceConfig,
}

impl CameraFrames {
    pub fn new(camera: Arc<Camera>, pool: FramePool, surface: SurfaceConfig) -> Self {
        Self {
            camera,
            pool,
            surface,
        }
    }
}

#[async_trait]
impl FrameSource for CameraFrames {
    async fn next_frame(&mut self) -> Result<Option<FrameHandle>, CameraError> {
        let Some(frame) = self.camera.capture_frame().await? else {
            return Ok(None);
        };
        let tensor = mat_to_tensor(&frame, &self.surface)?;
        Ok(Some(self.pool.acquire(tensor)))
    }
}

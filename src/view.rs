use crate::{
    bootstrap::{Readiness, ReadinessState},
    camera::Camera,
    config::{CameraConfig, Facing, SurfaceConfig},
    cv_utils::prediction_count_text,
    permission::{LogAlert, PermissionCell, PermissionState},
    platform::{Platform, TextureSize},
    prediction::SharedPredictions,
};
use serde::Serialize;
use std::sync::{Arc, OnceLock};

pub const PLACEHOLDER_MESSAGE: &str = "Awaiting model runtime...";
const PERMISSION_PENDING: &str = "Waiting for camera permission";

/// Configuration of the camera view once it is shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSurface {
    pub facing: Facing,
    pub resize_height: u32,
    pub resize_width: u32,
    pub resize_depth: u32,
    pub texture: TextureSize,
    pub autorender: bool,
}

impl CameraSurface {
    pub fn new(camera: &CameraConfig, surface: &SurfaceConfig, platform: Platform) -> Self {
        Self {
            facing: camera.facing,
            resize_height: surface.resize_height,
            resize_width: surface.resize_width,
            resize_depth: surface.resize_depth,
            texture: platform.native_texture_size(),
            autorender: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum ViewState {
    Placeholder {
        message: String,
    },
    CameraUnavailable {
        reason: String,
    },
    Camera {
        surface: CameraSurface,
        overlay: String,
        predictions: usize,
    },
}

impl ViewState {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ViewState::Placeholder { .. })
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, ViewState::Camera { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSnapshot {
    pub readiness: Readiness,
    pub permission: PermissionState,
    pub alert: Option<String>,
    pub prediction_count: usize,
}

pub fn render(snapshot: &ScreenSnapshot, surface: &CameraSurface) -> ViewState {
    if !snapshot.readiness.is_ready() {
        return ViewState::Placeholder {
            message: PLACEHOLDER_MESSAGE.to_string(),
        };
    }

    match snapshot.permission {
        PermissionState::Granted => ViewState::Camera {
            surface: surface.clone(),
            overlay: prediction_count_text(snapshot.prediction_count),
            predictions: snapshot.prediction_count,
        },
        PermissionState::Denied => ViewState::CameraUnavailable {
            reason: snapshot
                .alert
                .clone()
                .unwrap_or_else(|| "Camera permission denied".to_string()),
        },
        PermissionState::Pending => ViewState::CameraUnavailable {
            reason: PERMISSION_PENDING.to_string(),
        },
    }
}

/// Shared state of the one camera screen.
#[derive(Clone)]
pub struct Screen {
    pub readiness: ReadinessState,
    pub permission: PermissionCell,
    pub alert: LogAlert,
    pub predictions: SharedPredictions,
    pub surface: CameraSurface,
    pub surface_config: SurfaceConfig,
    camera: Arc<OnceLock<Arc<Camera>>>,
}

impl Screen {
    pub fn new(surface: CameraSurface, surface_config: SurfaceConfig) -> Self {
        Self {
            readiness: ReadinessState::new(),
            permission: PermissionCell::new(),
            alert: LogAlert::new(),
            predictions: SharedPredictions::new(),
            surface,
            surface_config,
            camera: Arc::new(OnceLock::new()),
        }
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        ScreenSnapshot {
            readiness: self.readiness.snapshot(),
            permission: self.permission.get(),
            alert: self.alert.message(),
            prediction_count: self.predictions.len(),
        }
    }

    pub fn render(&self) -> ViewState {
        render(&self.snapshot(), &self.surface)
    }

    pub fn attach_camera(&self, camera: Arc<Camera>) -> bool {
        self.camera.set(camera).is_ok()
    }

    pub fn camera(&self) -> Option<Arc<Camera>> {
        self.camera.get().cloned()
    }
}

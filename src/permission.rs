use crate::{errors::ErrorSink, platform::Platform};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

pub const PERMISSION_ALERT: &str = "Sorry, we need camera permissions for this app.";

#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("Failed to query camera permission: {0}")]
    Query(#[from] io::Error),
}

/// What the platform reports for camera access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// What the screen knows about camera access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Pending,
    Granted,
    Denied,
}

impl From<PermissionStatus> for PermissionState {
    fn from(status: PermissionStatus) -> Self {
        match status {
            PermissionStatus::Granted => PermissionState::Granted,
            PermissionStatus::Denied => PermissionState::Denied,
            PermissionStatus::Undetermined => PermissionState::Pending,
        }
    }
}

#[async_trait]
pub trait PermissionProvider: Send + Sync + 'static {
    async fn get_status(&self) -> Result<PermissionStatus, PermissionError>;
    async fn request(&self) -> Result<PermissionStatus, PermissionError>;
}

pub trait AlertSink: Send + Sync + 'static {
    fn show(&self, message: &str);
}

/// Logs alerts and keeps the latest one for the view.
#[derive(Debug, Clone, Default)]
pub struct LogAlert {
    message: Arc<Mutex<Option<String>>>,
}

impl LogAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> Option<String> {
        self.message.lock().clone()
    }
}

impl AlertSink for LogAlert {
    fn show(&self, message: &str) {
        tracing::error!(alert = message, "Alert shown");
        *self.message.lock() = Some(message.to_string());
    }
}

/// Opens the capture device node to learn its status. There is no system
/// dialog on desktop, so a request opens the node again.
#[derive(Debug, Clone)]
pub struct DevicePermissions {
    device_path: PathBuf,
}

impl DevicePermissions {
    pub fn new(device_path: PathBuf) -> Self {
        Self { device_path }
    }

    pub fn for_index(index: i32) -> Self {
        Self::new(PathBuf::from(format!("/dev/video{}", index)))
    }

    async fn open_device(&self) -> Result<PermissionStatus, PermissionError> {
        match tokio::fs::File::open(&self.device_path).await {
            Ok(_) => Ok(PermissionStatus::Granted),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok(PermissionStatus::Denied),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PermissionStatus::Undetermined),
            Err(e) => Err(PermissionError::Query(e)),
        }
    }
}

#[async_trait]
impl PermissionProvider for DevicePermissions {
    async fn get_status(&self) -> Result<PermissionStatus, PermissionError> {
        self.open_device().await
    }

    async fn request(&self) -> Result<PermissionStatus, PermissionError> {
        tracing::info!("Requesting access to {:?}", self.device_path);
        match self.open_device().await? {
            PermissionStatus::Undetermined => Ok(PermissionStatus::Denied),
            status => Ok(status),
        }
    }
}

/// Answers every query with the configured status.
#[derive(Debug, Clone)]
pub struct StaticPermissions {
    status: PermissionStatus,
}

impl StaticPermissions {
    pub fn new(status: PermissionStatus) -> Self {
        Self { status }
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn get_status(&self) -> Result<PermissionStatus, PermissionError> {
        Ok(self.status)
    }

    async fn request(&self) -> Result<PermissionStatus, PermissionError> {
        Ok(self.status)
    }
}

#[derive(Debug, Clone)]
pub struct PermissionCell {
    tx: Arc<watch::Sender<PermissionState>>,
}

impl Default for PermissionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PermissionState::Pending);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: PermissionState) {
        self.tx.send_replace(state);
    }

    pub fn get(&self) -> PermissionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PermissionState> {
        self.tx.subscribe()
    }
}

pub struct PermissionGate<A: AlertSink> {
    provider: Box<dyn PermissionProvider>,
    alert: A,
    platform: Platform,
}

impl<A: AlertSink> PermissionGate<A> {
    pub fn new(provider: Box<dyn PermissionProvider>, alert: A, platform: Platform) -> Self {
        Self {
            provider,
            alert,
            platform,
        }
    }

    /// Runs once per mount. Nothing is retried or remembered.
    #[instrument(skip(self), fields(platform = self.platform.as_str()))]
    pub async fn check(&self) -> Result<PermissionStatus, PermissionError> {
        let status = self.provider.get_status().await?;
        if status == PermissionStatus::Granted {
            tracing::info!("Permissions: GRANTED");
            return Ok(status);
        }
        tracing::info!("Permissions: NOT GRANTED");

        if !self.platform.supports_permission_prompt() {
            return Ok(status);
        }

        let status = self.provider.request().await?;
        if status != PermissionStatus::Granted {
            self.alert.show(PERMISSION_ALERT);
        }

        Ok(status)
    }

    pub async fn run(self, cell: PermissionCell, errors: ErrorSink) {
        match self.check().await {
            Ok(status) => cell.set(status.into()),
            Err(e) => {
                tracing::error!("Permission check failed: {}", e);
                errors.report(e);
            }
        }
    }
}

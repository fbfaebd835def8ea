use crate::frame::FrameTensor;
use crate::prediction::PredictionList;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),
}

#[async_trait]
pub trait Detector: Send + Sync + 'static {
    async fn detect(&self, frame: &FrameTensor) -> Result<PredictionList, DetectionError>;
}

use crate::{
    camera::CameraError,
    config::SamplerConfig,
    errors::ErrorSink,
    frame::{FrameHandle, FrameSource},
    model_service::{DetectionError, Detector},
    prediction::SharedPredictions,
    telemetry::Metrics,
};
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::{
    sync::broadcast,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Detection failed on frame {frame}: {source}")]
    Detection {
        frame: u64,
        #[source]
        source: DetectionError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No frame was pending.
    Empty,
    /// The frame was pulled and released without detection.
    Released,
    Detected { predictions: usize },
}

pub struct FrameSampler {
    frame_counter: u64,
    detect_every: u64,
    detector: Option<Arc<dyn Detector>>,
    predictions: SharedPredictions,
    metrics: Option<Arc<Metrics>>,
    tick: Duration,
}

impl FrameSampler {
    /// `detector` is ignored unless detection is enabled in `config`.
    pub fn new(
        config: &SamplerConfig,
        detector: Option<Arc<dyn Detector>>,
        predictions: SharedPredictions,
    ) -> Self {
        let detector = if config.detection_enabled {
            detector
        } else {
            None
        };

        Self {
            frame_counter: 0,
            detect_every: config.detect_every.max(1),
            detector,
            predictions,
            metrics: None,
            tick: Duration::from_millis(16),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn detection_enabled(&self) -> bool {
        self.detector.is_some()
    }

    /// One loop iteration. The frame is released on every path, including
    /// a failed detection.
    pub async fn step(&mut self, frame: Option<FrameHandle>) -> Result<StepOutcome, SamplerError> {
        let index = self.frame_counter;
        self.frame_counter += 1;

        let Some(frame) = frame else {
            return Ok(StepOutcome::Empty);
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_frame_pulled();
        }

        let outcome = match &self.detector {
            Some(detector) if index % self.detect_every == 0 => {
                let start = Instant::now();
                let result = detector.detect(frame.tensor()).await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_detection_duration(start.elapsed().as_millis() as u64);
                }

                match result {
                    Ok(predictions) => {
                        let count = predictions.len();
                        self.predictions.replace(predictions);
                        if let Some(metrics) = &self.metrics {
                            metrics.record_prediction_count(count);
                        }
                        Ok(StepOutcome::Detected { predictions: count })
                    }
                    Err(source) => Err(SamplerError::Detection {
                        frame: index,
                        source,
                    }),
                }
            }
            _ => Ok(StepOutcome::Released),
        };

        frame.release();
        if let Some(metrics) = &self.metrics {
            metrics.record_frame_released();
        }

        outcome
    }

    /// Pulls one frame per tick until `shutdown_rx` fires. The loop keeps
    /// going on failure. Only the first error of a failing run goes to
    /// `errors`; repeats are logged at debug until a step succeeds again.
    #[instrument(skip_all, fields(detect_every = self.detect_every))]
    pub async fn run<S: FrameSource>(
        mut self,
        mut source: S,
        mut shutdown_rx: broadcast::Receiver<()>,
        errors: ErrorSink,
    ) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            "Frame sampler started, detection {}",
            if self.detection_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );

        let mut failing = false;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("Frame sampler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let result = match source.next_frame().await {
                Ok(frame) => self.step(frame).await,
                Err(e) => Err(SamplerError::from(e)),
            };

            match result {
                Ok(outcome) => {
                    if failing {
                        tracing::info!("Frame sampler recovered at frame {}", self.frame_counter - 1);
                        failing = false;
                    }
                    if let StepOutcome::Detected { predictions } = outcome {
                        tracing::debug!("Frame {}: {} predictions", self.frame_counter - 1, predictions);
                    }
                }
                Err(e) if failing => tracing::debug!("Frame sampler still failing: {}", e),
                Err(e) => {
                    failing = true;
                    errors.report(e);
                }
            }
        }

        tracing::info!("Frame sampler stopped after {} frames", self.frame_counter);
    }
}

use crate::{errors::ErrorSink, labels::LabelsError, model_service::Detector};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to initialize runtime: {0}")]
    Runtime(String),
    #[error("Failed to load model: {0}")]
    Model(String),
    #[error("Failed to load class labels: {0}")]
    Labels(#[from] LabelsError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub runtime_ready: bool,
    pub model_ready: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.runtime_ready && self.model_ready
    }
}

/// Both flags start false and only ever flip to true.
#[derive(Debug, Clone)]
pub struct ReadinessState {
    tx: Arc<watch::Sender<Readiness>>,
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Readiness::default());
        Self { tx: Arc::new(tx) }
    }

    /// Returns `false` if the runtime was already marked ready.
    pub fn mark_runtime_ready(&self) -> bool {
        self.tx.send_if_modified(|readiness| {
            if readiness.runtime_ready {
                return false;
            }
            readiness.runtime_ready = true;
            true
        })
    }

    /// Returns `false` if the model was already marked ready.
    pub fn mark_model_ready(&self) -> bool {
        self.tx.send_if_modified(|readiness| {
            if readiness.model_ready {
                return false;
            }
            readiness.model_ready = true;
            true
        })
    }

    pub fn snapshot(&self) -> Readiness {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.tx.subscribe()
    }
}

/// Holds the loaded detector once the model is ready.
#[derive(Clone, Default)]
pub struct ModelSlot {
    detector: Arc<OnceLock<Arc<dyn Detector>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn fill(&self, detector: Arc<dyn Detector>) -> bool {
        self.detector.set(detector).is_ok()
    }

    pub fn get(&self) -> Option<Arc<dyn Detector>> {
        self.detector.get().cloned()
    }
}

#[async_trait]
pub trait InferenceRuntime: Send + Sync + 'static {
    async fn ready(&self) -> Result<(), BootstrapError>;
}

#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    async fn load(&self) -> Result<Arc<dyn Detector>, BootstrapError>;
}

pub struct Bootstrap<R: InferenceRuntime, L: ModelLoader> {
    runtime: R,
    loader: L,
    readiness: ReadinessState,
    model_slot: ModelSlot,
    errors: ErrorSink,
}

impl<R: InferenceRuntime, L: ModelLoader> Bootstrap<R, L> {
    pub fn new(
        runtime: R,
        loader: L,
        readiness: ReadinessState,
        model_slot: ModelSlot,
        errors: ErrorSink,
    ) -> Self {
        Self {
            runtime,
            loader,
            readiness,
            model_slot,
            errors,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Brings the runtime up, then loads the model. A failed step leaves its
    /// flag, and every flag after it, false.
    #[instrument(skip(self))]
    pub async fn run(self) {
        if let Err(e) = self.runtime.ready().await {
            tracing::error!("Runtime initialization failed: {}", e);
            self.errors.report(e);
            return;
        }
        self.readiness.mark_runtime_ready();
        tracing::info!("Runtime: READY");

        match self.loader.load().await {
            Ok(detector) => {
                if !self.model_slot.fill(detector) {
                    tracing::warn!("Model slot already filled, keeping the first model");
                }
                self.readiness.mark_model_ready();
                tracing::info!("Model: READY");
            }
            Err(e) => {
                tracing::error!("Model loading failed: {}", e);
                self.errors.report(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::FrameTensor, model_service::DetectionError, prediction::PredictionList,
    };

    struct MockRuntime {
        fail: bool,
    }

    #[async_trait]
    impl InferenceRuntime for MockRuntime {
        async fn ready(&self) -> Result<(), BootstrapError> {
            if self.fail {
                return Err(BootstrapError::Runtime("no backend".into()));
            }
            Ok(())
        }
    }

    struct EmptyDetector;

    #[async_trait]
    impl Detector for EmptyDetector {
        async fn detect(&self, _frame: &FrameTensor) -> Result<PredictionList, DetectionError> {
            Ok(vec![])
        }
    }

    struct MockLoader {
        fail: bool,
    }

    #[async_trait]
    impl ModelLoader for MockLoader {
        async fn load(&self) -> Result<Arc<dyn Detector>, BootstrapError> {
            if self.fail {
                return Err(BootstrapError::Model("shard missing".into()));
            }
            Ok(Arc::new(EmptyDetector))
        }
    }

    fn bootstrap(
        runtime_fails: bool,
        model_fails: bool,
    ) -> (Bootstrap<MockRuntime, MockLoader>, ReadinessState, ModelSlot, ErrorSink) {
        let readiness = ReadinessState::new();
        let slot = ModelSlot::new();
        let errors = ErrorSink::new();
        let bootstrap = Bootstrap::new(
            MockRuntime {
                fail: runtime_fails,
            },
            MockLoader { fail: model_fails },
            readiness.clone(),
            slot.clone(),
            errors.clone(),
        );
        (bootstrap, readiness, slot, errors)
    }

    #[tokio::test]
    async fn test_both_steps_succeed() {
        let (bootstrap, readiness, slot, errors) = bootstrap(false, false);
        let mut rx = readiness.subscribe();

        bootstrap.spawn().await.unwrap();

        assert!(readiness.snapshot().is_ready());
        assert!(slot.get().is_some());
        assert_eq!(errors.count(), 0);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().model_ready);
    }

    #[tokio::test]
    async fn test_model_load_rejects() {
        let (bootstrap, readiness, slot, errors) = bootstrap(false, true);

        bootstrap.run().await;

        let snapshot = readiness.snapshot();
        assert!(snapshot.runtime_ready);
        assert!(!snapshot.model_ready);
        assert!(slot.get().is_none());
        assert_eq!(errors.count(), 1);
    }

    #[tokio::test]
    async fn test_missing_model_file_keeps_placeholder() {
        use crate::{
            config::{ModelConfig, ModelSource},
            ort_service::OrtModelLoader,
        };

        let model_config = ModelConfig {
            source: ModelSource::Bundled {
                model_dir: "/nonexistent".into(),
                model_file: "ssd_detector.onnx".into(),
            },
            labels_dir: std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("models"),
            labels_file: "coco_labels.txt".into(),
            min_probability: 0.5,
            iou_threshold: 0.7,
            input_size: 640,
            output_name: "output0".into(),
            num_threads: 1,
        };
        let readiness = ReadinessState::new();
        let slot = ModelSlot::new();
        let errors = ErrorSink::new();
        let bootstrap = Bootstrap::new(
            MockRuntime { fail: false },
            OrtModelLoader::new(&model_config),
            readiness.clone(),
            slot.clone(),
            errors.clone(),
        );

        bootstrap.run().await;

        let snapshot = readiness.snapshot();
        assert!(snapshot.runtime_ready);
        assert!(!snapshot.model_ready);
        assert!(slot.get().is_none());
        assert_eq!(errors.count(), 1);
        assert!(errors.last().unwrap().contains("ssd_detector.onnx"));
    }

    #[tokio::test]
    async fn test_runtime_failure_skips_model() {
        let (bootstrap, readiness, slot, errors) = bootstrap(true, false);

        bootstrap.run().await;

        assert_eq!(readiness.snapshot(), Readiness::default());
        assert!(slot.get().is_none());
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn test_flags_flip_once() {
        let readiness = ReadinessState::new();
        assert!(readiness.mark_runtime_ready());
        assert!(!readiness.mark_runtime_ready());
        assert!(readiness.mark_model_ready());
        assert!(!readiness.mark_model_ready());
        assert!(readiness.snapshot().is_ready());
    }
}

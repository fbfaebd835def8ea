use crate::{
    bootstrap::{BootstrapError, InferenceRuntime, ModelLoader},
    config::{ModelConfig, ModelSource},
    frame::FrameTensor,
    labels::ClassLabels,
    model_service::{DetectionError, Detector},
    prediction::{BoundingBox, Prediction, PredictionList},
};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayD, ArrayViewD, Axis, Ix2, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{Arc, Mutex};
use tracing::instrument;

fn transform_frame(frame: &FrameTensor, input_size: u32) -> Result<Array<f32, Ix4>, DetectionError> {
    let (height, width, depth) = frame.dim();
    if depth != 3 {
        return Err(DetectionError::InvalidFrame(format!(
            "expected 3 channels, got {}",
            depth
        )));
    }

    let raw: Vec<u8> = frame.iter().copied().collect();
    let img = RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
        DetectionError::InvalidFrame(format!("buffer does not match {}x{}", width, height))
    })?;
    let img = image::imageops::resize(&img, input_size, input_size, FilterType::CatmullRom);

    let size = input_size as usize;
    let mut input = Array::zeros((1, 3, size, size));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok(input)
}

#[derive(Debug, Clone)]
struct DecodeOptions {
    min_probability: f32,
    iou_threshold: f32,
    input_size: f32,
    frame_width: f32,
    frame_height: f32,
}

/// Turns a `[1, 4 + classes, anchors]` output into predictions in frame space.
fn decode_output(
    output: ArrayViewD<'_, f32>,
    labels: &ClassLabels,
    options: &DecodeOptions,
) -> Result<PredictionList, DetectionError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(DetectionError::UnexpectedOutput(format!(
            "expected [1, 4 + classes, anchors], got {:?}",
            shape
        )));
    }

    let output = output
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| DetectionError::UnexpectedOutput(e.to_string()))?;
    let rows = output.t();
    let scale_x = options.frame_width / options.input_size;
    let scale_y = options.frame_height / options.input_size;

    let mut candidates = Vec::new();
    for row in rows.axis_iter(Axis(0)) {
        let best = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum });
        let Some((class_id, prob)) = best else {
            continue;
        };

        if prob < options.min_probability {
            continue;
        }

        let bounding_box = BoundingBox::from_center(
            row[0] * scale_x,
            row[1] * scale_y,
            row[2] * scale_x,
            row[3] * scale_y,
        );
        candidates.push((class_id, prob, bounding_box));
    }

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut predictions = Vec::new();
    while !candidates.is_empty() {
        let (class_id, confidence, bounding_box) = candidates.remove(0);
        let color_label = labels.resolve(class_id);
        predictions.push(Prediction {
            bounding_box,
            class_id,
            label: color_label.label,
            confidence,
            color: [color_label.red, color_label.green, color_label.blue],
        });
        candidates.retain(|(_, _, other)| bounding_box.iou(other) < options.iou_threshold);
    }

    Ok(predictions)
}

pub struct OrtDetector {
    session: Arc<Mutex<Session>>,
    labels: ClassLabels,
    output_name: String,
    input_size: u32,
    min_probability: f32,
    iou_threshold: f32,
}

impl OrtDetector {
    pub fn new(session: Session, labels: ClassLabels, model_config: &ModelConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            labels,
            output_name: model_config.output_name.clone(),
            input_size: model_config.input_size,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
        }
    }

    fn run_inference(
        session: &Mutex<Session>,
        output_name: &str,
        input: &Array<f32, Ix4>,
    ) -> Result<ArrayD<f32>, DetectionError> {
        let mut session = session
            .lock()
            .map_err(|e| DetectionError::Inference(format!("session mutex poisoned: {}", e)))?;

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| DetectionError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let (shape, data) = outputs[output_name]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectionError::UnexpectedOutput(format!("failed to extract tensor: {}", e)))?;

        ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| DetectionError::UnexpectedOutput(format!("invalid tensor shape: {}", e)))
    }
}

#[async_trait]
impl Detector for OrtDetector {
    #[instrument(skip(self, frame))]
    async fn detect(&self, frame: &FrameTensor) -> Result<PredictionList, DetectionError> {
        let (frame_height, frame_width, _) = frame.dim();
        let input = transform_frame(frame, self.input_size)?;

        let session = self.session.clone();
        let output_name = self.output_name.clone();
        let outputs = tokio::task::spawn_blocking(move || {
            Self::run_inference(&session, &output_name, &input)
        })
        .await
        .map_err(|e| DetectionError::Inference(format!("inference task failed: {}", e)))??;

        let options = DecodeOptions {
            min_probability: self.min_probability,
            iou_threshold: self.iou_threshold,
            input_size: self.input_size as f32,
            frame_width: frame_width as f32,
            frame_height: frame_height as f32,
        };
        let predictions = decode_output(outputs.view(), &self.labels, &options)?;

        tracing::debug!("Detected {} objects", predictions.len());
        Ok(predictions)
    }
}

#[derive(Debug, Clone)]
pub struct OrtRuntime {
    name: String,
}

impl OrtRuntime {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl InferenceRuntime for OrtRuntime {
    async fn ready(&self) -> Result<(), BootstrapError> {
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ort::Error> {
            ort::init().with_name(name).commit()?;
            Ok(())
        })
        .await
        .map_err(|e| BootstrapError::Runtime(e.to_string()))?
        .map_err(|e| BootstrapError::Runtime(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct OrtModelLoader {
    model_config: ModelConfig,
}

impl OrtModelLoader {
    pub fn new(model_config: &ModelConfig) -> Self {
        Self {
            model_config: model_config.clone(),
        }
    }

    fn build_session(model_config: &ModelConfig) -> Result<Session, ort::Error> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(model_config.num_threads)?;

        match &model_config.source {
            ModelSource::Bundled {
                model_dir,
                model_file,
            } => {
                let path = model_dir.join(model_file);
                tracing::info!("Loading bundled model from {:?}", path);
                builder.commit_from_file(path)
            }
            ModelSource::Remote { url } => {
                tracing::info!("Fetching model from {}", url);
                builder.commit_from_url(url)
            }
        }
    }
}

#[async_trait]
impl ModelLoader for OrtModelLoader {
    async fn load(&self) -> Result<Arc<dyn Detector>, BootstrapError> {
        let model_config = self.model_config.clone();
        if let Some(path) = model_config.get_model_path() {
            if !path.is_file() {
                return Err(BootstrapError::Model(format!(
                    "Model file not found: {:?}",
                    path
                )));
            }
        }
        let labels = ClassLabels::load(&model_config.get_labels_path())?;

        let session = tokio::task::spawn_blocking(move || Self::build_session(&model_config))
            .await
            .map_err(|e| BootstrapError::Model(e.to_string()))?
            .map_err(|e| BootstrapError::Model(e.to_string()))?;

        tracing::info!("Created ONNX session with {} class labels", labels.len());
        Ok(Arc::new(OrtDetector::new(
            session,
            labels,
            &self.model_config,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::ColorLabel;
    use ndarray::Array3;

    fn labels() -> ClassLabels {
        ClassLabels::new(vec![
            ColorLabel {
                label: "person".into(),
                red: 255,
                green: 0,
                blue: 0,
            },
            ColorLabel {
                label: "dog".into(),
                red: 0,
                green: 255,
                blue: 0,
            },
        ])
    }

    fn options() -> DecodeOptions {
        DecodeOptions {
            min_probability: 0.5,
            iou_threshold: 0.7,
            input_size: 640.,
            frame_width: 128.,
            frame_height: 128.,
        }
    }

    #[test]
    fn test_transform_frame() {
        let mut frame = Array3::<u8>::zeros((128, 128, 3));
        frame.slice_mut(ndarray::s![.., .., 0]).fill(255);

        let input = transform_frame(&frame, 64).unwrap();

        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert!((input[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!(input[[0, 1, 10, 10]].abs() < 1e-3);
    }

    #[test]
    fn test_transform_rejects_grayscale() {
        let frame = Array3::<u8>::zeros((8, 8, 1));
        assert!(matches!(
            transform_frame(&frame, 64),
            Err(DetectionError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decode_output_applies_threshold_and_nms() {
        // rows: xc, yc, w, h, p(person), p(dog); columns are anchors
        let anchors = [
            [320., 320., 64., 64., 0.9, 0.1],
            [322., 320., 64., 64., 0.8, 0.1],
            [100., 100., 32., 32., 0.2, 0.75],
            [500., 500., 32., 32., 0.3, 0.2],
        ];
        let mut output = Array3::<f32>::zeros((1, 6, anchors.len()));
        for (anchor, values) in anchors.iter().enumerate() {
            for (feature, value) in values.iter().enumerate() {
                output[[0, feature, anchor]] = *value;
            }
        }
        let output = output.into_dyn();

        let predictions = decode_output(output.view(), &labels(), &options()).unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].label, "person");
        assert!((predictions[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(predictions[1].label, "dog");
        assert_eq!(predictions[1].color, [0, 255, 0]);

        let bbox = predictions[0].bounding_box;
        assert!((bbox.x - 57.6).abs() < 1e-3);
        assert!((bbox.width - 12.8).abs() < 1e-3);
    }

    #[test]
    fn test_decode_output_rejects_bad_shape() {
        let output = Array3::<f32>::zeros((1, 4, 10)).into_dyn();
        assert!(matches!(
            decode_output(output.view(), &labels(), &options()),
            Err(DetectionError::UnexpectedOutput(_))
        ));
    }

    fn bundled_config(model_dir: &str) -> ModelConfig {
        ModelConfig {
            source: ModelSource::Bundled {
                model_dir: model_dir.into(),
                model_file: "missing.onnx".into(),
            },
            labels_dir: std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("models"),
            labels_file: "coco_labels.txt".into(),
            min_probability: 0.5,
            iou_threshold: 0.7,
            input_size: 640,
            output_name: "output0".into(),
            num_threads: 1,
        }
    }

    #[tokio::test]
    async fn test_loader_rejects_missing_bundled_model() {
        let loader = OrtModelLoader::new(&bundled_config("/nonexistent"));

        match loader.load().await {
            Err(BootstrapError::Model(message)) => {
                assert!(message.contains("missing.onnx"));
            }
            Err(other) => panic!("expected model error, got {:?}", other),
            Ok(_) => panic!("expected model error, got a detector"),
        }
    }
}

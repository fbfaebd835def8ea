use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Axis-aligned box in the resized tensor's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn from_center(xc: f32, yc: f32, width: f32, height: f32) -> Self {
        Self {
            x: xc - width / 2.,
            y: yc - height / 2.,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.) * self.height.max(0.)
    }

    fn intersection(&self, other: &BoundingBox) -> f32 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        w.max(0.) * h.max(0.)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0. {
            return 0.;
        }
        intersection / union
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub bounding_box: BoundingBox,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub color: [u8; 3],
}

pub type PredictionList = Vec<Prediction>;

/// Written by the frame sampler, read by the view.
#[derive(Debug, Clone, Default)]
pub struct SharedPredictions {
    inner: Arc<RwLock<PredictionList>>,
}

impl SharedPredictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, predictions: PredictionList) {
        *self.inner.write() = predictions;
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> PredictionList {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = BoundingBox {
            x: 0.,
            y: 0.,
            width: 10.,
            height: 10.,
        };
        let b = BoundingBox {
            x: 5.,
            y: 0.,
            width: 10.,
            height: 10.,
        };
        let far = BoundingBox {
            x: 50.,
            y: 50.,
            width: 1.,
            height: 1.,
        };

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(a.iou(&far), 0.);
    }

    #[test]
    fn test_from_center() {
        let bbox = BoundingBox::from_center(10., 20., 4., 6.);
        assert_eq!(bbox.x, 8.);
        assert_eq!(bbox.y, 17.);
        assert_eq!(bbox.right(), 12.);
        assert_eq!(bbox.bottom(), 23.);
    }

    #[test]
    fn test_shared_predictions_replace() {
        let shared = SharedPredictions::new();
        assert!(shared.is_empty());

        shared.replace(vec![Prediction {
            bounding_box: BoundingBox::from_center(1., 1., 2., 2.),
            class_id: 0,
            label: "person".into(),
            confidence: 0.9,
            color: [255, 0, 0],
        }]);

        assert_eq!(shared.len(), 1);
        assert_eq!(shared.snapshot()[0].label, "person");
    }
}

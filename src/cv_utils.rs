use crate::config::SurfaceConfig;
use crate::prediction::Prediction;
use opencv::{
    core::{Mat, Point, Rect, Scalar, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvUtilsError {
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(opencv::Error),
    #[error("OpenCV error: {0}")]
    OpenCvError(opencv::Error),
}

impl From<opencv::Error> for CvUtilsError {
    fn from(err: opencv::Error) -> Self {
        CvUtilsError::OpenCvError(err)
    }
}

pub struct CvImage {
    pub mat: Mat,
}

impl CvImage {
    pub fn from_mat(mat: Mat) -> Self {
        Self { mat }
    }

    pub fn to_jpg(&self) -> Result<Vec<u8>, CvUtilsError> {
        let mut buf = Vector::<u8>::new();
        imgcodecs::imencode(".jpg", &self.mat, &mut buf, &Vector::new())
            .map_err(CvUtilsError::EncodeFrameFailed)?;
        Ok(buf.into())
    }

    /// Draws boxes given in tensor space onto the full-resolution frame.
    pub fn annotate(
        &mut self,
        predictions: &[Prediction],
        surface: &SurfaceConfig,
    ) -> Result<&mut Self, CvUtilsError> {
        let sx = self.mat.cols() as f32 / surface.resize_width as f32;
        let sy = self.mat.rows() as f32 / surface.resize_height as f32;

        for prediction in predictions {
            let bbox = prediction.bounding_box.scaled(sx, sy);
            let [red, green, blue] = prediction.color;
            let color = Scalar::new(blue as f64, green as f64, red as f64, 0.0);
            let label = format!("{}: {:.2}", prediction.label, prediction.confidence);

            imgproc::rectangle(
                &mut self.mat,
                Rect::new(
                    bbox.x as i32,
                    bbox.y as i32,
                    bbox.width as i32,
                    bbox.height as i32,
                ),
                color,
                2,
                imgproc::LINE_8,
                0,
            )?;

            imgproc::put_text(
                &mut self.mat,
                &label,
                Point::new(bbox.x as i32, bbox.y as i32 - 5),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                color,
                1,
                imgproc::LINE_AA,
                false,
            )?;
        }
        Ok(self)
    }

    pub fn overlay_count(&mut self, count: usize) -> Result<&mut Self, CvUtilsError> {
        imgproc::put_text(
            &mut self.mat,
            &prediction_count_text(count),
            Point::new(10, self.mat.rows() - 20),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.8,
            Scalar::new(255.0, 255.0, 255.0, 0.0),
            2,
            imgproc::LINE_AA,
            false,
        )?;
        Ok(self)
    }
}

pub fn prediction_count_text(count: usize) -> String {
    format!("Number of Predictions: {}", count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::BoundingBox;
    use opencv::core::CV_8UC3;

    #[test]
    fn test_annotate_and_encode() {
        let mat = Mat::new_rows_cols_with_default(256, 256, CV_8UC3, Scalar::all(0.0)).unwrap();
        let mut image = CvImage::from_mat(mat);
        let predictions = vec![Prediction {
            bounding_box: BoundingBox {
                x: 10.,
                y: 10.,
                width: 20.,
                height: 20.,
            },
            class_id: 0,
            label: "person".into(),
            confidence: 0.8,
            color: [0, 255, 0],
        }];

        image
            .annotate(&predictions, &SurfaceConfig::default())
            .unwrap()
            .overlay_count(predictions.len())
            .unwrap();

        // box scaled by 2: its left edge sits at x = 20
        let pixel = image.mat.at_2d::<opencv::core::Vec3b>(30, 20).unwrap();
        assert_eq!(pixel[1], 255);

        let jpg = image.to_jpg().unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_prediction_count_text() {
        assert_eq!(prediction_count_text(3), "Number of Predictions: 3");
    }
}

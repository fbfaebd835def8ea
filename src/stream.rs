use crate::camera::CameraError;
use crate::view::Screen;
use bytes::Bytes;
use futures::stream;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

const FRAME_BOUNDARY: &str = "frame";

#[derive(Clone)]
pub struct VideoStream {
    pub screen: Screen,
    pub video_stream_delay: u64,
}

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Camera view is not available")]
    NotReady,
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

impl VideoStream {
    pub fn new(screen: Screen, video_stream_delay: u64) -> Self {
        Self {
            screen,
            video_stream_delay,
        }
    }

    /// Re-encodes the frame the sampler last pulled; viewers never read the
    /// device. Ends as soon as the screen leaves the camera branch.
    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl futures::Stream<Item = Result<Bytes, VideoStreamError>> {
        let delay = Duration::from_millis(self.video_stream_delay);

        stream::unfold(self.screen, move |screen| async move {
            sleep(delay).await;
            if !screen.render().is_camera() {
                return None;
            }
            let camera = screen.camera()?;

            let predictions = screen.predictions.snapshot();
            match camera
                .get_annotated_frame(predictions, screen.surface_config)
                .await
            {
                Ok(Some(frame)) => {
                    let part_header = format!(
                        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        FRAME_BOUNDARY,
                        frame.len()
                    );
                    let mut body = part_header.into_bytes();
                    body.extend_from_slice(&frame);
                    body.extend_from_slice(b"\r\n");
                    Some((Ok::<_, VideoStreamError>(Bytes::from(body)), screen))
                }
                Ok(None) => Some((Ok(Bytes::new()), screen)),
                Err(e) => {
                    tracing::error!("Error getting frame: {:?}", e);
                    Some((Err(VideoStreamError::from(e)), screen))
                }
            }
        })
    }
}

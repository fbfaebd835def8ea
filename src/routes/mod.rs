mod health;
mod metrics;
mod video_feed;
mod view;

use crate::server::SharedState;
use axum::{routing::get, Router};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/view", get(view::current_view))
        .route("/video_feed", get(video_feed::video_feed))
        .route("/metrics", get(metrics::metrics_handler))
}

use crate::{server::SharedState, view::ViewState};
use axum::{extract::State, response::Json};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn current_view(State(state): State<SharedState>) -> Json<ViewState> {
    state.metrics.record_request("/view");
    Json(state.screen.render())
}

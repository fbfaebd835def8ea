use crate::{bootstrap::Readiness, permission::PermissionState, server::SharedState, view::Screen};
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
    readiness: Readiness,
    permission: PermissionState,
    camera_attached: bool,
}

impl Health {
    fn from_screen(screen: &Screen) -> Self {
        let snapshot = screen.snapshot();
        Self {
            status: "Available",
            readiness: snapshot.readiness,
            permission: snapshot.permission,
            camera_attached: screen.camera().is_some(),
        }
    }
}

/// The process is available as soon as it serves; readiness is reported
/// alongside so a placeholder screen is distinguishable from a live one.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<Health> {
    Json(Health::from_screen(&state.screen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{CameraConfig, SurfaceConfig},
        platform::Platform,
        view::CameraSurface,
    };

    fn screen() -> Screen {
        let surface = CameraSurface::new(
            &CameraConfig::default(),
            &SurfaceConfig::default(),
            Platform::Desktop,
        );
        Screen::new(surface, SurfaceConfig::default())
    }

    #[test]
    fn test_health_reports_readiness() {
        let screen = screen();
        screen.readiness.mark_runtime_ready();

        let health = Health::from_screen(&screen);

        assert_eq!(health.status, "Available");
        assert_eq!(
            health.readiness,
            Readiness {
                runtime_ready: true,
                model_ready: false,
            }
        );
        assert_eq!(health.permission, PermissionState::Pending);
        assert!(!health.camera_attached);
    }
}

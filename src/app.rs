use crate::{
    bootstrap::{Bootstrap, ModelSlot},
    camera::{Camera, CameraFrames},
    config::{Config, PermissionConfig},
    errors::ErrorSink,
    frame::FramePool,
    ort_service::{OrtModelLoader, OrtRuntime},
    permission::{DevicePermissions, PermissionGate, PermissionProvider, StaticPermissions},
    sampler::{FrameSampler, SamplerError},
    server::HttpServer,
    telemetry::Metrics,
    view::{CameraSurface, Screen},
};
use std::{error::Error, sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let metrics = Arc::new(Metrics::new()?);
    let errors = ErrorSink::new();
    let surface = CameraSurface::new(&config.camera, &config.surface, config.platform);
    let screen = Screen::new(surface, config.surface);
    let model_slot = ModelSlot::new();

    Bootstrap::new(
        OrtRuntime::new("tensor_camera"),
        OrtModelLoader::new(&config.model),
        screen.readiness.clone(),
        model_slot.clone(),
        errors.clone(),
    )
    .spawn();

    let gate = PermissionGate::new(
        permission_provider(&config),
        screen.alert.clone(),
        config.platform,
    );
    tokio::spawn(gate.run(screen.permission.clone(), errors.clone()));

    let server = HttpServer::new(screen.clone(), metrics.clone(), &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;
    let camera_handle = tokio::spawn(run_camera(
        screen,
        model_slot,
        config,
        metrics,
        errors,
        shutdown_tx.subscribe(),
    ));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = camera_handle.await;
    let _ = server_handle.await;

    Ok(())
}

fn permission_provider(config: &Config) -> Box<dyn PermissionProvider> {
    match &config.permission {
        PermissionConfig::Device => Box::new(DevicePermissions::for_index(config.camera.device_index)),
        PermissionConfig::Static { status } => Box::new(StaticPermissions::new(*status)),
    }
}

/// Opens the camera and runs the sampler once the view first shows it.
async fn run_camera(
    screen: Screen,
    model_slot: ModelSlot,
    config: Config,
    metrics: Arc<Metrics>,
    errors: ErrorSink,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    if !wait_for_camera_view(&screen, &mut shutdown_rx).await {
        tracing::info!("Screen torn down before the camera was shown");
        return;
    }

    let camera = match Camera::open(&config.camera, config.platform).await {
        Ok(camera) => Arc::new(camera),
        Err(e) => {
            tracing::error!("Failed to initialize camera: {:?}", e);
            errors.report(SamplerError::from(e));
            return;
        }
    };
    screen.attach_camera(camera.clone());
    tracing::info!("Camera: READY");

    let sampler = FrameSampler::new(&config.sampler, model_slot.get(), screen.predictions.clone())
        .with_metrics(metrics)
        .with_tick(Duration::from_millis(config.camera.get_stream_delay_ms()));
    let frames = CameraFrames::new(camera, FramePool::new(), config.surface);

    sampler.run(frames, shutdown_rx, errors).await;
}

/// Returns `false` if shutdown arrives first.
async fn wait_for_camera_view(screen: &Screen, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    let mut readiness_rx = screen.readiness.subscribe();
    let mut permission_rx = screen.permission.subscribe();

    loop {
        if screen.render().is_camera() {
            return true;
        }

        tokio::select! {
            _ = shutdown_rx.recv() => return false,
            changed = readiness_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            changed = permission_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

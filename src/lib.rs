mod cv_utils;
mod ort_service;
mod routes;
mod server;
mod stream;

pub mod app;
pub mod bootstrap;
pub mod camera;
pub mod config;
pub mod errors;
pub mod frame;
pub mod labels;
pub mod model_service;
pub mod permission;
pub mod platform;
pub mod prediction;
pub mod sampler;
pub mod telemetry;
pub mod view;

pub use app::start_app;

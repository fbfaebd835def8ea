use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    frames_pulled: Counter<u64>,
    frames_released: Counter<u64>,
    detection_duration: Histogram<u64>,
    prediction_count: Gauge<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("tensor_camera");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let frames_pulled = meter
            .u64_counter("frames_pulled_total")
            .with_description("Camera frames pulled by the sampler")
            .build();

        let frames_released = meter
            .u64_counter("frames_released_total")
            .with_description("Camera frames released by the sampler")
            .build();

        let boundaries = generate_boundaries((15, 30, 60, 500, 1000));

        let detection_duration = meter
            .u64_histogram("detection_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of detection calls in milliseconds")
            .build();

        let prediction_count = meter
            .u64_gauge("prediction_count")
            .with_description("Predictions produced by the latest detection")
            .build();

        Ok(Metrics {
            request_counter,
            frames_pulled,
            frames_released,
            detection_duration,
            prediction_count,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_frame_pulled(&self) {
        self.frames_pulled.add(1, &[]);
    }

    pub fn record_frame_released(&self) {
        self.frames_released.add(1, &[]);
    }

    pub fn record_detection_duration(&self, duration_ms: u64) {
        self.detection_duration.record(duration_ms, &[]);
    }

    pub fn record_prediction_count(&self, count: usize) {
        self.prediction_count.record(count as u64, &[]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 2;
    let end_step: usize = 20;
    let tail_step: usize = 100;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

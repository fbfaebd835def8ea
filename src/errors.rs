use crate::{bootstrap::BootstrapError, permission::PermissionError, sampler::SamplerError};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportedError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("Permission check failed: {0}")]
    Permission(#[from] PermissionError),
    #[error("Frame sampler failed: {0}")]
    Sampler(#[from] SamplerError),
}

#[derive(Debug, Default)]
struct SinkState {
    count: AtomicU64,
    last: Mutex<Option<String>>,
}

/// Single place background tasks send failures they cannot return to a caller.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    state: Arc<SinkState>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, error: impl Into<ReportedError>) {
        let error = error.into();
        tracing::warn!(error = %error, "Background task reported an error");
        self.state.count.fetch_add(1, Ordering::SeqCst);
        *self.state.last.lock() = Some(error.to_string());
    }

    pub fn count(&self) -> u64 {
        self.state.count.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<String> {
        self.state.last.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_records_last_error() {
        let sink = ErrorSink::new();
        assert_eq!(sink.count(), 0);
        assert!(sink.last().is_none());

        sink.report(BootstrapError::Model("missing weights".into()));
        sink.report(BootstrapError::Runtime("no provider".into()));

        assert_eq!(sink.count(), 2);
        assert_eq!(
            sink.last().as_deref(),
            Some("Bootstrap failed: Failed to initialize runtime: no provider")
        );
    }
}

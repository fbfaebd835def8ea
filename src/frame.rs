use crate::camera::CameraError;
use async_trait::async_trait;
use ndarray::Array3;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// HWC, RGB, one byte per channel.
pub type FrameTensor = Array3<u8>;

#[derive(Debug, Default)]
struct PoolCounters {
    outstanding: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Hands out frame handles and keeps count of the ones not yet released.
#[derive(Debug, Clone, Default)]
pub struct FramePool {
    counters: Arc<PoolCounters>,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, tensor: FrameTensor) -> FrameHandle {
        let sequence = self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        self.counters.outstanding.fetch_add(1, Ordering::SeqCst);
        FrameHandle {
            tensor,
            sequence,
            counters: self.counters.clone(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.counters.outstanding.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> u64 {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }
}

/// One camera frame, owned by whoever pulled it.
///
/// The buffer is returned to the pool when the handle is released or
/// dropped. Both consume the handle, so a frame cannot be released twice.
#[derive(Debug)]
pub struct FrameHandle {
    tensor: FrameTensor,
    sequence: u64,
    counters: Arc<PoolCounters>,
}

impl FrameHandle {
    pub fn tensor(&self) -> &FrameTensor {
        &self.tensor
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pending frames produced by the camera. `Ok(None)` means no frame is ready yet.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<FrameHandle>, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_tracks_release() {
        let pool = FramePool::new();
        let first = pool.acquire(FrameTensor::zeros((2, 2, 3)));
        let second = pool.acquire(FrameTensor::zeros((2, 2, 3)));

        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(pool.outstanding(), 2);

        first.release();
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.released(), 1);

        drop(second);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.released(), 2);
        assert_eq!(pool.acquired(), 2);
    }
}

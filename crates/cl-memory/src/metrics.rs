//! Metrics hooks for allocation, lease and synchronization activity
//!
//! ## Usage
//!
//! ```ignore
//! use cl_memory::metrics::Metrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(Metrics::new());
//! let context = AllocationContext::new(driver, capabilities).with_metrics(metrics.clone());
//! // ... run kernels ...
//! println!("copies skipped: {}", metrics.snapshot().copies_skipped());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Direction of a buffer/image synchronization copy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyDirection {
    BufferToImage,
    ImageToBuffer,
}

/// Metrics collector for memory operations
///
/// Thread-safe counters shared by every allocation of a context.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total allocations materialized
    pub allocations_created: AtomicU64,
    /// Total allocations torn down
    pub allocations_destroyed: AtomicU64,
    /// Bytes held by live allocations
    pub bytes_live: AtomicU64,
    /// Host leases granted
    pub host_leases: AtomicU64,
    /// Host leases granted without any map call
    pub host_fast_paths: AtomicU64,
    /// Device leases granted
    pub device_leases: AtomicU64,
    /// Lease requests refused because the other side held the allocation
    pub lock_violations: AtomicU64,
    pub buffer_to_image_copies: AtomicU64,
    pub buffer_to_image_skipped: AtomicU64,
    pub image_to_buffer_copies: AtomicU64,
    pub image_to_buffer_skipped: AtomicU64,
    /// Remaps that returned a different host address
    pub integrity_violations: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocation_created(&self, size_bytes: usize) {
        self.allocations_created.fetch_add(1, Ordering::Relaxed);
        self.bytes_live.fetch_add(size_bytes as u64, Ordering::Relaxed);
    }

    pub fn record_allocation_destroyed(&self, size_bytes: usize) {
        self.allocations_destroyed.fetch_add(1, Ordering::Relaxed);
        self.bytes_live.fetch_sub(size_bytes as u64, Ordering::Relaxed);
    }

    pub fn record_host_lease(&self, fast_path: bool) {
        self.host_leases.fetch_add(1, Ordering::Relaxed);
        if fast_path {
            self.host_fast_paths.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_device_lease(&self) {
        self.device_leases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_violation(&self) {
        self.lock_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a synchronization copy, `performed == false` when the policy skipped it
    pub fn record_copy(&self, direction: CopyDirection, performed: bool) {
        let counter = match (direction, performed) {
            (CopyDirection::BufferToImage, true) => &self.buffer_to_image_copies,
            (CopyDirection::BufferToImage, false) => &self.buffer_to_image_skipped,
            (CopyDirection::ImageToBuffer, true) => &self.image_to_buffer_copies,
            (CopyDirection::ImageToBuffer, false) => &self.image_to_buffer_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_violation(&self) {
        self.integrity_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allocations_created: self.allocations_created.load(Ordering::Relaxed),
            allocations_destroyed: self.allocations_destroyed.load(Ordering::Relaxed),
            bytes_live: self.bytes_live.load(Ordering::Relaxed),
            host_leases: self.host_leases.load(Ordering::Relaxed),
            host_fast_paths: self.host_fast_paths.load(Ordering::Relaxed),
            device_leases: self.device_leases.load(Ordering::Relaxed),
            lock_violations: self.lock_violations.load(Ordering::Relaxed),
            buffer_to_image_copies: self.buffer_to_image_copies.load(Ordering::Relaxed),
            buffer_to_image_skipped: self.buffer_to_image_skipped.load(Ordering::Relaxed),
            image_to_buffer_copies: self.image_to_buffer_copies.load(Ordering::Relaxed),
            image_to_buffer_skipped: self.image_to_buffer_skipped.load(Ordering::Relaxed),
            integrity_violations: self.integrity_violations.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.allocations_created,
            &self.allocations_destroyed,
            &self.bytes_live,
            &self.host_leases,
            &self.host_fast_paths,
            &self.device_leases,
            &self.lock_violations,
            &self.buffer_to_image_copies,
            &self.buffer_to_image_skipped,
            &self.image_to_buffer_copies,
            &self.image_to_buffer_skipped,
            &self.integrity_violations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub allocations_created: u64,
    pub allocations_destroyed: u64,
    pub bytes_live: u64,
    pub host_leases: u64,
    pub host_fast_paths: u64,
    pub device_leases: u64,
    pub lock_violations: u64,
    pub buffer_to_image_copies: u64,
    pub buffer_to_image_skipped: u64,
    pub image_to_buffer_copies: u64,
    pub image_to_buffer_skipped: u64,
    pub integrity_violations: u64,
}

impl MetricsSnapshot {
    pub fn copies_performed(&self) -> u64 {
        self.buffer_to_image_copies + self.image_to_buffer_copies
    }

    pub fn copies_skipped(&self) -> u64 {
        self.buffer_to_image_skipped + self.image_to_buffer_skipped
    }
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to forward counters to an external metrics system.
pub trait MetricsRecorder: Send + Sync {
    fn record_allocation_created(&self, size_bytes: usize);

    fn record_allocation_destroyed(&self, size_bytes: usize);

    fn record_host_lease(&self, fast_path: bool);

    fn record_device_lease(&self);

    fn record_lock_violation(&self);

    fn record_copy(&self, direction: CopyDirection, performed: bool);

    fn record_integrity_violation(&self);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Debug, Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_allocation_created(&self, _: usize) {}
    fn record_allocation_destroyed(&self, _: usize) {}
    fn record_host_lease(&self, _: bool) {}
    fn record_device_lease(&self) {}
    fn record_lock_violation(&self) {}
    fn record_copy(&self, _: CopyDirection, _: bool) {}
    fn record_integrity_violation(&self) {}
}

impl MetricsRecorder for Metrics {
    fn record_allocation_created(&self, size_bytes: usize) {
        Metrics::record_allocation_created(self, size_bytes);
    }

    fn record_allocation_destroyed(&self, size_bytes: usize) {
        Metrics::record_allocation_destroyed(self, size_bytes);
    }

    fn record_host_lease(&self, fast_path: bool) {
        Metrics::record_host_lease(self, fast_path);
    }

    fn record_device_lease(&self) {
        Metrics::record_device_lease(self);
    }

    fn record_lock_violation(&self) {
        Metrics::record_lock_violation(self);
    }

    fn record_copy(&self, direction: CopyDirection, performed: bool) {
        Metrics::record_copy(self, direction, performed);
    }

    fn record_integrity_violation(&self) {
        Metrics::record_integrity_violation(self);
    }
}

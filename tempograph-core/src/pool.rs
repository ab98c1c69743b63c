use std::collections::HashMap;

use crate::device::Device;
use crate::matrix::Matrix;

/// Running counters of pool traffic, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Checkouts served, from cache or fresh allocation.
    pub requests: u64,
    /// Checkouts served from a free list instead of allocating.
    pub hits: u64,
    /// Buffers returned to the pool.
    pub releases: u64,
}

/// Shape-keyed recycling pool for transient sweep buffers.
///
/// Buffers are keyed by `(device, rows, cols)`. Release pushes onto the
/// shape's free list and checkout pops the most recently released entry, so
/// repeated sweeps with a stable set of scratch shapes stop allocating after
/// the first one.
///
/// Checked-out buffers arrive with unspecified contents; requesting code
/// must not read before writing. The pool does not police release timing:
/// returning a buffer while some later computation still holds a use for it
/// is a contract violation of the releasing node, not something detected
/// here.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: HashMap<(Device, usize, usize), Vec<Matrix>>,
    stats: PoolStats,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks out a `rows x cols` buffer on `device`.
    pub fn checkout(&mut self, device: Device, rows: usize, cols: usize) -> Matrix {
        self.stats.requests += 1;
        if let Some(list) = self.free.get_mut(&(device, rows, cols)) {
            if let Some(buffer) = list.pop() {
                self.stats.hits += 1;
                return buffer;
            }
        }
        Matrix::new(rows, cols, device)
    }

    /// Returns a buffer to the free list matching its shape and device.
    pub fn release(&mut self, buffer: Matrix) {
        self.stats.releases += 1;
        let key = (buffer.device(), buffer.rows(), buffer.cols());
        self.free.entry(key).or_default().push(buffer);
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Drops every cached buffer. Counters keep their values.
    pub fn clear(&mut self) {
        self.free.clear();
    }

    /// Number of buffers currently sitting in free lists.
    pub fn cached(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_release_checkout_hits() {
        let mut pool = BufferPool::new();
        let a = pool.checkout(Device::Cpu, 10, 10);
        assert_eq!(pool.stats().requests, 1);
        assert_eq!(pool.stats().hits, 0);
        pool.release(a);
        assert_eq!(pool.stats().releases, 1);
        let _b = pool.checkout(Device::Cpu, 10, 10);
        let stats = pool.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_shapes_do_not_cross() {
        let mut pool = BufferPool::new();
        let a = pool.checkout(Device::Cpu, 4, 4);
        pool.release(a);
        let _b = pool.checkout(Device::Cpu, 4, 5);
        assert_eq!(pool.stats().hits, 0);
        assert_eq!(pool.cached(), 1);
    }

    #[test]
    fn test_devices_do_not_cross() {
        let mut pool = BufferPool::new();
        let mut a = pool.checkout(Device::Cpu, 2, 2);
        a.to_device(Device::Gpu);
        pool.release(a);
        let _b = pool.checkout(Device::Cpu, 2, 2);
        assert_eq!(pool.stats().hits, 0);
    }

    #[test]
    fn test_most_recent_release_wins() {
        let mut pool = BufferPool::new();
        let mut first = pool.checkout(Device::Cpu, 1, 2);
        first.fill(1.0);
        let mut second = pool.checkout(Device::Cpu, 1, 2);
        second.fill(2.0);
        pool.release(first);
        pool.release(second);
        // LIFO: the last released buffer comes back first.
        let got = pool.checkout(Device::Cpu, 1, 2);
        assert_eq!(got.data(), &[2.0, 2.0]);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let mut pool = BufferPool::new();
        let a = pool.checkout(Device::Cpu, 3, 3);
        pool.release(a);
        pool.clear();
        assert_eq!(pool.cached(), 0);
        assert_eq!(pool.stats().releases, 1);
        let _b = pool.checkout(Device::Cpu, 3, 3);
        assert_eq!(pool.stats().hits, 0);
    }
}

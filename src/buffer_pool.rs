use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Fixed set of preview buffers shared between the capture layer and the
/// decode path.
///
/// Buffers are handed out as [`PooledBuffer`]s and go back to the free list
/// when the guard is dropped, so a frame is released on every exit path of
/// a decode attempt.
pub struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
    capacity: usize,
    stats: BufferPoolStats,
}

/// Statistics for pool usage monitoring
#[derive(Debug)]
pub struct BufferPoolStats {
    /// Buffers handed out to the capture layer
    pub acquired: AtomicU64,
    /// Buffers returned to the free list
    pub released: AtomicU64,
    /// Acquire attempts that found the pool empty
    pub exhausted: AtomicU64,
}

impl BufferPoolStats {
    fn new() -> Self {
        Self {
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> BufferPoolStatsSnapshot {
        BufferPoolStatsSnapshot {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of buffer pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStatsSnapshot {
    pub acquired: u64,
    pub released: u64,
    pub exhausted: u64,
}

impl BufferPool {
    /// Create a pool of `capacity` zeroed buffers of `buffer_size` bytes
    ///
    /// # Example
    /// ```
    /// use barcam::buffer_pool::BufferPool;
    ///
    /// let pool = BufferPool::new(5, 640 * 480 * 3 / 2);
    /// assert_eq!(pool.available(), 5);
    /// ```
    pub fn new(capacity: usize, buffer_size: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let free = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            // queue was sized for exactly this many buffers
            let _ = free.push(vec![0u8; buffer_size]);
        }

        debug!(
            "Created preview buffer pool with {} buffers of {} bytes",
            capacity, buffer_size
        );

        Arc::new(Self {
            free,
            buffer_size,
            capacity,
            stats: BufferPoolStats::new(),
        })
    }

    /// Take a free buffer, or `None` when every buffer is in use
    pub fn acquire(self: &Arc<Self>) -> Option<PooledBuffer> {
        match self.free.pop() {
            Some(data) => {
                self.stats.acquired.fetch_add(1, Ordering::Relaxed);
                trace!("Acquired preview buffer ({} left)", self.free.len());
                Some(PooledBuffer {
                    data,
                    pool: Some(Arc::clone(self)),
                })
            }
            None => {
                self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                trace!("Preview buffer pool exhausted");
                None
            }
        }
    }

    fn release(&self, mut data: Vec<u8>) {
        data.resize(self.buffer_size, 0);
        if self.free.push(data).is_ok() {
            self.stats.released.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn stats(&self) -> BufferPoolStatsSnapshot {
        self.stats.snapshot()
    }
}

/// A preview buffer on loan from a [`BufferPool`]
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuffer {
    /// Wrap bytes that do not belong to any pool
    pub fn unpooled(data: Vec<u8>) -> Self {
        Self { data, pool: None }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

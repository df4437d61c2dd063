use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, OnceLock, Weak},
};

use aligned_vec::{avec, AVec, ConstAlign};
use crossbeam_queue::SegQueue;

use crate::utils::DEFAULT_ALIGNMENT;

// All pooled buffers carry machine vector alignment, which also satisfies any
// pointer-size request.
type AlignedBytes = AVec<u8, ConstAlign<DEFAULT_ALIGNMENT>>;

const POOL_LIMIT: usize = 16;

/// Scoped lease of a pooled scratch buffer. The backing storage returns to
/// the pool when the lease drops, on every exit path.
pub struct BufferLease {
    data: Option<AlignedBytes>,
    len: usize,
    pool: Weak<BufferPool>,
}

impl BufferLease {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for BufferLease {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..self.len]
    }
}

impl DerefMut for BufferLease {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data.as_mut().unwrap()[..self.len]
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let (Some(data), Some(pool)) = (self.data.take(), self.pool.upgrade()) {
            pool.recycle(data);
        }
    }
}

pub struct BufferPool {
    queue: SegQueue<AlignedBytes>,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: SegQueue::new(),
        })
    }

    fn global() -> &'static Arc<BufferPool> {
        static POOL: OnceLock<Arc<BufferPool>> = OnceLock::new();
        POOL.get_or_init(BufferPool::new)
    }

    pub fn available(&self) -> usize {
        self.queue.len()
    }

    pub fn rent(self: &Arc<Self>, len: usize) -> BufferLease {
        let mut data = self.queue.pop().unwrap_or_else(|| avec![[DEFAULT_ALIGNMENT]| 0u8; 0]);
        if data.len() < len {
            data.resize(len, 0);
        }
        data[..len].fill(0);

        BufferLease {
            data: Some(data),
            len,
            pool: Arc::downgrade(self),
        }
    }

    fn recycle(&self, buffer: AlignedBytes) {
        if self.queue.len() < POOL_LIMIT {
            self.queue.push(buffer);
        }
    }
}

/// Rents `len` zeroed bytes from the process-wide pool.
pub fn rent_local(len: usize) -> BufferLease {
    BufferPool::global().rent(len)
}

/// Rents `len` zeroed bytes aligned to the machine vector width.
pub fn rent_local_aligned(len: usize) -> BufferLease {
    BufferPool::global().rent(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_returns_to_pool() {
        let pool = BufferPool::new();
        {
            let mut lease = pool.rent(64);
            lease[0] = 0xFF;
            assert_eq!(lease.len(), 64);
        }
        assert_eq!(pool.available(), 1);

        // The recycled buffer is zeroed on the next rent.
        let lease = pool.rent(32);
        assert!(lease.iter().all(|&b| b == 0));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn alignment() {
        let lease = rent_local_aligned(100);
        assert_eq!(lease.as_ptr() as usize % DEFAULT_ALIGNMENT, 0);
        assert_eq!(lease.len(), 100);
    }
}

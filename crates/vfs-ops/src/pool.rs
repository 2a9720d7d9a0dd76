//! A capped pool of reusable transfer buffers.
//!
//! Capping the pool rather than the individual buffer size bounds total
//! memory used by concurrent transfers: once every buffer is checked out,
//! [`BlockPool::allocate`] reports [`vfs_error::VfsError::OutOfDiskSpace`]
//! instead of growing unboundedly.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use vfs_error::{VfsError, VfsResult};

/// A bounded set of same-sized `Vec<u8>` buffers, checked out and returned by
/// [`BlockPool::allocate`] and [`BlockPool::release`].
#[derive(Clone)]
pub struct BlockPool {
    block_size: usize,
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
}

impl BlockPool {
    /// Creates a pool of `capacity` buffers, each `block_size` bytes.
    #[must_use]
    pub fn new(block_size: usize, capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        for _ in 0..capacity {
            let _ = sender.try_send(vec![0u8; block_size]);
        }
        Self {
            block_size,
            sender,
            receiver,
        }
    }

    /// The fixed size of every buffer this pool hands out.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Checks out a buffer, or reports [`VfsError::OutOfDiskSpace`] if every
    /// buffer in the pool is currently checked out.
    pub fn allocate(&self) -> VfsResult<Vec<u8>> {
        match self.receiver.try_recv() {
            Ok(buf) => Ok(buf),
            Err(TryRecvError::Empty) => Err(VfsError::OutOfDiskSpace),
            Err(TryRecvError::Disconnected) => Err(VfsError::Disposed),
        }
    }

    /// Returns a buffer to the pool, resetting it to `block_size` bytes of
    /// zeroes first. Dropped silently if the pool has already been
    /// disposed or is already at capacity.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        buf.resize(self.block_size, 0);
        let _ = self.sender.try_send(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_exhausts_then_reports_out_of_disk_space() {
        let pool = BlockPool::new(16, 2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 16);
        assert!(matches!(pool.allocate(), Err(VfsError::OutOfDiskSpace)));
    }

    #[test]
    fn release_makes_a_buffer_available_again() {
        let pool = BlockPool::new(8, 1);
        let buf = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());
        pool.release(buf);
        assert!(pool.allocate().is_ok());
    }
}

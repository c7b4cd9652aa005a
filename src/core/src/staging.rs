// Copyright 2017 The Gfx-rs Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pool of CPU-writable staging buffers.

use crate::buffer::{Buffer, BufferDescription, BufferUsage};
use crate::Backend;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Recycles staging buffers for the lifetime of a device.
///
/// Buffers are never shrunk nor freed. A command list holds every buffer it acquired until
/// the submission that reads it has completed, then hands it back with [`release`].
///
/// [`release`]: StagingBufferPool::release
pub struct StagingBufferPool<B: Backend> {
    available: Mutex<Vec<Arc<Buffer<B>>>>,
    created: Mutex<usize>,
}

impl<B: Backend> fmt::Debug for StagingBufferPool<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StagingBufferPool")
            .field("available", &self.available.lock().len())
            .field("created", &*self.created.lock())
            .finish()
    }
}

impl<B: Backend> Default for StagingBufferPool<B> {
    fn default() -> Self {
        StagingBufferPool {
            available: Mutex::new(Vec::new()),
            created: Mutex::new(0),
        }
    }
}

impl<B: Backend> StagingBufferPool<B> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the smallest pooled buffer of at least `min_size` bytes, or create one with `create`.
    pub fn acquire<E, F>(&self, min_size: u32, create: F) -> Result<Arc<Buffer<B>>, E>
    where
        F: FnOnce(&BufferDescription) -> Result<B::Buffer, E>,
    {
        {
            let mut available = self.available.lock();
            let best = available
                .iter()
                .enumerate()
                .filter(|&(_, buffer)| buffer.size() >= min_size)
                .min_by_key(|&(_, buffer)| buffer.size())
                .map(|(index, _)| index);
            if let Some(index) = best {
                return Ok(available.swap_remove(index));
            }
        }

        let desc = BufferDescription::new(min_size, BufferUsage::STAGING);
        let raw = create(&desc)?;
        *self.created.lock() += 1;
        debug!("Staging pool grew with a {} byte buffer", min_size);
        Ok(Arc::new(Buffer::new(desc, raw)))
    }

    /// Make a buffer available to future acquisitions.
    pub fn release(&self, buffer: Arc<Buffer<B>>) {
        debug_assert!(buffer.usage().contains(BufferUsage::STAGING));
        self.available.lock().push(buffer);
    }

    /// Return every buffer of `buffers`.
    pub fn release_all<I: IntoIterator<Item = Arc<Buffer<B>>>>(&self, buffers: I) {
        let mut available = self.available.lock();
        available.extend(buffers);
    }

    /// Number of buffers waiting to be reused.
    pub fn available_count(&self) -> usize {
        self.available.lock().len()
    }

    /// Number of buffers ever created by the pool.
    pub fn created_count(&self) -> usize {
        *self.created.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyBackend, DummyBuffer};

    type Pool = StagingBufferPool<DummyBackend>;

    fn create(desc: &BufferDescription) -> Result<DummyBuffer, ()> {
        Ok(DummyBuffer::new(desc))
    }

    #[test]
    fn test_acquire_never_smaller() {
        let pool = Pool::new();
        for &size in &[1, 64, 17, 4096, 3] {
            let buffer = pool.acquire(size, create).unwrap();
            assert!(buffer.size() >= size);
            pool.release(buffer);
        }
    }

    #[test]
    fn test_prefers_smallest_fit() {
        let pool = Pool::new();
        let big = pool.acquire(1024, create).unwrap();
        let small = pool.acquire(128, create).unwrap();
        let medium = pool.acquire(512, create).unwrap();
        pool.release_all(vec![big, small, medium]);
        assert_eq!(pool.created_count(), 3);

        let reused = pool.acquire(100, create).unwrap();
        assert_eq!(reused.size(), 128);
        let reused = pool.acquire(300, create).unwrap();
        assert_eq!(reused.size(), 512);
        assert_eq!(pool.available_count(), 1);
        assert_eq!(pool.created_count(), 3);
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let pool = Pool::new();
        let buffer = pool.acquire(256, create).unwrap();
        let ptr = Arc::as_ptr(&buffer);
        // still held: a second request creates a new buffer
        let other = pool.acquire(256, create).unwrap();
        assert_ne!(Arc::as_ptr(&other), ptr);
        pool.release(buffer);
        let again = pool.acquire(200, create).unwrap();
        assert_eq!(Arc::as_ptr(&again), ptr);
        assert!(pool.acquire(257, create).unwrap().size() >= 257);
        assert_eq!(pool.created_count(), 3);
    }
}

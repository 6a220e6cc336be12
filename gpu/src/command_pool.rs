//! Thread-affine command buffer pools.
//!
//! Native command pools must not be used from two threads at once, so every
//! thread that records commands gets a dedicated pool. The registry maps
//! [`ThreadId`] to that pool; the map lock is held only while looking up or
//! inserting an entry, never while talking to the driver.
//!
//! Pools grow geometrically: when a pool runs out of free command buffers it
//! allocates as many new ones as it already owns. Pools are never shrunk or
//! removed while the device lives.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::error::{ContractViolation, GpuError, GpuResult};
use crate::logging::DeviceLogger;

/// Native command pool operations a driver provides to the registry.
pub trait CommandAllocator {
    /// Native pool handle.
    type Pool: Send;
    /// Native command buffer handle.
    type Buffer: Copy + Eq + Send + fmt::Debug;

    /// Create a pool whose buffers can be reset individually.
    fn create_pool(&self) -> GpuResult<Self::Pool>;

    /// Allocate `count` primary command buffers from `pool`.
    fn allocate(&self, pool: &mut Self::Pool, count: u32) -> GpuResult<Vec<Self::Buffer>>;

    /// Reset a command buffer, releasing the resources it holds.
    fn reset(&self, buffer: Self::Buffer) -> GpuResult<()>;

    /// Put a reset command buffer into the recording state.
    fn begin(&self, buffer: Self::Buffer) -> GpuResult<()>;

    /// Destroy a pool together with every buffer allocated from it.
    fn destroy_pool(&self, pool: Self::Pool);
}

/// Snapshot of one pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolStats {
    /// Command buffers allocated from the pool so far.
    pub capacity: u32,
    /// Command buffers waiting in the free list.
    pub free: u32,
}

/// Command pool owned by a single thread.
pub struct CommandPool<A: CommandAllocator> {
    owner: ThreadId,
    raw: Option<A::Pool>,
    free: Vec<A::Buffer>,
    capacity: u32,
}

impl<A: CommandAllocator> CommandPool<A> {
    fn create(allocator: &A, initial_capacity: u32) -> GpuResult<Self> {
        let mut raw = allocator.create_pool()?;
        let free = match allocator.allocate(&mut raw, initial_capacity) {
            Ok(buffers) => buffers,
            Err(e) => {
                allocator.destroy_pool(raw);
                return Err(e);
            }
        };
        Ok(Self {
            owner: thread::current().id(),
            raw: Some(raw),
            free,
            capacity: initial_capacity,
        })
    }

    /// Thread that owns this pool.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            free: self.free.len() as u32,
        }
    }

    /// Allocate another batch as large as the current capacity.
    fn grow(&mut self, allocator: &A, logger: &DeviceLogger) -> GpuResult<()> {
        let raw = self
            .raw
            .as_mut()
            .ok_or_else(|| GpuError::Backend("command pool already destroyed".to_string()))?;
        let batch = allocator.allocate(raw, self.capacity)?;
        logger.debug(format_args!(
            "command pool for {:?} grew from {} to {} buffers",
            self.owner,
            self.capacity,
            self.capacity * 2
        ));
        self.capacity += batch.len() as u32;
        self.free.extend(batch);
        Ok(())
    }

    /// Take a free buffer, growing the pool if none is left.
    fn take(&mut self, allocator: &A, logger: &DeviceLogger) -> GpuResult<A::Buffer> {
        if self.free.is_empty() {
            self.grow(allocator, logger)?;
        }
        self.free
            .pop()
            .ok_or_else(|| GpuError::OutOfMemory("command pool allocated no buffers".to_string()))
    }

    fn destroy(&mut self, allocator: &A) {
        self.free.clear();
        if let Some(raw) = self.raw.take() {
            allocator.destroy_pool(raw);
        }
    }
}

/// A command buffer checked out of a thread's pool.
///
/// Hand it back with [`CommandPoolRegistry::release`] once the GPU is done
/// with it. A buffer that is simply dropped stays allocated in its pool until
/// the pool is destroyed.
pub struct PooledCommandBuffer<A: CommandAllocator> {
    raw: A::Buffer,
    owner: ThreadId,
    pool: Arc<Mutex<CommandPool<A>>>,
}

impl<A: CommandAllocator> PooledCommandBuffer<A> {
    /// Native handle, in the recording state.
    pub fn raw(&self) -> A::Buffer {
        self.raw
    }

    /// Thread whose pool the buffer came from.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl<A: CommandAllocator> fmt::Debug for PooledCommandBuffer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledCommandBuffer")
            .field("raw", &self.raw)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Per-thread command pools of one device.
pub struct CommandPoolRegistry<A: CommandAllocator> {
    pools: Mutex<HashMap<ThreadId, Arc<Mutex<CommandPool<A>>>>>,
    initial_capacity: u32,
    logger: DeviceLogger,
}

impl<A: CommandAllocator> CommandPoolRegistry<A> {
    pub fn new(initial_capacity: u32, logger: DeviceLogger) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            initial_capacity: initial_capacity.max(1),
            logger,
        }
    }

    fn current_pool(&self) -> Option<Arc<Mutex<CommandPool<A>>>> {
        self.pools.lock().get(&thread::current().id()).cloned()
    }

    /// Check out a command buffer from the calling thread's pool, creating
    /// the pool on first use. The buffer is reset and recording.
    pub fn acquire(&self, allocator: &A) -> GpuResult<PooledCommandBuffer<A>> {
        let thread = thread::current().id();

        let pool = match self.current_pool() {
            Some(pool) => pool,
            None => {
                // Only this thread inserts under its own id, so creating the
                // pool outside the map lock cannot race.
                let pool = CommandPool::create(allocator, self.initial_capacity)?;
                self.logger.debug(format_args!(
                    "created command pool for {thread:?} with {} buffers",
                    self.initial_capacity
                ));
                let pool = Arc::new(Mutex::new(pool));
                self.pools.lock().insert(thread, pool.clone());
                pool
            }
        };

        let raw = pool.lock().take(allocator, &self.logger)?;

        // A buffer whose reset or begin failed is in an unknown state and
        // is not returned to the free list.
        allocator.reset(raw)?;
        allocator.begin(raw)?;

        Ok(PooledCommandBuffer {
            raw,
            owner: thread,
            pool,
        })
    }

    /// Return a command buffer to the free list of the pool it came from.
    ///
    /// Must be called on the thread that acquired it.
    pub fn release(&self, buffer: PooledCommandBuffer<A>) -> GpuResult<()> {
        if buffer.owner != thread::current().id() {
            return Err(ContractViolation::WrongThread.into());
        }
        buffer.pool.lock().free.push(buffer.raw);
        Ok(())
    }

    /// Occupancy of the calling thread's pool, if it has one.
    pub fn stats(&self) -> Option<PoolStats> {
        self.current_pool().map(|pool| pool.lock().stats())
    }

    /// Number of threads that own a pool.
    pub fn pool_count(&self) -> usize {
        self.pools.lock().len()
    }

    /// Destroy every pool. Callers must ensure the GPU is idle.
    pub fn destroy_all(&self, allocator: &A) {
        let pools: Vec<_> = self.pools.lock().drain().map(|(_, pool)| pool).collect();
        for pool in pools {
            pool.lock().destroy(allocator);
        }
    }
}

impl<A: CommandAllocator> fmt::Debug for CommandPoolRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPoolRegistry")
            .field("pools", &self.pool_count())
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    /// Allocator handing out sequential ids, with switchable failures.
    #[derive(Default)]
    pub(crate) struct ScriptedAllocator {
        next_handle: AtomicU64,
        pub pools_created: AtomicU32,
        pub pools_destroyed: AtomicU32,
        pub allocations: Mutex<Vec<u32>>,
        pub fail_allocate: Mutex<bool>,
        pub fail_reset: Mutex<bool>,
        pub fail_begin: Mutex<bool>,
    }

    impl CommandAllocator for ScriptedAllocator {
        type Pool = u32;
        type Buffer = u64;

        fn create_pool(&self) -> GpuResult<u32> {
            Ok(self.pools_created.fetch_add(1, Ordering::SeqCst))
        }

        fn allocate(&self, _pool: &mut u32, count: u32) -> GpuResult<Vec<u64>> {
            if *self.fail_allocate.lock() {
                return Err(GpuError::OutOfMemory("scripted".into()));
            }
            self.allocations.lock().push(count);
            let first = self.next_handle.fetch_add(u64::from(count), Ordering::SeqCst);
            Ok((first..first + u64::from(count)).collect())
        }

        fn reset(&self, _buffer: u64) -> GpuResult<()> {
            if *self.fail_reset.lock() {
                return Err(GpuError::DeviceLost("scripted".into()));
            }
            Ok(())
        }

        fn begin(&self, _buffer: u64) -> GpuResult<()> {
            if *self.fail_begin.lock() {
                return Err(GpuError::OutOfMemory("scripted".into()));
            }
            Ok(())
        }

        fn destroy_pool(&self, _pool: u32) {
            self.pools_destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry() -> CommandPoolRegistry<ScriptedAllocator> {
        CommandPoolRegistry::new(2, DeviceLogger::global())
    }

    #[test]
    fn test_first_acquire_creates_pool() {
        let allocator = ScriptedAllocator::default();
        let registry = registry();
        assert_eq!(registry.pool_count(), 0);
        assert!(registry.stats().is_none());

        let buffer = registry.acquire(&allocator).unwrap();
        assert_eq!(buffer.owner(), thread::current().id());
        assert_eq!(registry.pool_count(), 1);
        assert_eq!(
            registry.stats(),
            Some(PoolStats {
                capacity: 2,
                free: 1
            })
        );
    }

    #[test]
    fn test_growth_doubles_capacity() {
        let allocator = ScriptedAllocator::default();
        let registry = registry();

        let a = registry.acquire(&allocator).unwrap();
        let b = registry.acquire(&allocator).unwrap();
        assert_eq!(registry.stats().unwrap().free, 0);

        let c = registry.acquire(&allocator).unwrap();
        assert_eq!(
            registry.stats(),
            Some(PoolStats {
                capacity: 4,
                free: 1
            })
        );
        // The third buffer is one of the two new ones.
        assert!(c.raw() >= 2);
        assert_eq!(*allocator.allocations.lock(), vec![2, 2]);

        for buffer in [a, b, c] {
            registry.release(buffer).unwrap();
        }
        for _ in 0..5 {
            std::mem::forget(registry.acquire(&allocator).unwrap());
        }
        assert_eq!(*allocator.allocations.lock(), vec![2, 2, 4]);
        assert_eq!(registry.stats().unwrap().capacity, 8);
    }

    #[test]
    fn test_no_double_issue() {
        let allocator = ScriptedAllocator::default();
        let registry = registry();

        let mut outstanding = Vec::new();
        let mut seen = HashSet::new();
        for _ in 0..10 {
            let buffer = registry.acquire(&allocator).unwrap();
            assert!(seen.insert(buffer.raw()), "buffer issued twice");
            outstanding.push(buffer);
        }

        // Released buffers are reused before the pool grows again.
        let capacity = registry.stats().unwrap().capacity;
        let released = outstanding.pop().unwrap();
        let released_raw = released.raw();
        registry.release(released).unwrap();
        let again = registry.acquire(&allocator).unwrap();
        assert_eq!(again.raw(), released_raw);
        assert_eq!(registry.stats().unwrap().capacity, capacity);
    }

    #[test]
    fn test_failed_growth_keeps_state() {
        let allocator = ScriptedAllocator::default();
        let registry = registry();
        let _a = registry.acquire(&allocator).unwrap();
        let _b = registry.acquire(&allocator).unwrap();

        *allocator.fail_allocate.lock() = true;
        assert!(matches!(
            registry.acquire(&allocator),
            Err(GpuError::OutOfMemory(_))
        ));
        assert_eq!(
            registry.stats(),
            Some(PoolStats {
                capacity: 2,
                free: 0
            })
        );

        *allocator.fail_allocate.lock() = false;
        assert!(registry.acquire(&allocator).is_ok());
        assert_eq!(registry.stats().unwrap().capacity, 4);
    }

    #[test]
    fn test_failed_initial_batch_inserts_nothing() {
        let allocator = ScriptedAllocator::default();
        *allocator.fail_allocate.lock() = true;
        let registry = registry();

        assert!(registry.acquire(&allocator).is_err());
        assert_eq!(registry.pool_count(), 0);
        assert_eq!(allocator.pools_created.load(Ordering::SeqCst), 1);
        assert_eq!(allocator.pools_destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_reset_drops_buffer() {
        let allocator = ScriptedAllocator::default();
        let registry = registry();
        *allocator.fail_reset.lock() = true;
        assert!(registry.acquire(&allocator).is_err());
        assert_eq!(registry.stats().unwrap().free, 1);

        *allocator.fail_reset.lock() = false;
        *allocator.fail_begin.lock() = true;
        assert!(registry.acquire(&allocator).is_err());
        assert_eq!(
            registry.stats(),
            Some(PoolStats {
                capacity: 2,
                free: 0
            })
        );
    }

    #[test]
    fn test_threads_get_separate_pools() {
        let allocator = Arc::new(ScriptedAllocator::default());
        let registry = Arc::new(registry());

        let main_buffer = registry.acquire(&allocator).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = allocator.clone();
                let registry = registry.clone();
                thread::spawn(move || {
                    let buffer = registry.acquire(&allocator).unwrap();
                    let raw = buffer.raw();
                    registry.release(buffer).unwrap();
                    raw
                })
            })
            .collect();
        let mut raws: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        raws.push(main_buffer.raw());
        raws.sort_unstable();
        raws.dedup();

        assert_eq!(raws.len(), 5);
        assert_eq!(registry.pool_count(), 5);
        // Pools outlive their threads.
        assert_eq!(allocator.pools_destroyed.load(Ordering::SeqCst), 0);
        registry.destroy_all(&allocator);
        assert_eq!(allocator.pools_destroyed.load(Ordering::SeqCst), 5);
        assert_eq!(registry.pool_count(), 0);
    }

    #[test]
    fn test_release_from_other_thread_rejected() {
        let allocator = ScriptedAllocator::default();
        let registry = Arc::new(registry());
        let buffer = registry.acquire(&allocator).unwrap();

        let result = thread::scope(|scope| {
            let registry = &registry;
            scope.spawn(move || registry.release(buffer)).join().unwrap()
        });
        assert_eq!(
            result,
            Err(GpuError::ContractViolation(ContractViolation::WrongThread))
        );
        assert_eq!(registry.stats().unwrap().free, 1);
    }
}

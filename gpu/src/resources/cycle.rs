//! Fixed ring of interchangeable resources.
//!
//! Per-frame data such as uniform buffers must not be overwritten while the
//! GPU may still read the copy of a previous frame. A [`ResourceCycle`] holds
//! one resource per frame in flight and hands them out in turn.
//!
//! # Example
//!
//! ```ignore
//! let mut uniforms = ResourceCycle::new(3, "frame uniforms", |label| {
//!     device.create_buffer(&BufferDescriptor::new(256).with_label(label))
//! })?;
//!
//! // Each frame
//! let buffer = uniforms.next();
//! ```

use crate::error::{GpuError, GpuResult};

/// A ring of `N` resources created up front.
#[derive(Debug)]
pub struct ResourceCycle<T> {
    items: Vec<T>,
    current: usize,
    next: usize,
}

impl<T> ResourceCycle<T> {
    /// Create `count` resources with `create`, which receives a label of the
    /// form `"{label} (cycle {i}/{count})"`.
    ///
    /// If any creation fails, the resources already created are dropped and
    /// the error is returned.
    pub fn new(
        count: usize,
        label: &str,
        mut create: impl FnMut(String) -> GpuResult<T>,
    ) -> GpuResult<Self> {
        if count == 0 {
            return Err(GpuError::InvalidParameter(
                "resource cycle needs at least one item".to_string(),
            ));
        }
        let items = (0..count)
            .map(|i| create(format!("{label} (cycle {}/{count})", i + 1)))
            .collect::<GpuResult<Vec<_>>>()?;
        Ok(Self {
            items,
            current: 0,
            next: 0,
        })
    }

    /// Hand out the next resource, wrapping around after the last one.
    pub fn next(&mut self) -> &T {
        self.current = self.next;
        self.next = (self.next + 1) % self.items.len();
        &self.items[self.current]
    }

    /// The resource most recently returned by [`next`](Self::next), or the
    /// first one before any call.
    pub fn current(&self) -> &T {
        &self.items[self.current]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_cycle_wraps() {
        let mut cycle = ResourceCycle::new(3, "ubo", Ok).unwrap();
        assert_eq!(cycle.current(), "ubo (cycle 1/3)");
        assert_eq!(cycle.next(), "ubo (cycle 1/3)");
        assert_eq!(cycle.next(), "ubo (cycle 2/3)");
        assert_eq!(cycle.next(), "ubo (cycle 3/3)");
        assert_eq!(cycle.next(), "ubo (cycle 1/3)");
        assert_eq!(cycle.current(), "ubo (cycle 1/3)");
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_zero_items_rejected() {
        assert!(ResourceCycle::<u32>::new(0, "x", |_| Ok(1)).is_err());
    }

    struct Tracked(Rc<Cell<u32>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_partial_failure_drops_created_items() {
        let dropped = Rc::new(Cell::new(0));
        let mut created = 0;
        let result = ResourceCycle::new(4, "x", |_| {
            created += 1;
            if created == 3 {
                Err(GpuError::OutOfMemory("device memory".into()))
            } else {
                Ok(Tracked(dropped.clone()))
            }
        });
        assert!(matches!(result, Err(GpuError::OutOfMemory(_))));
        assert_eq!(dropped.get(), 2);
    }
}

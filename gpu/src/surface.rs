//! The window collaborator.
//!
//! Windowing is owned by the application. The device only needs native
//! handles to create a presentation surface and the current drawable size to
//! size the swap chain, which is what [`Window`] exposes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle};

use crate::error::{GpuError, GpuResult};

/// A window a device can present to.
pub trait Window: HasWindowHandle + HasDisplayHandle + Send + Sync {
    /// Size of the drawable area in physical pixels.
    fn drawable_size(&self) -> (u32, u32);
}

#[cfg(feature = "winit")]
impl Window for winit::window::Window {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// Identity of a window, derived from its native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey(u64);

impl WindowKey {
    pub fn of(window: &dyn Window) -> GpuResult<Self> {
        let handle = window.window_handle().map_err(handle_error)?;
        let mut hasher = DefaultHasher::new();
        handle.as_raw().hash(&mut hasher);
        Ok(Self(hasher.finish()))
    }
}

pub(crate) fn handle_error(err: HandleError) -> GpuError {
    match err {
        HandleError::Unavailable => {
            GpuError::SurfaceUnavailable("window handle is not available".to_string())
        }
        other => GpuError::Unsupported(format!("window handle: {other}")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use raw_window_handle::{
        DisplayHandle, RawDisplayHandle, RawWindowHandle, WebDisplayHandle, WebWindowHandle,
        WindowHandle,
    };

    /// Window without a native backing, identified by a web canvas id.
    pub(crate) struct FakeWindow {
        pub id: u32,
        pub size: (u32, u32),
    }

    impl HasWindowHandle for FakeWindow {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            let raw = RawWindowHandle::Web(WebWindowHandle::new(self.id));
            // SAFETY: web handles carry no pointers.
            Ok(unsafe { WindowHandle::borrow_raw(raw) })
        }
    }

    impl HasDisplayHandle for FakeWindow {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            let raw = RawDisplayHandle::Web(WebDisplayHandle::new());
            // SAFETY: web handles carry no pointers.
            Ok(unsafe { DisplayHandle::borrow_raw(raw) })
        }
    }

    impl Window for FakeWindow {
        fn drawable_size(&self) -> (u32, u32) {
            self.size
        }
    }

    #[test]
    fn test_window_key_follows_handle() {
        let a = FakeWindow { id: 1, size: (640, 480) };
        let a_resized = FakeWindow { id: 1, size: (800, 600) };
        let b = FakeWindow { id: 2, size: (640, 480) };
        assert_eq!(WindowKey::of(&a).unwrap(), WindowKey::of(&a_resized).unwrap());
        assert_ne!(WindowKey::of(&a).unwrap(), WindowKey::of(&b).unwrap());
    }
}

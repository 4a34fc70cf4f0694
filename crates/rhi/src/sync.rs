//! Fences and semaphores.
//!
//! Both are registered with the deletion queue on creation and released
//! there; the wrappers only carry the handle.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::deletion::{DeletionQueue, PendingRelease};
use crate::device::Device;
use crate::error::RhiResult;

/// GPU to GPU ordering primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Semaphore {
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &Device, deletion: &mut DeletionQueue) -> RhiResult<Self> {
        deletion.ensure_open()?;
        let create_info = vk::SemaphoreCreateInfo::default();
        let handle = unsafe { device.handle().create_semaphore(&create_info, None)? };
        deletion.push(PendingRelease::Semaphore(handle))?;
        debug!("Created semaphore");
        Ok(Self { handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

/// GPU to CPU completion signal.
#[derive(Clone)]
pub struct Fence {
    device: Arc<Device>,
    handle: vk::Fence,
}

impl Fence {
    /// Creates a fence. Frame fences start signaled so the first wait on a
    /// fresh slot returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool, deletion: &mut DeletionQueue) -> RhiResult<Self> {
        deletion.ensure_open()?;
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let handle = unsafe { device.handle().create_fence(&create_info, None)? };
        deletion.push(PendingRelease::Fence(handle))?;
        debug!("Created fence (signaled: {})", signaled);
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.handle], true, timeout)?
        };
        Ok(())
    }

    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.handle])? };
        Ok(())
    }

    pub fn is_signaled(&self) -> bool {
        matches!(
            unsafe { self.device.handle().get_fence_status(self.handle) },
            Ok(true)
        )
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_wrappers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}

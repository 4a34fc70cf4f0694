//! Deferred release of device objects.
//!
//! Every device object the engine creates is registered here in the same call
//! that creates it. At shutdown the queue waits for the device to go idle and
//! releases everything in reverse registration order, exactly once.
//!
//! The queue stores plain [`PendingRelease`] records rather than closures, so
//! the teardown order can be inspected with [`DeletionQueue::kinds`] and
//! exercised against a recording [`ReleaseSink`] in tests.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A device object waiting to be released.
#[derive(Debug)]
pub enum PendingRelease {
    Buffer {
        handle: vk::Buffer,
        allocation: Allocation,
    },
    Image {
        handle: vk::Image,
        allocation: Allocation,
    },
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    CommandPool(vk::CommandPool),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Swapchain(vk::SwapchainKHR),
}

impl PendingRelease {
    /// Short name of the resource kind, used in logs and audits.
    pub fn kind(&self) -> &'static str {
        match self {
            PendingRelease::Buffer { .. } => "buffer",
            PendingRelease::Image { .. } => "image",
            PendingRelease::ImageView(_) => "image_view",
            PendingRelease::Sampler(_) => "sampler",
            PendingRelease::Fence(_) => "fence",
            PendingRelease::Semaphore(_) => "semaphore",
            PendingRelease::CommandPool(_) => "command_pool",
            PendingRelease::DescriptorPool(_) => "descriptor_pool",
            PendingRelease::DescriptorSetLayout(_) => "descriptor_set_layout",
            PendingRelease::PipelineLayout(_) => "pipeline_layout",
            PendingRelease::Pipeline(_) => "pipeline",
            PendingRelease::Swapchain(_) => "swapchain",
        }
    }
}

/// Position of a record in the queue.
///
/// Allocated buffers and images keep theirs as the allocation token: the
/// allocation itself lives in the queue until flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReleaseId(usize);

impl ReleaseId {
    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Destination for released records.
pub trait ReleaseSink {
    /// Blocks until no submitted GPU work can reference the records.
    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Destroys one record.
    fn release(&mut self, item: PendingRelease);
}

/// Owned, LIFO list of pending releases.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    pending: Vec<PendingRelease>,
    flushed: bool,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record. Fails once the queue has been flushed.
    pub fn push(&mut self, item: PendingRelease) -> RhiResult<ReleaseId> {
        self.ensure_open()?;
        let id = ReleaseId(self.pending.len());
        debug!("Registered {} for release (#{})", item.kind(), id.0);
        self.pending.push(item);
        Ok(id)
    }

    /// Returns an error if nothing more may be registered.
    ///
    /// Creation helpers call this before creating the object, so a created
    /// object always has a place in the queue.
    pub fn ensure_open(&self) -> RhiResult<()> {
        if self.flushed {
            Err(RhiError::DeletionQueueClosed)
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Kinds of the pending records in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pending.iter().map(PendingRelease::kind)
    }

    /// Waits for the device to go idle and releases everything.
    pub fn flush(&mut self, device: &Device) -> RhiResult<usize> {
        self.flush_into(&mut DeviceReleaser { device })
    }

    /// Releases into an arbitrary sink, newest record first.
    ///
    /// The sink's idle wait runs before the first release. If it fails the
    /// queue is left untouched.
    pub fn flush_into<S: ReleaseSink>(&mut self, sink: &mut S) -> RhiResult<usize> {
        self.ensure_open()?;
        sink.wait_idle()?;
        self.flushed = true;

        let count = self.pending.len();
        while let Some(item) = self.pending.pop() {
            sink.release(item);
        }

        info!("Deletion queue flushed ({} objects released)", count);
        Ok(count)
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Deletion queue dropped with {} unreleased objects",
                self.pending.len()
            );
        }
    }
}

/// Releases records against a live device.
struct DeviceReleaser<'a> {
    device: &'a Device,
}

impl ReleaseSink for DeviceReleaser<'_> {
    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn release(&mut self, item: PendingRelease) {
        let kind = item.kind();
        let raw = self.device.handle();

        // SAFETY: the device is idle and every record was created from it and
        // is released exactly once.
        unsafe {
            match item {
                PendingRelease::Buffer { handle, allocation } => {
                    raw.destroy_buffer(handle, None);
                    if let Err(e) = self.device.lock_allocator().free(allocation) {
                        error!("Failed to free buffer allocation: {}", e);
                    }
                }
                PendingRelease::Image { handle, allocation } => {
                    raw.destroy_image(handle, None);
                    if let Err(e) = self.device.lock_allocator().free(allocation) {
                        error!("Failed to free image allocation: {}", e);
                    }
                }
                PendingRelease::ImageView(view) => raw.destroy_image_view(view, None),
                PendingRelease::Sampler(sampler) => raw.destroy_sampler(sampler, None),
                PendingRelease::Fence(fence) => raw.destroy_fence(fence, None),
                PendingRelease::Semaphore(semaphore) => raw.destroy_semaphore(semaphore, None),
                PendingRelease::CommandPool(pool) => raw.destroy_command_pool(pool, None),
                PendingRelease::DescriptorPool(pool) => raw.destroy_descriptor_pool(pool, None),
                PendingRelease::DescriptorSetLayout(layout) => {
                    raw.destroy_descriptor_set_layout(layout, None)
                }
                PendingRelease::PipelineLayout(layout) => raw.destroy_pipeline_layout(layout, None),
                PendingRelease::Pipeline(pipeline) => raw.destroy_pipeline(pipeline, None),
                PendingRelease::Swapchain(swapchain) => {
                    self.device
                        .swapchain_loader()
                        .destroy_swapchain(swapchain, None);
                }
            }
        }

        debug!("Released {}", kind);
    }
}

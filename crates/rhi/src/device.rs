//! Logical device, queues and the memory allocator.
//!
//! The [`Device`] is shared through `Arc` by every subsystem that creates or
//! records GPU work. It owns the gpu-allocator instance and the swapchain
//! extension loader; all device-child objects are released by the
//! [`DeletionQueue`](crate::deletion::DeletionQueue) before the device drops.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilies};

/// Device extensions the engine needs. Dynamic rendering is core in 1.3.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// One queue handle per kind of work, plus the family it came from.
#[derive(Clone, Copy, Debug)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub compute: vk::Queue,
    pub transfer: vk::Queue,
}

/// Vulkan logical device.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    limits: vk::PhysicalDeviceLimits,
    // Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    swapchain_loader: ash::khr::swapchain::Device,
    queues: Queues,
    queue_families: QueueFamilies,
}

impl Device {
    /// Creates the logical device with one queue per distinct family.
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = physical.queue_families;
        let unique_families = families.unique();
        let priorities = [1.0f32];

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();

        let mut features_1_2 =
            vk::PhysicalDeviceVulkan12Features::default().separate_depth_stencil_layouts(true);
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical.device, &create_info, None)?
        };
        info!(
            "Logical device created with queue families {:?}",
            unique_families
        );

        let queues = unsafe {
            Queues {
                graphics: device.get_device_queue(families.graphics, 0),
                present: device.get_device_queue(families.present, 0),
                compute: device.get_device_queue(families.compute, 0),
                transfer: device.get_device_queue(families.transfer, 0),
            }
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };
        debug!("GPU memory allocator initialized");

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            device,
            physical_device: physical.device,
            limits: physical.properties.limits,
            allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
            swapchain_loader,
            queues,
            queue_families: families,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    #[inline]
    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilies {
        &self.queue_families
    }

    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Locks the allocator.
    ///
    /// A poisoned lock is recovered: the allocator's bookkeeping is only
    /// mutated inside its own calls, which do not panic halfway.
    pub fn lock_allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared handle to the allocator, for libraries that allocate on their own.
    ///
    /// Holders must drop it before the device: the memory blocks are freed
    /// when the last handle goes.
    pub fn shared_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.allocator)
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue, signalling `fence` on completion.
    pub fn submit_graphics(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.queues.graphics, submits, fence)?
        };
        Ok(())
    }

    /// Submits to the transfer queue, signalling `fence` on completion.
    pub fn submit_transfer(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.queues.transfer, submits, fence)?
        };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            if Arc::strong_count(&self.allocator) > 1 {
                error!("Allocator is still shared while the device is destroyed");
            }
            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: the raw handles are plain identifiers and the allocator is behind
// a mutex. ash loaders hold only function pointers.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

//! GPU selection and queue family discovery.
//!
//! A device qualifies when it speaks Vulkan 1.3 (dynamic rendering is core)
//! and exposes a graphics family plus a family that can present to the
//! window surface. Compute and transfer work goes to dedicated families
//! when the device has them, otherwise to the graphics family.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Resolved queue family indices, one per kind of work the engine submits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueFamilies {
    /// Picks families from the properties reported by a device.
    ///
    /// `supports_present` is asked for each family index in order until one
    /// answers yes. Returns `None` when graphics or present is missing.
    pub fn pick(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Option<Self> {
        let mut graphics = None;
        let mut present = None;
        let mut dedicated_compute = None;
        let mut dedicated_transfer = None;

        for (index, family) in families.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            let index = index as u32;
            let flags = family.queue_flags;
            let has_graphics = flags.contains(vk::QueueFlags::GRAPHICS);
            let has_compute = flags.contains(vk::QueueFlags::COMPUTE);

            if has_graphics && graphics.is_none() {
                graphics = Some(index);
            }
            if has_compute && !has_graphics && dedicated_compute.is_none() {
                dedicated_compute = Some(index);
            }
            if flags.contains(vk::QueueFlags::TRANSFER)
                && !has_graphics
                && !has_compute
                && dedicated_transfer.is_none()
            {
                dedicated_transfer = Some(index);
            }
            if present.is_none() && supports_present(index) {
                present = Some(index);
            }
        }

        let graphics = graphics?;
        Some(Self {
            graphics,
            present: present?,
            compute: dedicated_compute.unwrap_or(graphics),
            transfer: dedicated_transfer.unwrap_or(graphics),
        })
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        let mut unique = Vec::with_capacity(4);
        for family in [self.graphics, self.present, self.compute, self.transfer] {
            if !unique.contains(&family) {
                unique.push(family);
            }
        }
        unique
    }
}

/// A GPU that passed the suitability checks.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_str()
            .unwrap_or("Unknown Device")
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    fn score(&self) -> u64 {
        let type_score = match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 4,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
            vk::PhysicalDeviceType::CPU => 1,
            _ => 0,
        };
        // Device type dominates; memory in MiB breaks ties.
        (type_score << 32) + self.device_local_memory() / (1024 * 1024)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Returns true when `api_version` is at least Vulkan 1.3.
#[inline]
pub fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Enumerates GPUs and returns the best suitable one.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| inspect_device(instance, device, surface, surface_loader))
        .max_by_key(PhysicalDeviceInfo::score);

    let Some(selected) = selected else {
        warn!("No GPU supports Vulkan 1.3 with graphics and present queues");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU '{}' ({:?}), queues {:?}",
        selected.device_name(),
        selected.properties.device_type,
        selected.queue_families
    );
    Ok(selected)
}

fn inspect_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();

    if !supports_vulkan_1_3(properties.api_version) {
        debug!("GPU '{}' skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = QueueFamilies::pick(&family_properties, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    let Some(queue_families) = queue_families else {
        debug!("GPU '{}' skipped: missing graphics or present queue", name);
        return None;
    };

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

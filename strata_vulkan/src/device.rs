// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical device with named queues and semaphore interop.

use core::ffi::{CStr, c_char};
use core::fmt;
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::sync::Arc;

use ash::{khr, vk};
use hashbrown::HashMap;

use crate::context::VulkanContext;
use crate::error::VulkanError;
use crate::select;

/// What a queue is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueSelector {
    /// Graphics and transfer work.
    Graphics,
    /// Presentation to a surface.
    Present,
}

/// Request for queues of one kind.
#[derive(Clone, Debug)]
pub struct QueueSpecifier {
    /// Name the queues are looked up by.
    pub name: String,
    /// Queue kind.
    pub selector: QueueSelector,
    /// Number of queues.
    pub count: u32,
    /// Per-queue priorities; missing entries default to `1.0`.
    pub priorities: Vec<f32>,
    /// Surface the queues must present to; required for
    /// [`QueueSelector::Present`].
    pub surface: Option<vk::SurfaceKHR>,
}

impl QueueSpecifier {
    /// `count` graphics queues.
    #[must_use]
    pub fn graphics(name: &str, count: u32) -> Self {
        Self {
            name: name.to_owned(),
            selector: QueueSelector::Graphics,
            count,
            priorities: Vec::new(),
            surface: None,
        }
    }

    /// One queue able to present to `surface`.
    #[must_use]
    pub fn present(name: &str, surface: vk::SurfaceKHR) -> Self {
        Self {
            name: name.to_owned(),
            selector: QueueSelector::Present,
            count: 1,
            priorities: Vec::new(),
            surface: Some(surface),
        }
    }

    fn priority(&self, index: u32) -> f32 {
        self.priorities.get(index as usize).copied().unwrap_or(1.0)
    }
}

/// A queue and the family it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceQueue {
    /// Queue family index.
    pub family_index: u32,
    /// Queue handle.
    pub queue: vk::Queue,
}

/// A logical device created from a [`VulkanContext`].
pub struct VulkanDevice {
    context: Arc<VulkanContext>,
    device: ash::Device,
    queues: HashMap<String, Vec<DeviceQueue>>,
    enabled_extensions: Vec<CString>,
    semaphore_fd: Option<khr::external_semaphore_fd::Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("handle", &self.device.handle())
            .field("queues", &self.queues)
            .field("enabled_extensions", &self.enabled_extensions)
            .field("semaphore_interop", &self.semaphore_fd.is_some())
            .finish_non_exhaustive()
    }
}

impl VulkanDevice {
    /// Creates a device with the queues named by `specifiers`.
    ///
    /// Enabled extensions are the context's device extensions plus `extra`.
    /// Fails if any specifier cannot be satisfied.
    pub fn new(
        context: Arc<VulkanContext>,
        specifiers: &[QueueSpecifier],
        extra: &[&CStr],
    ) -> Result<Arc<Self>, VulkanError> {
        let physical = context.physical_device();
        let instance = context.instance();
        // SAFETY: `physical` was enumerated from this instance.
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical) };

        // family -> priorities of every queue requested from it
        let mut family_priorities: HashMap<u32, Vec<f32>> = HashMap::new();
        let mut assignments = Vec::with_capacity(specifiers.len());
        for spec in specifiers {
            if spec.selector == QueueSelector::Present && spec.surface.is_none() {
                return Err(VulkanError::MissingSurface);
            }
            let family = select::find_queue_family(&families, spec.selector, spec.count, |index| {
                spec.surface.is_some_and(|surface| {
                    // SAFETY: the surface belongs to this instance.
                    unsafe {
                        context
                            .surface_instance()
                            .get_physical_device_surface_support(physical, index, surface)
                    }
                    .unwrap_or(false)
                })
            })
            .ok_or(VulkanError::UnsatisfiedQueue(spec.selector))?;

            let priorities = family_priorities.entry(family).or_default();
            let first = u32::try_from(priorities.len()).unwrap_or(u32::MAX);
            if first.saturating_add(spec.count) > families[family as usize].queue_count {
                return Err(VulkanError::UnsatisfiedQueue(spec.selector));
            }
            priorities.extend((0..spec.count).map(|i| spec.priority(i)));
            assignments.push((spec, family, first));
        }

        let queue_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = family_priorities
            .iter()
            .map(|(family, priorities)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family)
                    .queue_priorities(priorities)
            })
            .collect();

        let mut enabled_extensions: Vec<CString> = context.device_extensions().to_vec();
        for name in extra {
            if !enabled_extensions.iter().any(|e| e.as_c_str() == *name) {
                enabled_extensions.push((*name).to_owned());
            }
        }
        let extension_ptrs: Vec<*const c_char> =
            enabled_extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);
        // SAFETY: create_info and everything it points to outlive the call.
        let device = unsafe { instance.create_device(physical, &create_info, None) }?;

        let mut queues: HashMap<String, Vec<DeviceQueue>> = HashMap::new();
        for (spec, family, first) in assignments {
            let list = queues.entry(spec.name.clone()).or_default();
            for index in first..first + spec.count {
                // SAFETY: the queue was requested in `create_info`.
                let queue = unsafe { device.get_device_queue(family, index) };
                list.push(DeviceQueue {
                    family_index: family,
                    queue,
                });
            }
        }

        let semaphore_fd = context
            .supports_semaphore_interop()
            .then(|| khr::external_semaphore_fd::Device::new(instance, &device));
        // SAFETY: `physical` was enumerated from this instance.
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical) };

        Ok(Arc::new(Self {
            context,
            device,
            queues,
            enabled_extensions,
            semaphore_fd,
            memory_properties,
        }))
    }

    /// The context this device was created from.
    #[must_use]
    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.context
    }

    /// Device entry points.
    #[must_use]
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Queue `index` of the specifier named `name`.
    #[must_use]
    pub fn queue(&self, name: &str, index: usize) -> Option<DeviceQueue> {
        self.queues.get(name).and_then(|q| q.get(index)).copied()
    }

    /// Enabled device extensions.
    #[must_use]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Memory heaps and types of the physical device.
    #[must_use]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Returns `true` if semaphores can cross process boundaries as fds.
    #[must_use]
    pub fn supports_semaphore_interop(&self) -> bool {
        self.semaphore_fd.is_some()
    }

    /// Creates a binary semaphore.
    pub fn create_semaphore(&self) -> Result<vk::Semaphore, VulkanError> {
        // SAFETY: the device is valid.
        Ok(unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }?)
    }

    /// Destroys a semaphore created on this device.
    pub fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        // SAFETY: callers pass semaphores of this device that no pending
        // submission uses.
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    /// Creates a semaphore and imports its payload from `fd`.
    ///
    /// The device takes ownership of `fd` on success; on failure it is
    /// closed.
    pub fn import_semaphore_from_fd(&self, fd: OwnedFd) -> Result<vk::Semaphore, VulkanError> {
        let loader = self
            .semaphore_fd
            .as_ref()
            .ok_or(VulkanError::SemaphoreInteropUnavailable)?;
        let semaphore = self.create_semaphore()?;
        let info = vk::ImportSemaphoreFdInfoKHR::default()
            .semaphore(semaphore)
            .handle_type(vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD)
            .fd(fd.as_raw_fd());
        // SAFETY: `semaphore` is fresh and `fd` is open.
        match unsafe { loader.import_semaphore_fd(&info) } {
            Ok(()) => {
                // Ownership moved to the driver.
                let _ = fd.into_raw_fd();
                Ok(semaphore)
            }
            Err(err) => {
                log::error!("Failed to import a semaphore from fd: {err}");
                self.destroy_semaphore(semaphore);
                Err(err.into())
            }
        }
    }

    /// Exports the payload of `semaphore` as a new fd.
    pub fn export_semaphore_fd(&self, semaphore: vk::Semaphore) -> Result<OwnedFd, VulkanError> {
        let loader = self
            .semaphore_fd
            .as_ref()
            .ok_or(VulkanError::SemaphoreInteropUnavailable)?;
        let info = vk::SemaphoreGetFdInfoKHR::default()
            .semaphore(semaphore)
            .handle_type(vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD);
        // SAFETY: `semaphore` belongs to this device.
        let raw = unsafe { loader.get_semaphore_fd(&info) }?;
        // SAFETY: the driver returned a new fd owned by the caller.
        Ok(unsafe { OwnedFd::from_raw_fd(raw) })
    }

    /// Blocks until the device is idle.
    pub fn wait_idle(&self) -> Result<(), VulkanError> {
        // SAFETY: the device is valid.
        Ok(unsafe { self.device.device_wait_idle() }?)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        // SAFETY: objects created from this device hold an `Arc` to it, so
        // none is alive any more.
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

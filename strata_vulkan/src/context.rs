// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vulkan instance, debug messenger and physical device selection.

use core::ffi::{CStr, c_char, c_void};
use core::fmt;
use std::ffi::CString;
use std::sync::Arc;

use ash::{ext, khr, vk};

use crate::error::VulkanError;
use crate::select;

/// Validation message severity accepted by the debug messenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebugSeverity {
    /// Diagnostic chatter.
    Verbose,
    /// Informational messages.
    Info,
    /// Likely bugs.
    Warning,
    /// Spec violations.
    Error,
}

/// Validation message category accepted by the debug messenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebugMessageType {
    /// Messages unrelated to validation or performance.
    General,
    /// Potentially non-optimal API usage.
    Performance,
    /// Invalid API usage.
    Validation,
}

/// Which validation messages are forwarded to the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebugFilter {
    /// Accepted severities.
    pub severities: Vec<DebugSeverity>,
    /// Accepted message types.
    pub types: Vec<DebugMessageType>,
}

impl Default for DebugFilter {
    fn default() -> Self {
        Self {
            severities: vec![DebugSeverity::Warning, DebugSeverity::Error],
            types: vec![DebugMessageType::General, DebugMessageType::Validation],
        }
    }
}

impl DebugFilter {
    /// Severity bitset for the messenger.
    #[must_use]
    pub fn severity_flags(&self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        self.severities
            .iter()
            .fold(vk::DebugUtilsMessageSeverityFlagsEXT::empty(), |acc, s| {
                acc | match s {
                    DebugSeverity::Verbose => vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                    DebugSeverity::Info => vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                    DebugSeverity::Warning => vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                    DebugSeverity::Error => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                }
            })
    }

    /// Message type bitset for the messenger.
    #[must_use]
    pub fn type_flags(&self) -> vk::DebugUtilsMessageTypeFlagsEXT {
        self.types
            .iter()
            .fold(vk::DebugUtilsMessageTypeFlagsEXT::empty(), |acc, t| {
                acc | match t {
                    DebugMessageType::General => vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                    DebugMessageType::Performance => vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    DebugMessageType::Validation => vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                }
            })
    }
}

/// Parameters for [`VulkanContext::new`].
#[derive(Clone, Debug, Default)]
pub struct ContextOptions {
    /// Reported to the driver.
    pub application_name: String,
    /// Reported to the driver as `major.minor.patch`.
    pub application_version: (u32, u32, u32),
    /// Extra instance extensions, typically the windowing system's surface
    /// extension.
    pub instance_extensions: Vec<CString>,
    /// Extra device extensions every device must enable.
    pub device_extensions: Vec<CString>,
    /// Installs a debug messenger when set.
    pub debug: Option<DebugFilter>,
}

/// Device extensions enabled when available.
const RECOMMENDED_DEVICE_EXTENSIONS: [&CStr; 3] = [
    khr::external_memory_fd::NAME,
    khr::external_semaphore::NAME,
    khr::external_semaphore_fd::NAME,
];

/// A Vulkan instance with a selected physical device.
pub struct VulkanContext {
    entry: ash::Entry,
    instance: ash::Instance,
    surface_instance: khr::surface::Instance,
    debug: Option<(ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    device_extensions: Vec<CString>,
    semaphore_interop: bool,
}

impl fmt::Debug for VulkanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanContext")
            .field("physical_device", &self.physical_device)
            .field("device_name", &self.device_name)
            .field("device_extensions", &self.device_extensions)
            .field("semaphore_interop", &self.semaphore_interop)
            .field("debug", &self.debug.is_some())
            .finish_non_exhaustive()
    }
}

impl VulkanContext {
    /// Loads Vulkan, creates an instance and picks the first physical device
    /// supporting every required device extension.
    pub fn new(options: &ContextOptions) -> Result<Arc<Self>, VulkanError> {
        // SAFETY: loading the system loader has no preconditions beyond the
        // library behaving like a Vulkan loader.
        let entry = unsafe { ash::Entry::load() }?;

        // SAFETY: the entry is valid.
        let version = unsafe { entry.try_enumerate_instance_version() }?
            .unwrap_or(vk::API_VERSION_1_0);
        select::check_api_version(version)?;

        let mut instance_extensions: Vec<&CStr> = vec![khr::surface::NAME];
        if options.debug.is_some() {
            instance_extensions.push(ext::debug_utils::NAME);
        }
        instance_extensions.extend(options.instance_extensions.iter().map(CString::as_c_str));

        // SAFETY: the entry is valid.
        let available = unsafe { entry.enumerate_instance_extension_properties(None) }?;
        let available_names: Vec<&CStr> = available
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok())
            .collect();
        if let Some(missing) = select::missing_extensions(&available_names, &instance_extensions)
            .first()
        {
            return Err(VulkanError::MissingExtension(missing.to_string_lossy().into_owned()));
        }

        let app_name = CString::new(options.application_name.as_str()).unwrap_or_default();
        let (major, minor, patch) = options.application_version;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(c"Strata")
            .api_version(select::REQUIRED_API_VERSION);
        let extension_ptrs: Vec<*const c_char> =
            instance_extensions.iter().map(|e| e.as_ptr()).collect();
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs);
        // SAFETY: create_info and everything it points to outlive the call.
        let instance = unsafe { entry.create_instance(&create_info, None) }?;

        let debug = match &options.debug {
            Some(filter) => match create_debug_messenger(&entry, &instance, filter) {
                Ok(debug) => Some(debug),
                Err(err) => {
                    log::warn!("Failed to install the Vulkan debug messenger: {err}");
                    None
                }
            },
            None => None,
        };

        let surface_instance = khr::surface::Instance::new(&entry, &instance);
        let mut context = Self {
            entry,
            instance,
            surface_instance,
            debug,
            physical_device: vk::PhysicalDevice::null(),
            device_name: String::new(),
            device_extensions: Vec::new(),
            semaphore_interop: false,
        };
        // On failure `context` drops here and destroys the instance.
        context.select_physical_device(&options.device_extensions)?;
        log::info!(
            "Selected Vulkan device {} (instance API {})",
            context.device_name,
            select::version_string(version)
        );
        Ok(Arc::new(context))
    }

    fn select_physical_device(&mut self, extra: &[CString]) -> Result<(), VulkanError> {
        let mut required: Vec<&CStr> = vec![khr::swapchain::NAME];
        required.extend(extra.iter().map(CString::as_c_str));

        // SAFETY: the instance is valid.
        let devices = unsafe { self.instance.enumerate_physical_devices() }?;
        for device in devices {
            // SAFETY: `device` was enumerated from this instance.
            let properties =
                unsafe { self.instance.enumerate_device_extension_properties(device) }?;
            let available: Vec<&CStr> = properties
                .iter()
                .filter_map(|p| p.extension_name_as_c_str().ok())
                .collect();
            if !select::missing_extensions(&available, &required).is_empty() {
                continue;
            }

            let mut enabled: Vec<CString> = required.iter().map(|e| (*e).to_owned()).collect();
            for recommended in RECOMMENDED_DEVICE_EXTENSIONS {
                if available.contains(&recommended) {
                    enabled.push(recommended.to_owned());
                } else {
                    log::warn!(
                        "Recommended device extension {} is unavailable",
                        recommended.to_string_lossy()
                    );
                }
            }
            self.semaphore_interop = [khr::external_semaphore::NAME, khr::external_semaphore_fd::NAME]
                .iter()
                .all(|e| available.contains(e));

            // SAFETY: `device` was enumerated from this instance.
            let device_properties = unsafe { self.instance.get_physical_device_properties(device) };
            self.device_name = device_properties
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.physical_device = device;
            self.device_extensions = enabled;
            return Ok(());
        }
        Err(VulkanError::NoSuitableDevice)
    }

    /// The loader entry points.
    #[must_use]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// The instance.
    #[must_use]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// `VK_KHR_surface` entry points.
    #[must_use]
    pub fn surface_instance(&self) -> &khr::surface::Instance {
        &self.surface_instance
    }

    /// The selected physical device.
    #[must_use]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Name of the selected physical device.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Device extensions every device created from this context enables.
    #[must_use]
    pub fn device_extensions(&self) -> &[CString] {
        &self.device_extensions
    }

    /// Returns `true` if semaphores can be imported from and exported to
    /// file descriptors.
    #[must_use]
    pub fn supports_semaphore_interop(&self) -> bool {
        self.semaphore_interop
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        // SAFETY: every object created from the instance holds an `Arc` to
        // this context, so none is alive any more.
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
    filter: &DebugFilter,
) -> Result<(ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT), VulkanError> {
    let loader = ext::debug_utils::Instance::new(entry, instance);
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(filter.severity_flags())
        .message_type(filter.type_flags())
        .pfn_user_callback(Some(forward_debug_message));
    // SAFETY: the callback is a plain function valid for the program's life.
    let messenger = unsafe { loader.create_debug_utils_messenger(&info, None) }?;
    Ok((loader, messenger))
}

fn log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

unsafe extern "system" fn forward_debug_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or callback data valid for the
    // duration of the call.
    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => {
            // SAFETY: `p_message` is a NUL-terminated string owned by the loader.
            unsafe { CStr::from_ptr(data.p_message) }
                .to_string_lossy()
                .into_owned()
        }
        _ => String::new(),
    };
    log::log!(target: "strata_vulkan::validation", log_level(severity), "[{types:?}] {message}");
    vk::FALSE
}

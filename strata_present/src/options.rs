// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Present-thread configuration.

use std::ffi::CString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strata_core::profiler::DEFAULT_THRESHOLD;
use strata_vulkan::{ContextOptions, DebugFilter, DebugMessageType, DebugSeverity};

use crate::error::PresentError;

/// Application version reported to the Vulkan driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

/// Severity accepted by the Vulkan debug messenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebugLevel {
    /// Diagnostic chatter.
    Verbose,
    /// Informational messages.
    Info,
    /// Likely bugs.
    Warning,
    /// Specification violations.
    Error,
}

/// Message category accepted by the Vulkan debug messenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebugType {
    /// General messages.
    General,
    /// Performance warnings.
    Performance,
    /// Validation messages.
    Validation,
}

/// Vulkan validation forwarding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VulkanDebugOptions {
    /// Accepted severities.
    pub levels: Vec<DebugLevel>,
    /// Accepted message types.
    pub types: Vec<DebugType>,
}

impl Default for VulkanDebugOptions {
    fn default() -> Self {
        Self {
            levels: vec![DebugLevel::Warning, DebugLevel::Error],
            types: vec![DebugType::General, DebugType::Validation],
        }
    }
}

/// Options for [`PresentThread::start`](crate::PresentThread::start).
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes:
///
/// ```
/// use strata_present::PresentOptions;
///
/// let options = PresentOptions::from_json(r#"{ "disable-hw-compose-present": true }"#).unwrap();
/// assert!(options.disable_hw_compose_present);
/// assert_eq!(options.frame_profiler_threshold, 32);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PresentOptions {
    /// Application name reported to the Vulkan driver.
    pub application_name: String,
    /// Application version reported to the Vulkan driver.
    pub application_version: ApplicationVersion,
    /// Hardware-composed surfaces render offscreen instead of presenting
    /// through a swapchain.
    pub disable_hw_compose_present: bool,
    /// Records every message crossing threads and writes
    /// `transfer-profiling-<pid>.json` when the present thread terminates.
    pub profile_message_transfer: bool,
    /// Directory the transfer profile is written to; the working directory
    /// when unset.
    pub transfer_profile_dir: Option<PathBuf>,
    /// Content aggregators record per-frame milestones.
    pub profile_frames: bool,
    /// Number of frames the frame profiler keeps.
    pub frame_profiler_threshold: usize,
    /// Installs a Vulkan debug messenger when set.
    pub vulkan_debug: Option<VulkanDebugOptions>,
    /// Extra Vulkan instance extensions.
    pub instance_extensions: Vec<String>,
    /// Extra Vulkan device extensions.
    pub device_extensions: Vec<String>,
}

impl Default for PresentOptions {
    fn default() -> Self {
        Self {
            application_name: "strata".to_owned(),
            application_version: ApplicationVersion::default(),
            disable_hw_compose_present: false,
            profile_message_transfer: false,
            transfer_profile_dir: None,
            profile_frames: false,
            frame_profiler_threshold: DEFAULT_THRESHOLD,
            vulkan_debug: None,
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
        }
    }
}

impl PresentOptions {
    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, PresentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Vulkan context parameters, adding `surface_extensions` to the
    /// configured instance extensions.
    pub(crate) fn context_options(&self, surface_extensions: &[&std::ffi::CStr]) -> ContextOptions {
        let mut instance_extensions = to_c_strings(&self.instance_extensions);
        for extension in surface_extensions {
            if !instance_extensions.iter().any(|e| e.as_c_str() == *extension) {
                instance_extensions.push((*extension).to_owned());
            }
        }
        let version = self.application_version;
        ContextOptions {
            application_name: self.application_name.clone(),
            application_version: (version.major, version.minor, version.patch),
            instance_extensions,
            device_extensions: to_c_strings(&self.device_extensions),
            debug: self.vulkan_debug.as_ref().map(|debug| DebugFilter {
                severities: debug
                    .levels
                    .iter()
                    .map(|level| match level {
                        DebugLevel::Verbose => DebugSeverity::Verbose,
                        DebugLevel::Info => DebugSeverity::Info,
                        DebugLevel::Warning => DebugSeverity::Warning,
                        DebugLevel::Error => DebugSeverity::Error,
                    })
                    .collect(),
                types: debug
                    .types
                    .iter()
                    .map(|ty| match ty {
                        DebugType::General => DebugMessageType::General,
                        DebugType::Performance => DebugMessageType::Performance,
                        DebugType::Validation => DebugMessageType::Validation,
                    })
                    .collect(),
            }),
        }
    }
}

fn to_c_strings(names: &[String]) -> Vec<CString> {
    names
        .iter()
        .filter_map(|name| match CString::new(name.as_str()) {
            Ok(name) => Some(name),
            Err(_) => {
                log::warn!("Ignoring extension name with an interior NUL: {name:?}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let options = PresentOptions::from_json("{}").unwrap();
        assert_eq!(options, PresentOptions::default(), "all fields default");
    }

    #[test]
    fn kebab_case_fields_parse() {
        let options = PresentOptions::from_json(
            r#"{
                "application-name": "demo",
                "application-version": { "major": 1, "minor": 2 },
                "profile-frames": true,
                "frame-profiler-threshold": 64,
                "vulkan-debug": { "levels": ["verbose", "error"], "types": ["performance"] },
                "device-extensions": ["VK_KHR_external_memory_fd"]
            }"#,
        )
        .unwrap();
        assert_eq!(options.application_name, "demo");
        assert_eq!(options.application_version.minor, 2, "nested defaults fill patch");
        assert_eq!(options.application_version.patch, 0);
        assert!(options.profile_frames);
        assert_eq!(options.frame_profiler_threshold, 64);
        let debug = options.vulkan_debug.as_ref().unwrap();
        assert_eq!(debug.levels, vec![DebugLevel::Verbose, DebugLevel::Error]);
        assert_eq!(debug.types, vec![DebugType::Performance]);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let result = PresentOptions::from_json(r#"{ "vulkan-debug": { "levels": ["loud"] } }"#);
        assert!(matches!(result, Err(PresentError::Options(_))), "unknown variant");
    }

    #[test]
    fn context_options_merge_surface_extensions() {
        let options = PresentOptions {
            instance_extensions: vec!["VK_KHR_wayland_surface".to_owned()],
            vulkan_debug: Some(VulkanDebugOptions::default()),
            ..PresentOptions::default()
        };
        let context = options.context_options(&[c"VK_KHR_wayland_surface", c"VK_KHR_xcb_surface"]);
        assert_eq!(context.instance_extensions.len(), 2, "duplicates are merged");
        let debug = context.debug.unwrap();
        assert_eq!(debug.severities, vec![DebugSeverity::Warning, DebugSeverity::Error]);
    }
}

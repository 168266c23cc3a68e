//! Validation-layer diagnostics.
//!
//! Messages from `VK_EXT_debug_utils` are forwarded to a [`DiagnosticsSink`]
//! supplied when the context is built. Rendering never depends on the sink.

use crate::error::Result;
use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

/// Severity of a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Map the most severe bit set in `flags`.
    pub fn from_flags(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Info
        } else {
            Self::Verbose
        }
    }
}

/// Receiver for validation-layer output.
pub trait DiagnosticsSink: Send + Sync {
    /// Handle one message.
    fn message(&self, severity: Severity, kind: vk::DebugUtilsMessageTypeFlagsEXT, text: &str);
}

/// Default sink that routes messages into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn message(&self, severity: Severity, kind: vk::DebugUtilsMessageTypeFlagsEXT, text: &str) {
        match severity {
            Severity::Error => tracing::error!(?kind, "validation layer: {text}"),
            Severity::Warning => tracing::warn!(?kind, "validation layer: {text}"),
            Severity::Info => tracing::debug!(?kind, "validation layer: {text}"),
            Severity::Verbose => tracing::trace!(?kind, "validation layer: {text}"),
        }
    }
}

/// Live debug messenger and the sink it writes to.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Boxed twice so the callback receives a thin pointer.
    _sink: Box<Box<dyn DiagnosticsSink>>,
}

impl DebugMessenger {
    /// Install a messenger on `instance` that forwards to `sink`.
    ///
    /// # Safety
    /// The instance must have been created with `VK_EXT_debug_utils` enabled
    /// and must outlive the messenger.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        sink: Box<dyn DiagnosticsSink>,
    ) -> Result<Self> {
        let sink = Box::new(sink);
        let user_data = std::ptr::from_ref::<Box<dyn DiagnosticsSink>>(&*sink)
            .cast_mut()
            .cast::<c_void>();

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        // SAFETY: `user_data` points into `sink`, which is stored alongside
        // the messenger and dropped only after it is destroyed.
        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };

        Ok(Self {
            loader,
            messenger,
            _sink: sink,
        })
    }

    /// Destroy the messenger.
    ///
    /// # Safety
    /// Must be called once, before the owning instance is destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: the loader passes a valid callback struct, and `user_data` is
    // the pointer installed in `DebugMessenger::new`.
    let (text, sink) = unsafe {
        let data = &*data;
        let text = if data.p_message.is_null() {
            Cow::from("")
        } else {
            CStr::from_ptr(data.p_message).to_string_lossy()
        };
        (text, &*user_data.cast::<Box<dyn DiagnosticsSink>>())
    };

    sink.message(Severity::from_flags(severity), kind, &text);
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_picks_most_severe_bit() {
        let flags = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        assert_eq!(Severity::from_flags(flags), Severity::Error);
        assert_eq!(
            Severity::from_flags(vk::DebugUtilsMessageSeverityFlagsEXT::INFO),
            Severity::Info
        );
        assert_eq!(
            Severity::from_flags(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            Severity::Verbose
        );
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Verbose);
    }
}

use std::{
    collections::HashSet,
    ffi::{c_char, c_void, CStr, CString},
    sync::Arc,
};

use ash::{ext::debug_utils, vk};
use raw_window_handle::HasDisplayHandle;

use crate::error::{GfxHalError, Result};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };
    let id = callback_data.message_id_number;

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::debug!("{:?} ({}:{}) {}", message_type, message_id_name, id, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!("{:?} ({}:{}) {}", message_type, message_id_name, id, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!("{:?} ({}:{}) {}", message_type, message_id_name, id, message);
        }
        _ => {
            tracing::error!("{:?} ({}:{}) {}", message_type, message_id_name, id, message);
        }
    }

    vk::FALSE
}

#[derive(Clone, Debug)]
pub struct InstanceConfig {
    pub application_name: String,
    pub engine_name: String,
    pub application_version: u32,
    pub engine_version: u32,
    pub api_version: u32,
    /// Enable Vulkan validation layers and the debug messenger.
    pub enable_validation: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            application_name: "Vulkan Sample".to_string(),
            engine_name: "Sample Renderer".to_string(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_1,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Represents the Vulkan API Instance
///
/// Owns the `ash::Entry`, `ash::Instance` and, when validation is enabled, the
/// debug messenger that forwards layer output to `tracing`.
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan `Instance` with the surface extensions the window system needs.
    ///
    /// Validation is silently downgraded to disabled when the Khronos layer is not installed.
    pub fn new(
        config: &InstanceConfig,
        display_handle: &dyn HasDisplayHandle,
    ) -> Result<Arc<Self>> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new(config.application_name.clone())?;
        let engine_name = CString::new(config.engine_name.clone())?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(config.application_version)
            .engine_name(&engine_name)
            .engine_version(config.engine_version)
            .api_version(config.api_version);

        let enable_validation = config.enable_validation
            && Self::check_validation_layer_support(&entry, VALIDATION_LAYER)?;
        if config.enable_validation && !enable_validation {
            tracing::warn!("Validation layers requested but not supported. Disabling.");
        }
        let enabled_layer_names: Vec<*const c_char> = if enable_validation {
            tracing::info!("Validation layers enabled.");
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let raw_display = display_handle.display_handle()?.as_raw();
        let surface_extensions = ash_window::enumerate_required_extensions(raw_display)?;

        let mut required: Vec<&CStr> = surface_extensions
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();
        if enable_validation {
            required.push(debug_utils::NAME);
        }
        required.sort_unstable();
        required.dedup();

        Self::check_instance_extension_support(&entry, &required)?;
        tracing::info!("Required instance extensions supported: {:?}", required);

        let enabled_extension_names: Vec<*const c_char> =
            required.iter().map(|ext| ext.as_ptr()).collect();

        let mut debug_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);

        if enable_validation {
            instance_create_info = instance_create_info.push_next(&mut debug_create_info);
        }

        let instance = unsafe { entry.create_instance(&instance_create_info, None)? };
        tracing::info!("Vulkan instance created successfully.");

        let (debug_utils, debug_messenger) = if enable_validation {
            let utils = debug_utils::Instance::new(&entry, &instance);
            let messenger = unsafe { utils.create_debug_utils_messenger(&debug_create_info, None) };
            match messenger {
                Ok(messenger) => {
                    tracing::debug!("Debug messenger created.");
                    (Some(utils), Some(messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            (None, None)
        };

        Ok(Arc::new(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        }))
    }

    /// Provides access to the loaded Vulkan entry points.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Provides access to the raw `ash::Instance`.
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.instance
    }

    fn check_validation_layer_support(entry: &ash::Entry, layer: &CStr) -> Result<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let found = available_layers
            .iter()
            .any(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) } == layer);
        if !found {
            tracing::warn!("Validation layer {:?} not found.", layer);
        }
        Ok(found)
    }

    fn check_instance_extension_support(
        entry: &ash::Entry,
        required_extensions: &[&CStr],
    ) -> Result<()> {
        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let available_names: HashSet<&CStr> = available_extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();

        for ext in required_extensions {
            if !available_names.contains(ext) {
                tracing::error!("Missing required instance extension: {:?}", ext);
                return Err(GfxHalError::MissingExtension(
                    ext.to_string_lossy().into_owned(),
                ));
            }
        }
        Ok(())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger.take())
            {
                tracing::debug!("Destroying debug messenger...");
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            tracing::debug!("Destroying Vulkan instance...");
            self.instance.destroy_instance(None);
        }
        tracing::debug!("Vulkan instance destroyed");
    }
}

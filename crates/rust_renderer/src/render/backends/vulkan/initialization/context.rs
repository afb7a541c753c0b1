//! Device bootstrap: instance, validation messenger, surface and GPU selection
//!
//! Owns the instance, the debug messenger, the window surface, the selected
//! physical device and the logical device. Everything else in the backend
//! borrows from or clones handles out of this context and must be dropped
//! before it.

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use thiserror::Error;

use crate::assets::AssetError;
use crate::render::backends::vulkan::initialization::policy::DevicePolicy;
use crate::render::window::Window;

/// Errors raised by the Vulkan backend
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan call returned an unexpected result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Loader, instance or surface setup failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device passed the selection rules
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type satisfies both the filter and the property mask
    #[error("No suitable memory type for filter {type_filter:#b} with {properties:?}")]
    NoSuitableMemoryType {
        /// Allowed memory type bits
        type_filter: u32,
        /// Required property flags
        properties: vk::MemoryPropertyFlags,
    },

    /// Image layout pair the transition helper does not know
    #[error("Unsupported layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        from: vk::ImageLayout,
        /// Requested layout
        to: vk::ImageLayout,
    },

    /// Format lacks a capability the operation needs
    #[error("Unsupported format {format:?}: {reason}")]
    UnsupportedFormat {
        /// Offending format
        format: vk::Format,
        /// What is missing
        reason: String,
    },

    /// SPIR-V file missing or unreadable
    #[error("Failed to load shader {path}: {source}")]
    ShaderLoad {
        /// Shader path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The call is not valid in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// What was wrong
        reason: String,
    },

    /// Texture or scene load failed
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result alias used across the backend
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Device extensions every selected GPU must expose
pub fn required_device_extensions() -> [&'static CStr; 3] {
    [
        SwapchainLoader::name(),
        vk::ExtDescriptorIndexingFn::name(),
        vk::KhrMaintenance3Fn::name(),
    ]
}

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

fn cstring(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|e| VulkanError::InitializationFailed(format!("Invalid name {:?}: {}", value, e)))
}

/// Instance plus the optional validation messenger; destroyed on drop
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Instance handle
    pub instance: Instance,
    /// Debug utils loader, present only with validation
    #[cfg(debug_assertions)]
    pub debug_utils: Option<DebugUtils>,
    /// Messenger routing validation output into `log`
    #[cfg(debug_assertions)]
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.2 instance with the extensions the window needs
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = cstring(app_name)?;
        let engine_name_cstr = cstring("No Engine")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e)))?;

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| cstring(ext))
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        extensions.push(vk::KhrGetPhysicalDeviceProperties2Fn::name().as_ptr());

        let validate = cfg!(debug_assertions) && enable_validation;

        #[cfg(debug_assertions)]
        if validate {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if validate { vec![cstring(VALIDATION_LAYER)?] } else { Vec::new() };
        let layer_names_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if validate {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        log::debug!(
            "Created Vulkan instance ({} extensions, validation {})",
            extensions.len(),
            if validate { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) = (&self.debug_utils, &self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Forwards validation messages to `log` by severity
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// The GPU picked at startup and the queue families it offers
pub struct PhysicalDeviceInfo {
    /// Physical device handle
    pub device: vk::PhysicalDevice,
    /// Properties, including limits and the device name
    pub properties: vk::PhysicalDeviceProperties,
    /// Core features the device reports
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Keep the first device that passes every selection rule and the policy
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        policy: &dyn DevicePolicy,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader, policy) {
                Ok(device_info) => {
                    log::info!("Selected GPU: {}", device_info.name());
                    return Ok(device_info);
                }
                Err(reason) => log::debug!("Skipping GPU: {}", reason),
            }
        }

        Err(VulkanError::NoSuitableDevice)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        policy: &dyn DevicePolicy,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };

            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family found".to_string()))?;

        let present_family = present_family
            .ok_or_else(|| VulkanError::InitializationFailed("No present queue family found".to_string()))?;

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        let missing: Vec<_> = required_device_extensions()
            .into_iter()
            .filter(|required| {
                !extensions.iter().any(|available| {
                    let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                    extension_name == *required
                })
            })
            .collect();

        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Required device extensions not supported: {:?}",
                missing
            )));
        }

        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };

        if formats.is_empty() || present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        if !policy.is_device_suitable(&properties, &features) {
            return Err(VulkanError::InitializationFailed("Rejected by device policy".to_string()));
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Device name as reported by the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Logical device with one queue per unique family; destroyed on drop
pub struct LogicalDevice {
    /// Device dispatch table
    pub device: Device,
    /// Queue command buffers are submitted to
    pub graphics_queue: vk::Queue,
    /// Queue images are presented on; may equal the graphics queue
    pub present_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// `VK_KHR_swapchain` function table
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device with descriptor indexing turned on
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        policy: &dyn DevicePolicy,
    ) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [physical_device_info.graphics_family, physical_device_info.present_family]
            .into_iter()
            .collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions: Vec<*const c_char> =
            required_device_extensions().iter().map(|ext| ext.as_ptr()).collect();

        let mut device_features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        policy.enable_features(&physical_device_info.features, &mut device_features);

        let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::builder()
            .shader_sampled_image_array_non_uniform_indexing(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_update_unused_while_pending(true)
            .descriptor_binding_variable_descriptor_count(true)
            .runtime_descriptor_array(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features)
            .push_next(&mut indexing_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.present_family, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!(
            "Created logical device (graphics family {}, present family {})",
            physical_device_info.graphics_family,
            physical_device_info.present_family
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical_device_info.graphics_family,
            present_family: physical_device_info.present_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Device context: instance, surface, physical and logical device
///
/// Field order is drop order: the logical device goes before the instance.
pub struct VulkanContext {
    /// Window surface
    pub surface: vk::SurfaceKHR,
    /// `VK_KHR_surface` function table
    pub surface_loader: Surface,
    /// The selected GPU
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device and queues
    pub device: LogicalDevice,
    /// Instance and validation messenger
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Bootstrap the device for `window`
    ///
    /// Fails with [`VulkanError::NoSuitableDevice`] when no GPU qualifies.
    pub fn new(window: &Window, app_name: &str, enable_validation: bool, policy: &dyn DevicePolicy) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, enable_validation)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device =
            PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader, policy)?;

        let device = LogicalDevice::new(&instance.instance, &physical_device, policy)?;

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Instance dispatch table
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Clone of the device dispatch table for RAII wrappers
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// `VK_KHR_swapchain` function table
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Queue for rendering and transfers
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Queue for presentation
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Physical device selection (prefer discrete GPU)
// - Logical device + queue creation
//
// Memory allocation lives in `ResourceAllocator`, which keeps the device alive
// through an Arc, so the allocator is always torn down first.

use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::surface;
use crate::error::DeviceError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// What the selection step knows about one enumerated GPU
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub graphics_queue_family: Option<u32>,
    pub missing_extensions: Vec<String>,
    pub missing_features: Vec<&'static str>,
}

impl DeviceCandidate {
    /// Why this GPU cannot be used, if it cannot
    pub fn rejection(&self) -> Option<String> {
        let reason = if self.api_version < vk::API_VERSION_1_3 {
            format!(
                "Vulkan {}.{} < 1.3",
                vk::api_version_major(self.api_version),
                vk::api_version_minor(self.api_version)
            )
        } else if self.graphics_queue_family.is_none() {
            "no graphics queue".to_string()
        } else if !self.missing_extensions.is_empty() {
            format!("missing extensions {}", self.missing_extensions.join(", "))
        } else if !self.missing_features.is_empty() {
            format!("missing features {}", self.missing_features.join(", "))
        } else {
            return None;
        };
        Some(format!("{}: {}", self.name, reason))
    }

    pub fn score(&self) -> u32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            _ => 1,
        }
    }
}

/// Pick the best usable candidate. Equal scores keep enumeration order.
pub fn select_candidate(candidates: &[DeviceCandidate]) -> Result<usize, DeviceError> {
    if candidates.is_empty() {
        return Err(DeviceError::NoDevice);
    }

    let mut best: Option<(usize, u32)> = None;
    let mut reasons = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if let Some(reason) = candidate.rejection() {
            reasons.push(reason);
            continue;
        }
        let score = candidate.score();
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
        .ok_or(DeviceError::NoSuitableDevice(reasons))
}

/// Highest sample count present in `flags`
pub fn highest_sample_count(flags: vk::SampleCountFlags) -> u32 {
    [64, 32, 16, 8, 4, 2]
        .into_iter()
        .find(|&count| flags.contains(vk::SampleCountFlags::from_raw(count)))
        .unwrap_or(1)
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    pub entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    // Debug utils (if validation enabled)
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    /// Whether the swapchain extension was enabled
    pub presentation: bool,
}

impl VulkanDevice {
    /// Create Vulkan device
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers when installed
    /// * `display` - Display the device will present to; `None` for headless use
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: Option<RawDisplayHandle>,
    ) -> Result<Arc<Self>, DeviceError> {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }.map_err(|e| DeviceError::Loading(e.to_string()))?;

        // Step 2: Create instance
        let enable_validation = enable_validation && Self::validation_available(&entry);
        let instance = Self::create_instance(&entry, app_name, enable_validation, display)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Pick physical device (GPU)
        let presentation = display.is_some();
        let (physical_device, graphics_queue_family) = Self::pick_physical_device(&instance, presentation)?;

        // Step 5: Create logical device
        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, graphics_queue_family, presentation)?;

        // Step 6: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let device = Self {
            device,
            physical_device,
            instance,
            entry,
            graphics_queue,
            graphics_queue_family,
            debug_utils,
            properties,
            memory_properties,
            presentation,
        };
        log::info!("Selected GPU: {}", device.name());
        log::info!("API Version: {}", device.api_version_string());

        Ok(Arc::new(device))
    }

    fn validation_available(entry: &Entry) -> bool {
        let layers = entry.enumerate_instance_layer_properties().unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !found {
            log::warn!("Validation layers requested but not installed; continuing without them");
        }
        found
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display: Option<RawDisplayHandle>,
    ) -> Result<ash::Instance, DeviceError> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"vkscene";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<*const std::ffi::c_char> = match display {
            Some(display) => surface::required_instance_extensions(display)?
                .iter()
                .map(|name| name.as_ptr())
                .collect(),
            None => Vec::new(),
        };
        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        // Validation layers
        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }?;
        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT), DeviceError> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    fn describe(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        presentation: bool,
    ) -> Result<DeviceCandidate, DeviceError> {
        let props = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        // Find graphics queue family
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let graphics_queue_family = queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);

        let mut missing_extensions = Vec::new();
        if presentation {
            let available = unsafe { instance.enumerate_device_extension_properties(device) }?;
            let swapchain = ash::extensions::khr::Swapchain::name();
            let supported = available
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == swapchain);
            if !supported {
                missing_extensions.push(swapchain.to_string_lossy().into_owned());
            }
        }

        let mut missing_features = Vec::new();
        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            missing_features.push("samplerAnisotropy");
        }
        if props.api_version >= vk::API_VERSION_1_3 {
            let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut features13);
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
            if features13.dynamic_rendering != vk::TRUE {
                missing_features.push("dynamicRendering");
            }
        }

        Ok(DeviceCandidate {
            name,
            device_type: props.device_type,
            api_version: props.api_version,
            graphics_queue_family,
            missing_extensions,
            missing_features,
        })
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        presentation: bool,
    ) -> Result<(vk::PhysicalDevice, u32), DeviceError> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        let candidates = devices
            .iter()
            .map(|&device| Self::describe(instance, device, presentation))
            .collect::<Result<Vec<_>, _>>()?;
        for candidate in &candidates {
            log::debug!("GPU candidate {:?} (score {})", candidate.name, candidate.score());
        }

        let index = select_candidate(&candidates)?;
        let family = candidates[index].graphics_queue_family.ok_or(DeviceError::NoDevice)?;
        Ok((devices[index], family))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        presentation: bool,
    ) -> Result<(ash::Device, vk::Queue), DeviceError> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        // Dynamic rendering is core in 1.3, only the swapchain is an extension
        let mut extensions = Vec::new();
        if presentation {
            extensions.push(ash::extensions::khr::Swapchain::name().as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true).build();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut features13);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn api_version_string(&self) -> String {
        let version = self.properties.api_version;
        format!(
            "{}.{}.{}",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version)
        )
    }

    /// Highest MSAA count usable for both color and depth targets
    pub fn max_usable_samples(&self) -> u32 {
        let limits = &self.properties.limits;
        highest_sample_count(limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts)
    }

    /// Largest supported sample count not above `requested`
    pub fn clamp_samples(&self, requested: u32) -> u32 {
        let max = self.max_usable_samples();
        let mut samples = 1;
        while samples * 2 <= requested.min(max) {
            samples *= 2;
        }
        samples
    }

    /// Whether mip chains of `format` can be generated with linear blits
    pub fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type,
            api_version: vk::API_VERSION_1_3,
            graphics_queue_family: Some(0),
            missing_extensions: Vec::new(),
            missing_features: Vec::new(),
        }
    }

    #[test]
    fn discrete_beats_integrated() {
        let candidates = [
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate("llvmpipe", vk::PhysicalDeviceType::CPU),
        ];
        assert_eq!(select_candidate(&candidates).unwrap(), 1);
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let candidates = [
            candidate("first", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate("second", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select_candidate(&candidates).unwrap(), 0);
    }

    #[test]
    fn unusable_devices_are_skipped_with_reasons() {
        let mut old = candidate("old", vk::PhysicalDeviceType::DISCRETE_GPU);
        old.api_version = vk::API_VERSION_1_2;
        let mut headless = candidate("compute-only", vk::PhysicalDeviceType::DISCRETE_GPU);
        headless.graphics_queue_family = None;
        let cpu = candidate("llvmpipe", vk::PhysicalDeviceType::CPU);

        assert_eq!(select_candidate(&[old.clone(), headless.clone(), cpu]).unwrap(), 2);

        match select_candidate(&[old, headless]) {
            Err(DeviceError::NoSuitableDevice(reasons)) => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("1.2 < 1.3"));
                assert!(reasons[1].contains("no graphics queue"));
            }
            other => panic!("expected NoSuitableDevice, got {other:?}"),
        }
    }

    #[test]
    fn missing_features_are_reported() {
        let mut gpu = candidate("gpu", vk::PhysicalDeviceType::INTEGRATED_GPU);
        gpu.missing_features.push("dynamicRendering");
        let reason = gpu.rejection().unwrap();
        assert!(reason.contains("dynamicRendering"));
    }

    #[test]
    fn empty_enumeration_is_no_device() {
        assert!(matches!(select_candidate(&[]), Err(DeviceError::NoDevice)));
    }

    #[test]
    fn sample_count_flags() {
        let flags = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_8;
        assert_eq!(highest_sample_count(flags), 8);
        assert_eq!(highest_sample_count(vk::SampleCountFlags::TYPE_1), 1);
        assert_eq!(highest_sample_count(vk::SampleCountFlags::empty()), 1);
    }
}

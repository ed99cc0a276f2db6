//! Ray tracing capability and limit detection.

use std::ffi::CStr;

use ash::vk;
use rtpipe_program::BackendLimits;

/// Device extensions a ray tracing pipeline needs.
pub const REQUIRED_EXTENSIONS: [&CStr; 3] = [
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::acceleration_structure::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Ray tracing pipeline properties of a physical device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayTracingLimits {
    /// Size of a shader group handle in bytes.
    pub shader_group_handle_size: u32,
    /// Maximum pipeline ray recursion depth.
    pub max_ray_recursion_depth: u32,
    /// Maximum hit attribute size in bytes.
    pub max_ray_hit_attribute_size: u32,
    /// Maximum number of rays in one dispatch.
    pub max_ray_dispatch_invocation_count: u32,
}

impl RayTracingLimits {
    /// Query limits from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let mut rt_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut properties2 =
            vk::PhysicalDeviceProperties2::default().push_next(&mut rt_properties);
        // SAFETY: caller guarantees valid handles.
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };

        Self::from(&rt_properties)
    }

    /// Whether the device exposes every extension in [`REQUIRED_EXTENSIONS`].
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn is_supported(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
        // SAFETY: caller guarantees valid handles.
        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .unwrap_or_default();

        REQUIRED_EXTENSIONS.iter().all(|required| {
            extensions.iter().any(|ext| {
                // SAFETY: the driver NUL-terminates extension names.
                let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                name == *required
            })
        })
    }

    /// Limits in the form the program model validates against.
    ///
    /// Vulkan does not bound the payload size, so it is left unlimited.
    #[must_use]
    pub const fn backend_limits(&self) -> BackendLimits {
        BackendLimits {
            max_trace_recursion_depth: self.max_ray_recursion_depth,
            max_payload_size: None,
            max_attributes_size: self.max_ray_hit_attribute_size,
        }
    }
}

impl From<&vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'_>> for RayTracingLimits {
    fn from(properties: &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'_>) -> Self {
        Self {
            shader_group_handle_size: properties.shader_group_handle_size,
            max_ray_recursion_depth: properties.max_ray_recursion_depth,
            max_ray_hit_attribute_size: properties.max_ray_hit_attribute_size,
            max_ray_dispatch_invocation_count: properties.max_ray_dispatch_invocation_count,
        }
    }
}

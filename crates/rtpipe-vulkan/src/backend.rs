//! Vulkan pipeline backend.
//!
//! Builds `VK_KHR_ray_tracing_pipeline` pipelines from linked programs.

use std::sync::Arc;

use ash::vk;
use rtpipe_core::{GeometryTypes, LayoutId, Result, RtError, SceneId};
use rtpipe_program::{BackendLimits, PipelineBackend, StateObjectRequest, VarsLayout};

use crate::limits::RayTracingLimits;
use crate::spirv::VulkanProgram;

/// Pipeline layout supplied by the caller.
///
/// The caller owns the layout handle and must keep it alive while state
/// objects built with it are in use.
#[derive(Debug)]
pub struct VulkanVarsLayout {
    id: LayoutId,
    pipeline_layout: vk::PipelineLayout,
}

impl VulkanVarsLayout {
    /// Wrap an existing pipeline layout under a fresh identity.
    #[must_use]
    pub fn new(pipeline_layout: vk::PipelineLayout) -> Self {
        Self {
            id: LayoutId::new(),
            pipeline_layout,
        }
    }

    /// Raw pipeline layout handle.
    #[must_use]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }
}

impl VarsLayout for VulkanVarsLayout {
    fn id(&self) -> LayoutId {
        self.id
    }
}

/// A built ray tracing pipeline. Destroyed when the last handle drops.
pub struct VulkanStateObject {
    pipeline: vk::Pipeline,
    scene: Option<SceneId>,
    device: Arc<ash::Device>,
}

impl VulkanStateObject {
    /// Raw pipeline handle.
    #[must_use]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Scene the pipeline was built for.
    #[must_use]
    pub fn scene(&self) -> Option<SceneId> {
        self.scene
    }
}

impl Drop for VulkanStateObject {
    fn drop(&mut self) {
        // SAFETY: the pipeline was created on this device and the cache only
        // drops it once no handle remains.
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// [`PipelineBackend`] for Vulkan devices with ray tracing support.
pub struct VulkanBackend {
    device: Arc<ash::Device>,
    rt_loader: ash::khr::ray_tracing_pipeline::Device,
    limits: RayTracingLimits,
}

impl VulkanBackend {
    /// Create a backend for `device`.
    ///
    /// # Safety
    /// - The device must have been created from `instance` and
    ///   `physical_device` with the ray tracing pipeline extension enabled.
    /// - All handles must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: Arc<ash::Device>,
    ) -> Self {
        let rt_loader = ash::khr::ray_tracing_pipeline::Device::new(instance, &device);
        // SAFETY: forwarded from the caller.
        let limits = unsafe { RayTracingLimits::query(instance, physical_device) };

        tracing::info!(
            max_recursion = limits.max_ray_recursion_depth,
            max_attributes = limits.max_ray_hit_attribute_size,
            handle_size = limits.shader_group_handle_size,
            "Vulkan ray tracing backend ready"
        );

        Self {
            device,
            rt_loader,
            limits,
        }
    }

    /// Device limits.
    #[must_use]
    pub fn ray_tracing_limits(&self) -> &RayTracingLimits {
        &self.limits
    }

    /// Create one shader module per stage. On failure, modules created so far
    /// are destroyed.
    unsafe fn create_shader_modules(&self, program: &VulkanProgram) -> Result<Vec<vk::ShaderModule>> {
        let mut modules = Vec::with_capacity(program.stages.len());
        for stage in &program.stages {
            let info = vk::ShaderModuleCreateInfo::default().code(&stage.spirv);
            // SAFETY: device is valid for the backend's lifetime.
            match unsafe { self.device.create_shader_module(&info, None) } {
                Ok(module) => modules.push(module),
                Err(e) => {
                    for module in modules {
                        // SAFETY: module was created above and is unused.
                        unsafe { self.device.destroy_shader_module(module, None) };
                    }
                    return Err(RtError::BackendBuildFailed(format!(
                        "{} shader module '{}': {e}",
                        stage.kind.name(),
                        stage.entry_point.to_string_lossy()
                    )));
                }
            }
        }
        Ok(modules)
    }

    fn check_limits(&self, depth: u32, attributes: u32) -> Result<()> {
        if depth > self.limits.max_ray_recursion_depth {
            return Err(RtError::ConfigurationLimitExceeded {
                what: "max trace recursion depth",
                value: depth,
                max: self.limits.max_ray_recursion_depth,
            });
        }
        if attributes > self.limits.max_ray_hit_attribute_size {
            return Err(RtError::ConfigurationLimitExceeded {
                what: "max attributes size",
                value: attributes,
                max: self.limits.max_ray_hit_attribute_size,
            });
        }
        Ok(())
    }
}

impl PipelineBackend for VulkanBackend {
    type Program = VulkanProgram;
    type Layout = VulkanVarsLayout;
    type StateObject = VulkanStateObject;

    fn name(&self) -> &str {
        "vulkan"
    }

    fn limits(&self) -> BackendLimits {
        self.limits.backend_limits()
    }

    fn build_state_object(
        &self,
        request: &StateObjectRequest<'_, VulkanProgram, VulkanVarsLayout>,
    ) -> Result<VulkanStateObject> {
        self.check_limits(request.max_trace_recursion_depth, request.max_attributes_size)?;

        if let Some(scene) = request.scene {
            let types = scene.geometry_types();
            if types.contains(GeometryTypes::CURVES) && request.groups.curve_hit.count() == 0 {
                tracing::warn!("Scene contains curves but the program has no curve hit groups");
            }
            if types.contains(GeometryTypes::PARTICLES) && request.groups.particle_hit.count() == 0
            {
                tracing::warn!("Scene contains particles but the program has no particle hit groups");
            }
        }

        let program = request.program;

        // SAFETY: device is valid for the backend's lifetime.
        let modules = unsafe { self.create_shader_modules(program)? };

        let stages: Vec<_> = program
            .stages
            .iter()
            .zip(&modules)
            .map(|(stage, &module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.kind.flags())
                    .module(module)
                    .name(&stage.entry_point)
            })
            .collect();

        let groups = program.layout.create_infos();

        let interface = vk::RayTracingPipelineInterfaceCreateInfoKHR::default()
            .max_pipeline_ray_payload_size(request.max_payload_size)
            .max_pipeline_ray_hit_attribute_size(request.max_attributes_size);

        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(request.max_trace_recursion_depth)
            .library_interface(&interface)
            .layout(request.layout.pipeline_layout());

        // SAFETY: all create-info pointers outlive the call.
        let result = unsafe {
            self.rt_loader.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        };

        // Shader modules are no longer needed once the pipeline exists
        for module in modules {
            // SAFETY: modules were created above and pipeline creation has returned.
            unsafe { self.device.destroy_shader_module(module, None) };
        }

        let pipeline = result
            .map_err(|e| RtError::BackendBuildFailed(format!("Ray tracing pipeline: {e:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| RtError::BackendBuildFailed("driver returned no pipeline".to_string()))?;

        tracing::debug!(
            stages = stages.len(),
            groups = groups.len(),
            scene = ?request.scene.map(|s| s.id().raw()),
            "Created ray tracing pipeline"
        );

        Ok(VulkanStateObject {
            pipeline,
            scene: request.scene.map(|s| s.id()),
            device: Arc::clone(&self.device),
        })
    }
}

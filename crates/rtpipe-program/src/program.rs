//! Ray tracing programs.

use std::sync::Arc;

use rtpipe_core::constants::{DEFAULT_MAX_ATTRIBUTES_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};
use rtpipe_core::{CompilerFlags, Result, RtError, SceneId};

use crate::backend::{
    BackendLimits, PipelineBackend, Scene, ShaderCompiler, StateObjectRequest, VarsLayout,
};
use crate::cache::{StateObjectCache, StateObjectKey};
use crate::descriptor::{EntryPointRole, ProgramDescriptor};
use crate::groups::GroupTables;

/// A compiled ray tracing program.
///
/// Owns the compiled program, the group index tables and a cache of
/// pipeline state objects keyed by (scene, variable layout). The tables and
/// the compiled program never change after creation.
pub struct RtProgram<B: PipelineBackend> {
    desc: ProgramDescriptor,
    compiled: B::Program,
    groups: GroupTables,
    max_payload_size: u32,
    max_attributes_size: u32,
    backend: Arc<B>,
    scene: Option<Arc<dyn Scene>>,
    rtso_cache: StateObjectCache<B::StateObject>,
}

impl<B: PipelineBackend> RtProgram<B> {
    /// Create a program with the default payload and attribute sizes.
    pub fn create<C>(desc: &ProgramDescriptor, compiler: &C, backend: Arc<B>) -> Result<Self>
    where
        C: ShaderCompiler<Program = B::Program>,
    {
        Self::create_with_sizes(
            desc,
            compiler,
            backend,
            DEFAULT_MAX_PAYLOAD_SIZE,
            DEFAULT_MAX_ATTRIBUTES_SIZE,
        )
    }

    /// Create a program.
    ///
    /// # Arguments
    /// * `desc` - Program description, copied into the program
    /// * `compiler` - Compiler that resolves entry points and assigns group indices
    /// * `backend` - Backend that later builds the pipeline state objects
    /// * `max_payload_size` - Maximum ray payload size in bytes
    /// * `max_attributes_size` - Maximum hit attribute size in bytes
    ///
    /// Nothing is created if any step fails.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn create_with_sizes<C>(
        desc: &ProgramDescriptor,
        compiler: &C,
        backend: Arc<B>,
        max_payload_size: u32,
        max_attributes_size: u32,
    ) -> Result<Self>
    where
        C: ShaderCompiler<Program = B::Program>,
    {
        validate(desc, &backend.limits(), max_payload_size, max_attributes_size)?;

        let compiled = compiler.compile(desc)?;
        let groups = GroupTables::from_assignments(desc, &compiled.group_indices)?;

        tracing::info!(
            backend = backend.name(),
            ray_gen = groups.ray_gen.count(),
            miss = groups.miss.count(),
            hit = groups.hit.count(),
            particle_hit = groups.particle_hit.count(),
            curve_hit = groups.curve_hit.count(),
            max_depth = desc.max_trace_recursion_depth(),
            "Created ray tracing program"
        );

        Ok(Self {
            desc: desc.clone(),
            compiled: compiled.program,
            groups,
            max_payload_size,
            max_attributes_size,
            backend,
            scene: None,
            rtso_cache: StateObjectCache::new(),
        })
    }

    /// Get the pipeline state object for the current scene and `layout`.
    ///
    /// Built on the first request per (scene, layout) pair and cached
    /// afterwards. On failure the cache is left as it was.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn get_rtso(&self, layout: &B::Layout) -> Result<Arc<B::StateObject>> {
        let key = StateObjectKey {
            scene: self.scene_id(),
            layout: layout.id(),
        };
        self.rtso_cache.get_or_build(key, || {
            let request = StateObjectRequest {
                program: &self.compiled,
                groups: &self.groups,
                scene: self.scene.as_deref(),
                layout,
                max_trace_recursion_depth: self.max_trace_recursion_depth(),
                max_payload_size: self.max_payload_size,
                max_attributes_size: self.max_attributes_size,
            };
            self.backend.build_state_object(&request)
        })
    }

    /// Bind a scene. State objects built for any other scene are dropped.
    pub fn set_scene(&mut self, scene: Option<Arc<dyn Scene>>) {
        let new_id = scene.as_ref().map(|s| s.id());
        let old_id = self.scene_id();
        self.scene = scene;

        if new_id != old_id {
            let dropped = self.rtso_cache.retain_scene(new_id);
            tracing::debug!(
                old = ?old_id.map(SceneId::raw),
                new = ?new_id.map(SceneId::raw),
                dropped,
                "Scene changed, invalidated state objects"
            );
        }
    }

    /// Currently bound scene.
    #[must_use]
    pub fn scene(&self) -> Option<&Arc<dyn Scene>> {
        self.scene.as_ref()
    }

    fn scene_id(&self) -> Option<SceneId> {
        self.scene.as_ref().map(|s| s.id())
    }

    /// Max trace recursion depth.
    #[must_use]
    pub fn max_trace_recursion_depth(&self) -> u32 {
        self.desc.max_trace_recursion_depth()
    }

    /// Max ray payload size in bytes.
    #[must_use]
    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    /// Max hit attribute size in bytes.
    #[must_use]
    pub fn max_attributes_size(&self) -> u32 {
        self.max_attributes_size
    }

    /// Description the program was created from.
    #[must_use]
    pub fn descriptor(&self) -> &ProgramDescriptor {
        &self.desc
    }

    /// Backend program object.
    #[must_use]
    pub fn compiled(&self) -> &B::Program {
        &self.compiled
    }

    /// Group index tables.
    #[must_use]
    pub fn group_tables(&self) -> &GroupTables {
        &self.groups
    }

    /// Backend the program builds state objects with.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Number of cached state objects.
    #[must_use]
    pub fn cached_state_objects(&self) -> usize {
        self.rtso_cache.len()
    }

    /// Number of ray-generation shader slots, including unassigned ones.
    #[must_use]
    pub fn ray_gen_count(&self) -> u32 {
        self.groups.ray_gen.count()
    }

    /// Shader group index of the ray-generation shader at `index`.
    ///
    /// `Ok(None)` for a slot inside the table that nothing was registered at.
    /// Fails with [`RtError::IndexOutOfRange`] past [`Self::ray_gen_count`].
    pub fn ray_gen_index(&self, index: u32) -> Result<Option<u32>> {
        self.groups.ray_gen.index(index)
    }

    /// Number of miss shader slots, including unassigned ones.
    #[must_use]
    pub fn miss_count(&self) -> u32 {
        self.groups.miss.count()
    }

    /// Shader group index of the miss shader at `index`.
    ///
    /// `Ok(None)` for a slot inside the table that nothing was registered at.
    /// Fails with [`RtError::IndexOutOfRange`] past [`Self::miss_count`].
    pub fn miss_index(&self, index: u32) -> Result<Option<u32>> {
        self.groups.miss.index(index)
    }

    /// Number of standard hit group slots, including unassigned ones.
    #[must_use]
    pub fn hit_count(&self) -> u32 {
        self.groups.hit.count()
    }

    /// Shader group index of the standard hit group at `index`.
    ///
    /// `Ok(None)` for a slot inside the table that nothing was registered at.
    /// Fails with [`RtError::IndexOutOfRange`] past [`Self::hit_count`].
    pub fn hit_index(&self, index: u32) -> Result<Option<u32>> {
        self.groups.hit.index(index)
    }

    /// Number of particle hit group slots, including unassigned ones.
    #[must_use]
    pub fn particle_hit_count(&self) -> u32 {
        self.groups.particle_hit.count()
    }

    /// Shader group index of the particle hit group at `index`.
    ///
    /// `Ok(None)` for a slot inside the table that nothing was registered at.
    /// Fails with [`RtError::IndexOutOfRange`] past [`Self::particle_hit_count`].
    pub fn particle_hit_index(&self, index: u32) -> Result<Option<u32>> {
        self.groups.particle_hit.index(index)
    }

    /// Number of curve hit group slots, including unassigned ones.
    #[must_use]
    pub fn curve_hit_count(&self) -> u32 {
        self.groups.curve_hit.count()
    }

    /// Shader group index of the curve hit group at `index`.
    ///
    /// `Ok(None)` for a slot inside the table that nothing was registered at.
    /// Fails with [`RtError::IndexOutOfRange`] past [`Self::curve_hit_count`].
    pub fn curve_hit_index(&self, index: u32) -> Result<Option<u32>> {
        self.groups.curve_hit.index(index)
    }
}

/// Check a description against backend limits before compiling it.
pub fn validate(
    desc: &ProgramDescriptor,
    limits: &BackendLimits,
    max_payload_size: u32,
    max_attributes_size: u32,
) -> Result<()> {
    let depth = desc.max_trace_recursion_depth();
    if depth == 0 {
        return Err(RtError::InvalidConfiguration(
            "max trace recursion depth must be at least 1".to_string(),
        ));
    }
    if depth > limits.max_trace_recursion_depth {
        return Err(RtError::ConfigurationLimitExceeded {
            what: "max trace recursion depth",
            value: depth,
            max: limits.max_trace_recursion_depth,
        });
    }
    if let Some(max) = limits.max_payload_size {
        if max_payload_size > max {
            return Err(RtError::ConfigurationLimitExceeded {
                what: "max payload size",
                value: max_payload_size,
                max,
            });
        }
    }
    if max_attributes_size > limits.max_attributes_size {
        return Err(RtError::ConfigurationLimitExceeded {
            what: "max attributes size",
            value: max_attributes_size,
            max: limits.max_attributes_size,
        });
    }
    if desc.compiler_flags().contains(
        CompilerFlags::FLOATING_POINT_MODE_FAST | CompilerFlags::FLOATING_POINT_MODE_PRECISE,
    ) {
        return Err(RtError::InvalidConfiguration(
            "fast and precise floating-point modes are mutually exclusive".to_string(),
        ));
    }
    if desc.slot_count(EntryPointRole::RayGeneration) == 0 {
        return Err(RtError::InvalidConfiguration(
            "program has no ray generation entry point".to_string(),
        ));
    }
    Ok(())
}

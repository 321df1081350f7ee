use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::{
    descriptor::shader_hash, structural_hash, ComputePipelineDesc, ComputePipelineKey,
    ComputeState, ReflectionError, ResourceLayout, ResourceLayoutBuilder, Shader, ShaderStage,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dispatch {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dispatch {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WorkGroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkGroupSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Number of work groups needed to cover `threads` invocations.
    #[inline]
    pub fn dispatch_for(self, threads: [u32; 3]) -> Dispatch {
        let groups = |threads: u32, size: u32| threads.div_ceil(size.max(1));

        Dispatch {
            x: groups(threads[0], self.x),
            y: groups(threads[1], self.y),
            z: groups(threads[2], self.z),
        }
    }
}

impl From<[u32; 3]> for WorkGroupSize {
    #[inline]
    fn from([x, y, z]: [u32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Mutable description of a compute pipeline: a compute shader and nothing
/// else. Follows the same hashing rules as
/// [`PipelineDescriptor`](crate::PipelineDescriptor).
#[derive(Debug)]
pub struct ComputePipelineDescriptor {
    compute: Option<Arc<Shader>>,
    state: ComputeState,
    top_level_hash: u64,
    layout: OnceCell<ResourceLayout>,
}

impl Default for ComputePipelineDescriptor {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ComputePipelineDescriptor {
    pub fn new() -> Self {
        Self {
            compute: None,
            state: ComputeState,
            top_level_hash: structural_hash(&ComputeState),
            layout: OnceCell::new(),
        }
    }

    pub fn set_compute_shader(&mut self, shader: Option<Arc<Shader>>) -> &mut Self {
        if let Some(ref shader) = shader {
            assert_eq!(
                shader.stage(),
                ShaderStage::Compute,
                "shader bound to the wrong stage"
            );
        }

        self.compute = shader;
        self.layout.take();

        self
    }

    #[inline]
    pub fn compute_shader(&self) -> Option<&Arc<Shader>> {
        self.compute.as_ref()
    }

    #[inline]
    pub fn state(&self) -> &ComputeState {
        &self.state
    }

    #[inline]
    pub fn top_level_hash(&self) -> u64 {
        self.top_level_hash
    }

    #[inline]
    pub fn compute_hash(&self) -> u64 {
        shader_hash(&self.compute)
    }

    #[inline]
    pub fn workgroup_size(&self) -> Option<WorkGroupSize> {
        self.compute
            .as_ref()
            .and_then(|shader| shader.workgroup_size())
            .map(WorkGroupSize::from)
    }

    /// Dispatch covering `threads` invocations with the bound shader's work
    /// group size, `None` without a compute shader.
    #[inline]
    pub fn dispatch_for(&self, threads: [u32; 3]) -> Option<Dispatch> {
        self.workgroup_size().map(|size| size.dispatch_for(threads))
    }

    pub fn resource_layout(&self) -> Result<&ResourceLayout, ReflectionError> {
        self.layout.get_or_try_init(|| {
            let mut builder = ResourceLayoutBuilder::new();

            if let Some(ref shader) = self.compute {
                builder.stage(ShaderStage::Compute, shader.resources());
            }

            builder.build()
        })
    }

    #[inline]
    pub fn resource_layout_hash(&self) -> Result<u64, ReflectionError> {
        self.resource_layout().map(ResourceLayout::hash)
    }

    pub fn key(&self) -> Result<ComputePipelineKey, ReflectionError> {
        Ok(ComputePipelineKey {
            fixed_function: self.top_level_hash,
            signature: self.resource_layout_hash()?,
            compute: self.compute_hash(),
        })
    }

    pub fn desc(&self) -> Result<ComputePipelineDesc<'_>, ReflectionError> {
        Ok(ComputePipelineDesc {
            state: &self.state,
            layout: self.resource_layout()?,
            compute: self.compute.as_deref(),
        })
    }
}

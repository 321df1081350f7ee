use std::borrow::Cow;

use crate::{content_hash, BoundResource, NagaReflector, ReflectionError, ShaderReflector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Geometry,
    Compute,
}

impl ShaderStage {
    /// Order in which stages contribute to a resource layout.
    pub const PRIORITY: [ShaderStage; 4] = [
        ShaderStage::Vertex,
        ShaderStage::Pixel,
        ShaderStage::Geometry,
        ShaderStage::Compute,
    ];

    /// Geometry has no wgpu counterpart and maps to no visibility bits.
    #[inline]
    pub fn wgpu_stages(self) -> wgpu::ShaderStages {
        match self {
            ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
            ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
            ShaderStage::Geometry => wgpu::ShaderStages::NONE,
            ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
        }
    }
}

/// Shader code as handed to the engine, either WGSL text or SPIR-V bytecode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderCode {
    Wgsl(Cow<'static, str>),
    SpirV(Cow<'static, [u8]>),
}

impl ShaderCode {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ShaderCode::Wgsl(source) => source.as_bytes(),
            ShaderCode::SpirV(bytes) => bytes,
        }
    }

    #[inline]
    fn tag(&self) -> &'static [u8] {
        match self {
            ShaderCode::Wgsl(_) => b"wgsl",
            ShaderCode::SpirV(_) => b"spirv",
        }
    }
}

/// Reflected metadata of one shader entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Reflection {
    /// Bound resources in declaration order.
    pub resources: Vec<BoundResource>,
    /// Only set for compute shaders.
    pub workgroup_size: Option<[u32; 3]>,
}

/// A compiled shader entry point together with its reflection data.
///
/// Shaders are immutable once created and are shared between descriptors
/// through `Arc<Shader>`. The hash identifies the code and entry point, so
/// two shaders built from the same code hash equally.
#[derive(Debug)]
pub struct Shader {
    stage: ShaderStage,
    entry_point: Cow<'static, str>,
    code: ShaderCode,
    hash: u64,
    reflection: Reflection,
}

impl Shader {
    #[inline]
    pub fn new(
        stage: ShaderStage,
        code: ShaderCode,
        entry_point: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ReflectionError> {
        Self::with_reflector(&NagaReflector, stage, code, entry_point)
    }

    #[inline]
    pub fn wgsl(
        stage: ShaderStage,
        source: impl Into<Cow<'static, str>>,
        entry_point: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ReflectionError> {
        Self::new(stage, ShaderCode::Wgsl(source.into()), entry_point)
    }

    #[inline]
    pub fn spirv(
        stage: ShaderStage,
        bytes: impl Into<Cow<'static, [u8]>>,
        entry_point: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ReflectionError> {
        Self::new(stage, ShaderCode::SpirV(bytes.into()), entry_point)
    }

    pub fn with_reflector(
        reflector: &dyn ShaderReflector,
        stage: ShaderStage,
        code: ShaderCode,
        entry_point: impl Into<Cow<'static, str>>,
    ) -> Result<Self, ReflectionError> {
        let entry_point = entry_point.into();

        let reflection = reflector.reflect(&code, stage, &entry_point)?;

        let hash = content_hash(&[
            code.tag(),
            code.as_bytes(),
            entry_point.as_bytes(),
            &[stage as u8],
        ]);

        Ok(Self {
            stage,
            entry_point,
            code,
            hash,
            reflection,
        })
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    #[inline]
    pub fn code(&self) -> &ShaderCode {
        &self.code
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub fn resources(&self) -> &[BoundResource] {
        &self.reflection.resources
    }

    #[inline]
    pub fn workgroup_size(&self) -> Option<[u32; 3]> {
        self.reflection.workgroup_size
    }
}

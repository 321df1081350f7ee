use thiserror::Error;

use crate::{ComputePipelineKey, PipelineKey, ResourceKind, ShaderStage, SignatureKey};

/// Failure to extract or arrange the resources a shader declares.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReflectionError {
    #[error("malformed shader code: {0}")]
    Parse(String),

    #[error("shader module failed validation: {0}")]
    Validation(String),

    #[error("entry point `{0}` not found")]
    MissingEntryPoint(String),

    #[error("entry point `{entry_point}` is not a {expected:?} shader")]
    StageMismatch {
        entry_point: String,
        expected: ShaderStage,
    },

    #[error("{0:?} shaders cannot be reflected by this reflector")]
    UnsupportedStage(ShaderStage),

    #[error("resource `{name}` has an unsupported type: {reason}")]
    UnsupportedResource { name: String, reason: String },

    #[error("{kind:?} slot {slot} (space {space}) declared twice by the {stage:?} stage")]
    DuplicateSlot {
        stage: ShaderStage,
        kind: ResourceKind,
        space: u32,
        slot: u32,
    },
}

/// What the backend was asked to compile when it failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompileTarget {
    BindingSignature,
    RenderPipeline,
    ComputePipeline,
}

/// Hash tuple of a failed compile, kept for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Signature(SignatureKey),
    Render(PipelineKey),
    Compute(ComputePipelineKey),
}

/// The backend rejected a composed signature or pipeline.
#[derive(Error, Debug, Clone)]
#[error("failed to compile {target:?} for {key:?}: {message}")]
pub struct PipelineCompileError {
    pub target: CompileTarget,
    pub key: CacheKey,
    pub message: String,
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Reflection(#[from] ReflectionError),

    #[error(transparent)]
    Compile(#[from] PipelineCompileError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

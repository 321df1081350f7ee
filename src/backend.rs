use crate::{BindingSignatureDesc, ComputePipelineDesc, RenderPipelineDesc};

/// Compiles binding signatures and pipelines for a graphics API.
///
/// Implementations are called by [`PipelineCache`](crate::PipelineCache) on
/// misses only, possibly from several threads at once.
pub trait PipelineBackend: Send + Sync {
    type BindingSignature: Send + Sync;
    type RenderPipeline: Send + Sync;
    type ComputePipeline: Send + Sync;

    fn create_binding_signature(
        &self,
        desc: &BindingSignatureDesc,
    ) -> anyhow::Result<Self::BindingSignature>;

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<'_>,
        signature: &Self::BindingSignature,
    ) -> anyhow::Result<Self::RenderPipeline>;

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
        signature: &Self::BindingSignature,
    ) -> anyhow::Result<Self::ComputePipeline>;
}

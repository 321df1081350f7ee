use crate::{ComputeState, RenderState, ResourceLayout, Shader};

/// Everything a backend needs to compile a graphics pipeline.
#[derive(Clone, Copy, Debug)]
pub struct RenderPipelineDesc<'a> {
    pub state: &'a RenderState,
    pub layout: &'a ResourceLayout,
    pub vertex: Option<&'a Shader>,
    pub pixel: Option<&'a Shader>,
    pub geometry: Option<&'a Shader>,
}

impl<'a> RenderPipelineDesc<'a> {
    #[inline]
    pub fn shaders(&self) -> impl Iterator<Item = &'a Shader> {
        [self.vertex, self.pixel, self.geometry].into_iter().flatten()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ComputePipelineDesc<'a> {
    pub state: &'a ComputeState,
    pub layout: &'a ResourceLayout,
    pub compute: Option<&'a Shader>,
}

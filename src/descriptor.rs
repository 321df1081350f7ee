use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::{
    structural_hash, BlendState, BufferId, DepthStencilState, IndexFormat, PipelineKey,
    PrimitiveTopology, RasterizerState, ReflectionError, RenderPipelineDesc, RenderState,
    ResourceLayout, ResourceLayoutBuilder, ScissorRect, Shader, ShaderStage, TextureViewId,
    VertexLayout, Viewport, MAX_RENDER_TARGETS, UNBOUND_HASH,
};

/// A render target or depth buffer view together with its format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetLocation {
    pub view: TextureViewId,
    pub format: wgpu::TextureFormat,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: BufferId,
    pub format: IndexFormat,
    pub offset: u64,
}

/// Vertex and index buffers of a mesh, with the layouts the vertex stage
/// reads them through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexData {
    pub layouts: Vec<VertexLayout>,
    pub buffers: Vec<VertexBufferBinding>,
    pub indices: Option<IndexBufferBinding>,
}

/// Per-draw state that is not part of the compiled pipeline.
#[derive(Clone, Debug, Default)]
pub struct DrawBindings {
    pub render_targets: [Option<TextureViewId>; MAX_RENDER_TARGETS],
    pub depth_stencil: Option<TextureViewId>,
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub viewport: Option<Viewport>,
    pub scissor: Option<ScissorRect>,
}

/// Mutable description of a graphics pipeline.
///
/// Every setter keeps the affected hashes current, none of them reflects or
/// compiles anything. The [`ResourceLayout`] is built on first request and
/// dropped whenever a shader binding changes.
#[derive(Debug)]
pub struct PipelineDescriptor {
    vertex: Option<Arc<Shader>>,
    pixel: Option<Arc<Shader>>,
    geometry: Option<Arc<Shader>>,
    state: RenderState,
    bindings: DrawBindings,
    top_level_hash: u64,
    layout: OnceCell<ResourceLayout>,
}

impl Default for PipelineDescriptor {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineDescriptor {
    pub fn new() -> Self {
        let state = RenderState::default();

        Self {
            vertex: None,
            pixel: None,
            geometry: None,
            top_level_hash: structural_hash(&state.canonical()),
            state,
            bindings: DrawBindings::default(),
            layout: OnceCell::new(),
        }
    }

    #[inline]
    pub fn set_vertex_shader(&mut self, shader: Option<Arc<Shader>>) -> &mut Self {
        self.bind_shader(ShaderStage::Vertex, shader)
    }

    #[inline]
    pub fn set_pixel_shader(&mut self, shader: Option<Arc<Shader>>) -> &mut Self {
        self.bind_shader(ShaderStage::Pixel, shader)
    }

    #[inline]
    pub fn set_geometry_shader(&mut self, shader: Option<Arc<Shader>>) -> &mut Self {
        self.bind_shader(ShaderStage::Geometry, shader)
    }

    fn bind_shader(&mut self, stage: ShaderStage, shader: Option<Arc<Shader>>) -> &mut Self {
        if let Some(ref shader) = shader {
            assert_eq!(shader.stage(), stage, "shader bound to the wrong stage");
        }

        let slot = match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Pixel => &mut self.pixel,
            ShaderStage::Geometry => &mut self.geometry,
            ShaderStage::Compute => panic!("compute shaders belong to a ComputePipelineDescriptor"),
        };

        *slot = shader;
        self.layout.take();

        self
    }

    pub fn set_render_target(&mut self, slot: usize, target: Option<TargetLocation>) -> &mut Self {
        assert!(slot < MAX_RENDER_TARGETS, "render target slot out of range");

        match target {
            Some(target) => {
                self.bindings.render_targets[slot] = Some(target.view);
                self.state.color_formats[slot] = Some(target.format);

                self.state.target_count = self.state.target_count.max(slot as u32 + 1);
            }
            None => {
                self.bindings.render_targets[slot] = None;
                self.state.color_formats[slot] = None;

                if self.state.target_count == slot as u32 + 1 {
                    while self.state.target_count > 0
                        && self.bindings.render_targets[self.state.target_count as usize - 1]
                            .is_none()
                    {
                        self.state.target_count -= 1;
                    }
                }
            }
        }

        self.rehash()
    }

    pub fn set_depth_stencil(&mut self, target: Option<TargetLocation>) -> &mut Self {
        match target {
            Some(target) => {
                self.bindings.depth_stencil = Some(target.view);
                self.state.depth_format = Some(target.format);
            }
            None => {
                self.bindings.depth_stencil = None;
                self.state.depth_format = None;
            }
        }

        self.rehash()
    }

    pub fn set_blend_state(&mut self, slot: usize, blend: BlendState) -> &mut Self {
        assert!(slot < MAX_RENDER_TARGETS, "render target slot out of range");

        self.state.blend[slot] = blend;
        self.rehash()
    }

    pub fn set_depth_stencil_state(&mut self, state: DepthStencilState) -> &mut Self {
        self.state.depth_stencil = state;
        self.rehash()
    }

    pub fn set_rasterizer_state(&mut self, state: RasterizerState) -> &mut Self {
        self.state.rasterizer = state;
        self.rehash()
    }

    pub fn set_sample_count(&mut self, count: u32) -> &mut Self {
        assert!(count.is_power_of_two(), "sample count must be a power of two");

        self.state.sample_count = count;
        self.rehash()
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.state.topology = topology;
        self.rehash()
    }

    /// Binds the vertex buffers of `vertices`; with `bind_indices` its index
    /// buffer replaces the current one, otherwise the index binding is kept.
    pub fn set_vertex_buffers(&mut self, vertices: &VertexData, bind_indices: bool) -> &mut Self {
        self.state.vertex_layouts = vertices.layouts.clone();
        self.bindings.vertex_buffers = vertices.buffers.clone();

        if bind_indices {
            self.state.index_format = vertices.indices.as_ref().map(|indices| indices.format);
            self.bindings.index_buffer = vertices.indices.clone();
        }

        self.rehash()
    }

    #[inline]
    pub fn set_viewport(&mut self, viewport: Viewport) -> &mut Self {
        self.bindings.viewport = Some(viewport);
        self
    }

    #[inline]
    pub fn set_scissor_rect(&mut self, rect: ScissorRect) -> &mut Self {
        self.bindings.scissor = Some(rect);
        self
    }

    #[inline]
    fn rehash(&mut self) -> &mut Self {
        self.top_level_hash = structural_hash(&self.state.canonical());
        self
    }

    #[inline]
    pub fn top_level_hash(&self) -> u64 {
        self.top_level_hash
    }

    #[inline]
    pub fn vertex_hash(&self) -> u64 {
        shader_hash(&self.vertex)
    }

    #[inline]
    pub fn pixel_hash(&self) -> u64 {
        shader_hash(&self.pixel)
    }

    #[inline]
    pub fn geometry_hash(&self) -> u64 {
        shader_hash(&self.geometry)
    }

    #[inline]
    pub fn vertex_shader(&self) -> Option<&Arc<Shader>> {
        self.vertex.as_ref()
    }

    #[inline]
    pub fn pixel_shader(&self) -> Option<&Arc<Shader>> {
        self.pixel.as_ref()
    }

    #[inline]
    pub fn geometry_shader(&self) -> Option<&Arc<Shader>> {
        self.geometry.as_ref()
    }

    #[inline]
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    #[inline]
    pub fn bindings(&self) -> &DrawBindings {
        &self.bindings
    }

    #[inline]
    pub fn render_target_count(&self) -> usize {
        self.state.target_count as usize
    }

    /// Bound shaders in stage priority order.
    pub fn shaders(&self) -> impl Iterator<Item = &Arc<Shader>> {
        [&self.vertex, &self.pixel, &self.geometry]
            .into_iter()
            .flatten()
    }

    pub fn resource_layout(&self) -> Result<&ResourceLayout, ReflectionError> {
        self.layout.get_or_try_init(|| {
            let mut builder = ResourceLayoutBuilder::new();

            for shader in self.shaders() {
                builder.stage(shader.stage(), shader.resources());
            }

            builder.build()
        })
    }

    #[inline]
    pub fn resource_layout_hash(&self) -> Result<u64, ReflectionError> {
        self.resource_layout().map(ResourceLayout::hash)
    }

    pub fn key(&self) -> Result<PipelineKey, ReflectionError> {
        Ok(PipelineKey {
            fixed_function: self.top_level_hash,
            signature: self.resource_layout_hash()?,
            vertex: self.vertex_hash(),
            pixel: self.pixel_hash(),
            geometry: self.geometry_hash(),
        })
    }

    pub fn desc(&self) -> Result<RenderPipelineDesc<'_>, ReflectionError> {
        Ok(RenderPipelineDesc {
            state: &self.state,
            layout: self.resource_layout()?,
            vertex: self.vertex.as_deref(),
            pixel: self.pixel.as_deref(),
            geometry: self.geometry.as_deref(),
        })
    }
}

#[inline]
pub(crate) fn shader_hash(shader: &Option<Arc<Shader>>) -> u64 {
    shader.as_ref().map_or(UNBOUND_HASH, |shader| shader.hash())
}

//! Fixed-function pipeline state.
//!
//! `wgpu` descriptor types are not all `Hash`/`Eq` (depth bias carries
//! floats), so the state is kept in mirror types that derive the right
//! traits. [`RenderState`] is the canonical block the top-level hash of a
//! pipeline descriptor is computed over.

pub use wgpu::{
    BlendFactor, BlendOperation, ColorWrites, CompareFunction, Face, FrontFace, IndexFormat,
    PolygonMode, StencilOperation, VertexAttribute, VertexFormat, VertexStepMode,
};

pub const MAX_RENDER_TARGETS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };

    pub const OVER: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };

    #[inline]
    pub fn to_wgpu(self) -> wgpu::BlendComponent {
        wgpu::BlendComponent {
            src_factor: self.src_factor,
            dst_factor: self.dst_factor,
            operation: self.operation,
        }
    }
}

/// Blending of a single render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub color: BlendComponent,
    pub alpha: BlendComponent,
    pub write_mask: ColorWrites,
}

impl BlendState {
    pub const DEFAULT: Self = Self {
        enabled: false,
        color: BlendComponent::REPLACE,
        alpha: BlendComponent::REPLACE,
        write_mask: ColorWrites::ALL,
    };

    pub const ALPHA_BLENDING: Self = Self {
        enabled: true,
        color: BlendComponent {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent::OVER,
        write_mask: ColorWrites::ALL,
    };

    pub const ADDITIVE: Self = Self {
        enabled: true,
        color: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        },
        write_mask: ColorWrites::ALL,
    };

    #[inline]
    pub fn to_wgpu(self) -> Option<wgpu::BlendState> {
        self.enabled.then(|| wgpu::BlendState {
            color: self.color.to_wgpu(),
            alpha: self.alpha.to_wgpu(),
        })
    }
}

impl Default for BlendState {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl StencilFace {
    pub const KEEP: Self = Self {
        compare: CompareFunction::Always,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Keep,
    };

    #[inline]
    pub fn to_wgpu(self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.compare,
            fail_op: self.fail_op,
            depth_fail_op: self.depth_fail_op,
            pass_op: self.pass_op,
        }
    }
}

/// Depth bias with the float terms stored as bits so the state stays `Eq`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale_bits: u32,
    pub clamp_bits: u32,
}

impl DepthBias {
    #[inline]
    pub fn new(constant: i32, slope_scale: f32, clamp: f32) -> Self {
        Self {
            constant,
            slope_scale_bits: slope_scale.to_bits(),
            clamp_bits: clamp.to_bits(),
        }
    }

    #[inline]
    pub fn to_wgpu(self) -> wgpu::DepthBiasState {
        wgpu::DepthBiasState {
            constant: self.constant,
            slope_scale: f32::from_bits(self.slope_scale_bits),
            clamp: f32::from_bits(self.clamp_bits),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub stencil_test: bool,
    pub front: StencilFace,
    pub back: StencilFace,
    pub read_mask: u32,
    pub write_mask: u32,
    pub bias: DepthBias,
}

impl DepthStencilState {
    pub const DEFAULT: Self = Self {
        depth_test: true,
        depth_write: true,
        depth_compare: CompareFunction::LessEqual,
        stencil_test: false,
        front: StencilFace::KEEP,
        back: StencilFace::KEEP,
        read_mask: 0xff,
        write_mask: 0xff,
        bias: DepthBias {
            constant: 0,
            slope_scale_bits: 0,
            clamp_bits: 0,
        },
    };

    pub fn to_wgpu(self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        let stencil = if self.stencil_test {
            wgpu::StencilState {
                front: self.front.to_wgpu(),
                back: self.back.to_wgpu(),
                read_mask: self.read_mask,
                write_mask: self.write_mask,
            }
        } else {
            wgpu::StencilState::default()
        };

        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.depth_test && self.depth_write,
            depth_compare: if self.depth_test {
                self.depth_compare
            } else {
                CompareFunction::Always
            },
            stencil,
            bias: self.bias.to_wgpu(),
        }
    }
}

impl Default for DepthStencilState {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: Option<Face>,
    pub front_face: FrontFace,
    pub depth_clip: bool,
    pub conservative: bool,
}

impl RasterizerState {
    pub const DEFAULT: Self = Self {
        polygon_mode: PolygonMode::Fill,
        cull_mode: Some(Face::Back),
        front_face: FrontFace::Cw,
        depth_clip: true,
        conservative: false,
    };
}

impl Default for RasterizerState {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    #[default]
    Undefined,
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    #[inline]
    pub fn is_strip(self) -> bool {
        matches!(
            self,
            PrimitiveTopology::LineStrip | PrimitiveTopology::TriangleStrip
        )
    }

    #[inline]
    pub fn to_wgpu(self) -> Option<wgpu::PrimitiveTopology> {
        Some(match self {
            PrimitiveTopology::Undefined => return None,
            PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
            PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
            PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        })
    }
}

/// Layout of one vertex buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    #[inline]
    pub fn to_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[inline]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Canonical fixed-function block of a graphics pipeline.
///
/// Equal states hash equally, so the hash does not depend on the order the
/// state was assembled in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub color_formats: [Option<wgpu::TextureFormat>; MAX_RENDER_TARGETS],
    pub target_count: u32,
    pub blend: [BlendState; MAX_RENDER_TARGETS],
    pub depth_format: Option<wgpu::TextureFormat>,
    pub depth_stencil: DepthStencilState,
    pub rasterizer: RasterizerState,
    pub topology: PrimitiveTopology,
    pub vertex_layouts: Vec<VertexLayout>,
    pub index_format: Option<IndexFormat>,
    pub sample_count: u32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            color_formats: [None; MAX_RENDER_TARGETS],
            target_count: 0,
            blend: [BlendState::DEFAULT; MAX_RENDER_TARGETS],
            depth_format: None,
            depth_stencil: DepthStencilState::DEFAULT,
            rasterizer: RasterizerState::DEFAULT,
            topology: PrimitiveTopology::Undefined,
            vertex_layouts: Vec::new(),
            index_format: None,
            sample_count: 1,
        }
    }
}

impl RenderState {
    /// Copy of the state with every field the compiled pipeline never reads
    /// reset to its default.
    ///
    /// Two states whose `primitive`, `color_targets`, `depth_stencil` and
    /// `multisample` agree have equal canonical forms.
    pub fn canonical(&self) -> RenderState {
        let mut state = self.clone();

        if !state.topology.is_strip() {
            state.index_format = None;
        }

        for slot in 0..MAX_RENDER_TARGETS {
            if slot >= state.target_count as usize || state.color_formats[slot].is_none() {
                state.color_formats[slot] = None;
                state.blend[slot] = BlendState::DEFAULT;
            } else if !state.blend[slot].enabled {
                state.blend[slot] = BlendState {
                    write_mask: state.blend[slot].write_mask,
                    ..BlendState::DEFAULT
                };
            }
        }

        if state.depth_format.is_none() {
            state.depth_stencil = DepthStencilState::DEFAULT;
        } else {
            let depth_stencil = &mut state.depth_stencil;

            if !depth_stencil.depth_test {
                depth_stencil.depth_write = false;
                depth_stencil.depth_compare = CompareFunction::Always;
            }

            if !depth_stencil.stencil_test {
                depth_stencil.front = StencilFace::KEEP;
                depth_stencil.back = StencilFace::KEEP;
                depth_stencil.read_mask = DepthStencilState::DEFAULT.read_mask;
                depth_stencil.write_mask = DepthStencilState::DEFAULT.write_mask;
            }
        }

        state
    }

    pub fn primitive(&self) -> Option<wgpu::PrimitiveState> {
        Some(wgpu::PrimitiveState {
            topology: self.topology.to_wgpu()?,
            strip_index_format: if self.topology.is_strip() {
                self.index_format
            } else {
                None
            },
            front_face: self.rasterizer.front_face,
            cull_mode: self.rasterizer.cull_mode,
            unclipped_depth: !self.rasterizer.depth_clip,
            polygon_mode: self.rasterizer.polygon_mode,
            conservative: self.rasterizer.conservative,
        })
    }

    pub fn color_targets(&self) -> Vec<Option<wgpu::ColorTargetState>> {
        (0..self.target_count as usize)
            .map(|i| {
                self.color_formats[i].map(|format| wgpu::ColorTargetState {
                    format,
                    blend: self.blend[i].to_wgpu(),
                    write_mask: self.blend[i].write_mask,
                })
            })
            .collect()
    }

    #[inline]
    pub fn depth_stencil(&self) -> Option<wgpu::DepthStencilState> {
        self.depth_format
            .map(|format| self.depth_stencil.to_wgpu(format))
    }

    #[inline]
    pub fn multisample(&self) -> wgpu::MultisampleState {
        wgpu::MultisampleState {
            count: self.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }
}

/// Fixed-function block of a compute pipeline. Compute pipelines carry no
/// render target, blend or raster state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComputeState;

use std::{borrow::Cow, sync::Arc};

use anyhow::Context;
use once_cell::sync::OnceCell;

use crate::{
    parse_module, remap_bindings, BindGroupId, BindingSignatureDesc, ComputePipelineDesc, IdMap,
    PipelineBackend, PipelineCache, PipelineDescriptor, RenderPipelineDesc, ResourceLayout,
    ResourceTable, Shader, ShaderStage,
};

pub static GLOBAL_INSTANCE: OnceCell<Instance> = OnceCell::new();

pub struct InstanceDescriptor {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub features: wgpu::Features,
    pub limits: wgpu::Limits,
}

impl Default for InstanceDescriptor {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            features: wgpu::Features::empty(),
            limits: wgpu::Limits::default(),
        }
    }
}

pub struct Instance {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: wgpu::Queue,
    pub buffers: IdMap<wgpu::Buffer>,
    pub texture_views: IdMap<wgpu::TextureView>,
    pub bind_groups: IdMap<wgpu::BindGroup>,
    pub pipelines: PipelineCache<WgpuBackend>,
}

impl Instance {
    pub fn global() -> &'static Self {
        GLOBAL_INSTANCE.get_or_init(|| {
            pollster::block_on(Self::initialize(&InstanceDescriptor::default()))
                .expect("failed to initialize the global instance")
        })
    }

    /// Initializes the global instance with `desc`, unless it already exists.
    pub fn init(desc: &InstanceDescriptor) -> anyhow::Result<&'static Self> {
        GLOBAL_INSTANCE.get_or_try_init(|| pollster::block_on(Self::initialize(desc)))
    }

    pub async fn initialize(desc: &InstanceDescriptor) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: desc.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: desc.power_preference,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .context("no suitable adapter found")?;

        log::debug!("using adapter {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("prism_default_device"),
                    required_features: desc.features,
                    required_limits: desc.limits.clone(),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let device = Arc::new(device);

        Ok(Self {
            instance,
            adapter,
            pipelines: PipelineCache::new(WgpuBackend {
                device: device.clone(),
            }),
            device,
            queue,
            buffers: IdMap::new(),
            texture_views: IdMap::new(),
            bind_groups: IdMap::new(),
        })
    }

    /// Binds the vertex and index buffers, viewport and scissor rect of
    /// `desc` on `pass`.
    pub fn apply_draw_state(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        desc: &PipelineDescriptor,
    ) -> anyhow::Result<()> {
        let bindings = desc.bindings();

        for (slot, binding) in bindings.vertex_buffers.iter().enumerate() {
            let buffer = self
                .buffers
                .get(&binding.buffer)
                .with_context(|| format!("vertex buffer {:?} not registered", binding.buffer))?;

            pass.set_vertex_buffer(slot as u32, buffer.slice(binding.offset..));
        }

        if let Some(ref binding) = bindings.index_buffer {
            let buffer = self
                .buffers
                .get(&binding.buffer)
                .with_context(|| format!("index buffer {:?} not registered", binding.buffer))?;

            pass.set_index_buffer(buffer.slice(binding.offset..), binding.format);
        }

        if let Some(viewport) = bindings.viewport {
            pass.set_viewport(
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                viewport.min_depth,
                viewport.max_depth,
            );
        }

        if let Some(rect) = bindings.scissor {
            pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
        }

        Ok(())
    }

    pub fn apply_render_table(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        table: &ResourceTable<BindGroupId>,
    ) -> anyhow::Result<()> {
        for (root_index, id) in table.bound() {
            let bind_group = self.bind_group(id)?;
            pass.set_bind_group(root_index, &*bind_group, &[]);
        }

        Ok(())
    }

    pub fn apply_compute_table(
        &self,
        pass: &mut wgpu::ComputePass<'_>,
        table: &ResourceTable<BindGroupId>,
    ) -> anyhow::Result<()> {
        for (root_index, id) in table.bound() {
            let bind_group = self.bind_group(id)?;
            pass.set_bind_group(root_index, &*bind_group, &[]);
        }

        Ok(())
    }

    #[inline]
    fn bind_group(
        &self,
        id: &BindGroupId,
    ) -> anyhow::Result<dashmap::mapref::one::Ref<'_, BindGroupId, wgpu::BindGroup>> {
        self.bind_groups
            .get(id)
            .with_context(|| format!("bind group {:?} not registered", id))
    }
}

/// Native binding signature: one bind group layout per root parameter.
pub struct WgpuBindingSignature {
    pub bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pub pipeline_layout: wgpu::PipelineLayout,
}

/// Compiles signatures and pipelines on a wgpu device.
///
/// Root parameters become bind groups, descriptor offsets become bindings.
/// Shader bindings are remapped to match before the module is created.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
}

impl WgpuBackend {
    #[inline]
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self { device }
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn scoped<T>(&self, f: impl FnOnce() -> T) -> anyhow::Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = f();

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(anyhow::anyhow!("{}", err)),
            None => Ok(value),
        }
    }

    fn create_module(
        &self,
        shader: &Shader,
        layout: &ResourceLayout,
    ) -> anyhow::Result<wgpu::ShaderModule> {
        let mut module = parse_module(shader.code())?;

        remap_bindings(&mut module, shader.stage(), layout);

        self.scoped(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(shader.entry_point()),
                    source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
                })
        })
        .with_context(|| format!("invalid {:?} shader `{}`", shader.stage(), shader.entry_point()))
    }
}

impl PipelineBackend for WgpuBackend {
    type BindingSignature = WgpuBindingSignature;
    type RenderPipeline = wgpu::RenderPipeline;
    type ComputePipeline = wgpu::ComputePipeline;

    fn create_binding_signature(
        &self,
        desc: &BindingSignatureDesc,
    ) -> anyhow::Result<WgpuBindingSignature> {
        if let Some(parameter) = desc
            .parameters
            .iter()
            .find(|parameter| parameter.stages.contains(&ShaderStage::Geometry))
        {
            anyhow::bail!("{:?} table is visible to the geometry stage", parameter.category);
        }

        self.scoped(|| {
            let bind_group_layouts = desc
                .parameters
                .iter()
                .map(|parameter| {
                    let entries = parameter
                        .ranges
                        .iter()
                        .map(|range| wgpu::BindGroupLayoutEntry {
                            binding: range.offset,
                            visibility: range.stage.wgpu_stages(),
                            ty: range.binding_type,
                            count: None,
                        })
                        .collect::<Vec<_>>();

                    self.device
                        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                            label: Some("prism_bind_group_layout"),
                            entries: &entries,
                        })
                })
                .collect::<Vec<_>>();

            let refs = bind_group_layouts.iter().collect::<Vec<_>>();

            let pipeline_layout =
                self.device
                    .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("prism_pipeline_layout"),
                        bind_group_layouts: &refs,
                        push_constant_ranges: &[],
                    });

            WgpuBindingSignature {
                bind_group_layouts,
                pipeline_layout,
            }
        })
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<'_>,
        signature: &WgpuBindingSignature,
    ) -> anyhow::Result<wgpu::RenderPipeline> {
        if desc.geometry.is_some() {
            anyhow::bail!("geometry shaders are not supported by wgpu");
        }

        let vertex = desc.vertex.context("render pipeline has no vertex shader")?;
        let primitive = desc
            .state
            .primitive()
            .context("render pipeline has no primitive topology")?;

        let vertex_module = self.create_module(vertex, desc.layout)?;
        let pixel_module = desc
            .pixel
            .map(|pixel| self.create_module(pixel, desc.layout))
            .transpose()?;

        let buffers = desc
            .state
            .vertex_layouts
            .iter()
            .map(|layout| layout.to_wgpu())
            .collect::<Vec<_>>();
        let targets = desc.state.color_targets();

        let fragment = desc
            .pixel
            .zip(pixel_module.as_ref())
            .map(|(pixel, module)| wgpu::FragmentState {
                module,
                entry_point: pixel.entry_point(),
                compilation_options: Default::default(),
                targets: &targets,
            });

        self.scoped(|| {
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("prism_render_pipeline"),
                    layout: Some(&signature.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: vertex.entry_point(),
                        compilation_options: Default::default(),
                        buffers: &buffers,
                    },
                    primitive,
                    depth_stencil: desc.state.depth_stencil(),
                    multisample: desc.state.multisample(),
                    fragment,
                    multiview: None,
                    cache: None,
                })
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
        signature: &WgpuBindingSignature,
    ) -> anyhow::Result<wgpu::ComputePipeline> {
        let compute = desc.compute.context("compute pipeline has no compute shader")?;
        let module = self.create_module(compute, desc.layout)?;

        self.scoped(|| {
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("prism_compute_pipeline"),
                    layout: Some(&signature.pipeline_layout),
                    module: &module,
                    entry_point: compute.entry_point(),
                    compilation_options: Default::default(),
                    cache: None,
                })
        })
    }
}

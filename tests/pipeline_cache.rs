use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use prism::{
    wgpu, BindingSignatureDesc, BlendState, BoundResource, CacheKey, CompileTarget,
    ComputePipelineDesc, ComputePipelineDescriptor, Error, HeapCategory, IdMap, PipelineBackend,
    PipelineCache, PipelineDescriptor, PrimitiveTopology, Reflection, ReflectionError,
    RenderPipelineDesc, Shader, ShaderCode, ShaderReflector, ShaderStage, TargetLocation,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Hands out a fixed resource list regardless of the code.
struct FixedReflector(Vec<BoundResource>);

impl ShaderReflector for FixedReflector {
    fn reflect(
        &self,
        _: &ShaderCode,
        _: ShaderStage,
        _: &str,
    ) -> Result<Reflection, ReflectionError> {
        Ok(Reflection {
            resources: self.0.clone(),
            workgroup_size: None,
        })
    }
}

fn shader(stage: ShaderStage, code: &'static str, resources: Vec<BoundResource>) -> Arc<Shader> {
    let shader = Shader::with_reflector(
        &FixedReflector(resources),
        stage,
        ShaderCode::Wgsl(code.into()),
        "main",
    )
    .unwrap();

    Arc::new(shader)
}

fn shader_a() -> Arc<Shader> {
    shader(
        ShaderStage::Vertex,
        "shader a",
        vec![BoundResource::constant_buffer(ShaderStage::Vertex, "transform", 0, 64)],
    )
}

fn shader_b() -> Arc<Shader> {
    shader(
        ShaderStage::Pixel,
        "shader b",
        vec![
            BoundResource::texture(ShaderStage::Pixel, "albedo", 0),
            BoundResource::sampler(ShaderStage::Pixel, "linear", 0),
        ],
    )
}

fn descriptor() -> PipelineDescriptor {
    let mut desc = PipelineDescriptor::new();

    desc.set_vertex_shader(Some(shader_a()))
        .set_pixel_shader(Some(shader_b()))
        .set_primitive_topology(PrimitiveTopology::TriangleList);

    desc
}

#[derive(Debug)]
struct Signature {
    parameters: usize,
}

#[derive(Debug)]
struct Pipeline {
    parameters: usize,
}

#[derive(Default)]
struct CountingBackend {
    signatures: AtomicUsize,
    pipelines: AtomicUsize,
    compute_pipelines: AtomicUsize,
    fail_signatures: AtomicBool,
    fail_pipelines: AtomicBool,
}

impl PipelineBackend for CountingBackend {
    type BindingSignature = Signature;
    type RenderPipeline = Pipeline;
    type ComputePipeline = Pipeline;

    fn create_binding_signature(&self, desc: &BindingSignatureDesc) -> anyhow::Result<Signature> {
        if self.fail_signatures.load(Ordering::SeqCst) {
            anyhow::bail!("signature rejected");
        }

        self.signatures.fetch_add(1, Ordering::SeqCst);

        Ok(Signature {
            parameters: desc.parameters.len(),
        })
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDesc<'_>,
        signature: &Signature,
    ) -> anyhow::Result<Pipeline> {
        if self.fail_pipelines.load(Ordering::SeqCst) {
            anyhow::bail!("pipeline rejected");
        }

        assert_eq!(desc.layout.parameter_count(), signature.parameters);
        self.pipelines.fetch_add(1, Ordering::SeqCst);

        Ok(Pipeline {
            parameters: signature.parameters,
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc<'_>,
        signature: &Signature,
    ) -> anyhow::Result<Pipeline> {
        assert!(desc.compute.is_some());
        self.compute_pipelines.fetch_add(1, Ordering::SeqCst);

        Ok(Pipeline {
            parameters: signature.parameters,
        })
    }
}

#[test]
fn end_to_end() {
    init_logger();

    let desc = descriptor();
    let layout = desc.resource_layout().unwrap();

    assert_eq!(layout.heaps().len(), 2);
    assert_eq!(layout.parameter_count(), 2);

    let buffers = layout.heap(0);
    assert_eq!(buffers.category(), HeapCategory::Buffer);
    assert_eq!(buffers.len(), 2);
    assert_eq!(buffers.resource(0).name, "transform");
    assert_eq!(buffers.resource(1).name, "albedo");

    let samplers = layout.heap(1);
    assert_eq!(samplers.category(), HeapCategory::Sampler);
    assert_eq!(samplers.len(), 1);
    assert_eq!(samplers.resource(0).name, "linear");

    let cache = PipelineCache::new(CountingBackend::default());

    let first = cache.get_pipeline(&desc).unwrap();
    let second = cache.get_pipeline(&desc).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.parameters, 2);
    assert_eq!(cache.backend().pipelines.load(Ordering::SeqCst), 1);
    assert_eq!(cache.backend().signatures.load(Ordering::SeqCst), 1);
}

#[test]
fn equal_descriptors_share_entries() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let a = cache.get_pipeline(&descriptor()).unwrap();
    let b = cache.get_pipeline(&descriptor()).unwrap();

    assert!(Arc::ptr_eq(&a, &b));

    let signature = cache.get_binding_signature(&descriptor()).unwrap();
    assert!(Arc::ptr_eq(
        &signature,
        &cache.get_binding_signature(&descriptor()).unwrap()
    ));

    assert_eq!(cache.pipeline_count(), 1);
    assert_eq!(cache.signature_count(), 1);
    assert_eq!(cache.backend().signatures.load(Ordering::SeqCst), 1);
}

#[test]
fn equivalent_shader_reuses_signature() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let desc = descriptor();
    let mut other = descriptor();
    other.set_pixel_shader(Some(shader(
        ShaderStage::Pixel,
        "shader b, written differently",
        vec![
            BoundResource::texture(ShaderStage::Pixel, "diffuse", 0),
            BoundResource::sampler(ShaderStage::Pixel, "point", 0),
        ],
    )));

    assert_eq!(
        desc.resource_layout_hash().unwrap(),
        other.resource_layout_hash().unwrap()
    );
    assert_ne!(desc.pixel_hash(), other.pixel_hash());

    let a = cache.get_pipeline(&desc).unwrap();
    let b = cache.get_pipeline(&other).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.pipeline_count(), 2);
    assert_eq!(cache.signature_count(), 1);
    assert_eq!(cache.backend().signatures.load(Ordering::SeqCst), 1);
}

#[test]
fn fixed_function_change_is_a_new_entry() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let mut desc = descriptor();
    desc.set_render_target(
        0,
        Some(TargetLocation {
            view: IdMap::<wgpu::TextureView>::new().next_id(),
            format: wgpu::TextureFormat::Rgba8Unorm,
        }),
    );
    let opaque = cache.get_pipeline(&desc).unwrap();

    desc.set_blend_state(0, BlendState::ALPHA_BLENDING);
    let blended = cache.get_pipeline(&desc).unwrap();

    assert!(!Arc::ptr_eq(&opaque, &blended));
    assert_eq!(cache.pipeline_count(), 2);

    desc.set_blend_state(0, BlendState::DEFAULT);
    assert!(Arc::ptr_eq(&opaque, &cache.get_pipeline(&desc).unwrap()));
    assert_eq!(cache.backend().pipelines.load(Ordering::SeqCst), 2);
}

#[test]
fn unread_state_does_not_split_entries() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let plain = descriptor();
    let mut disabled = descriptor();
    disabled.set_blend_state(
        0,
        BlendState {
            enabled: false,
            ..BlendState::ADDITIVE
        },
    );

    let a = cache.get_pipeline(&plain).unwrap();
    let b = cache.get_pipeline(&disabled).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.backend().pipelines.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_pipeline_leaves_no_entries() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());
    cache.backend().fail_pipelines.store(true, Ordering::SeqCst);

    let desc = descriptor();

    match cache.get_pipeline(&desc) {
        Err(Error::Compile(err)) => {
            assert_eq!(err.target, CompileTarget::RenderPipeline);
            assert_eq!(err.key, CacheKey::Render(desc.key().unwrap()));
            assert!(err.message.contains("pipeline rejected"));
        }
        other => panic!("unexpected result {:?}", other),
    }

    assert_eq!(cache.pipeline_count(), 0);
    assert_eq!(cache.signature_count(), 0);

    cache.backend().fail_pipelines.store(false, Ordering::SeqCst);

    cache.get_pipeline(&desc).unwrap();
    assert_eq!(cache.pipeline_count(), 1);
    assert_eq!(cache.signature_count(), 1);
    assert_eq!(cache.backend().signatures.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_signature_is_reported() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());
    cache.backend().fail_signatures.store(true, Ordering::SeqCst);

    let desc = descriptor();

    match cache.get_pipeline(&desc) {
        Err(Error::Compile(err)) => {
            assert_eq!(err.target, CompileTarget::BindingSignature);
            assert_eq!(err.key, CacheKey::Signature(desc.key().unwrap().signature_key()));
        }
        other => panic!("unexpected result {:?}", other),
    }

    assert!(cache.get_binding_signature(&desc).is_err());
    assert_eq!(cache.signature_count(), 0);
    assert_eq!(cache.backend().pipelines.load(Ordering::SeqCst), 0);
}

#[test]
fn reflection_errors_propagate() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let mut desc = PipelineDescriptor::new();
    desc.set_pixel_shader(Some(shader(
        ShaderStage::Pixel,
        "clashing",
        vec![
            BoundResource::texture(ShaderStage::Pixel, "a", 1),
            BoundResource::texture(ShaderStage::Pixel, "b", 1),
        ],
    )));

    match cache.get_pipeline(&desc) {
        Err(Error::Reflection(ReflectionError::DuplicateSlot { slot, .. })) => assert_eq!(slot, 1),
        other => panic!("unexpected result {:?}", other),
    }

    assert_eq!(cache.backend().signatures.load(Ordering::SeqCst), 0);
}

#[test]
fn geometry_stage_joins_the_layout() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let mut desc = descriptor();
    let without = desc.key().unwrap();

    desc.set_geometry_shader(Some(shader(
        ShaderStage::Geometry,
        "expand points",
        vec![BoundResource::constant_buffer(ShaderStage::Geometry, "params", 0, 16)],
    )));

    let with = desc.key().unwrap();
    assert_eq!(with.fixed_function, without.fixed_function);
    assert_ne!(with.geometry, without.geometry);
    assert_ne!(with.signature, without.signature);

    let layout = desc.resource_layout().unwrap();
    assert_eq!(layout.heap(0).len(), 3);
    assert_eq!(layout.heap(0).resource(2).name, "params");
    assert_eq!(
        layout.signature().parameters[0].stages,
        vec![ShaderStage::Vertex, ShaderStage::Pixel, ShaderStage::Geometry]
    );

    cache.get_pipeline(&desc).unwrap();
    desc.set_geometry_shader(None);
    cache.get_pipeline(&desc).unwrap();

    assert_eq!(cache.pipeline_count(), 2);
}

#[test]
fn compute_pipelines_are_cached() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let mut desc = ComputePipelineDescriptor::new();
    desc.set_compute_shader(Some(shader(
        ShaderStage::Compute,
        "histogram",
        vec![
            BoundResource::texture(ShaderStage::Compute, "image", 0),
            BoundResource::read_write(ShaderStage::Compute, "bins", 0),
        ],
    )));

    let first = cache.get_compute_pipeline(&desc).unwrap();
    let second = cache.get_compute_pipeline(&desc).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.parameters, 1);
    assert_eq!(cache.compute_pipeline_count(), 1);
    assert_eq!(cache.pipeline_count(), 0);

    let signature = cache.get_compute_binding_signature(&desc).unwrap();
    assert_eq!(signature.parameters, 1);
    assert_eq!(cache.signature_count(), 1);
    assert_eq!(cache.backend().compute_pipelines.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_misses_compile_once() {
    init_logger();

    let cache = PipelineCache::new(CountingBackend::default());

    let pipelines = std::thread::scope(|scope| {
        let handles = (0..8)
            .map(|_| scope.spawn(|| cache.get_pipeline(&descriptor()).unwrap()))
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(pipelines.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(cache.backend().pipelines.load(Ordering::SeqCst), 1);
    assert_eq!(cache.backend().signatures.load(Ordering::SeqCst), 1);
}

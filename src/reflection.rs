use naga::{
    valid::{Capabilities, ModuleInfo, ValidationFlags, Validator},
    AddressSpace, ImageClass, ImageDimension, Module, ScalarKind, StorageAccess, StorageFormat,
    TypeInner,
};

use crate::{
    HeapCategory, Reflection, ReflectionError, ResourceLayout, ShaderCode, ShaderStage,
};

pub use wgpu::{
    BindingType, BufferBindingType, SamplerBindingType, StorageTextureAccess, TextureFormat,
    TextureSampleType, TextureViewDimension,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    ConstantBuffer,
    /// Read-only shader resource: sampled textures, read-only storage.
    Texture,
    ReadWrite,
    Sampler,
}

impl ResourceKind {
    #[inline]
    pub fn category(self) -> HeapCategory {
        match self {
            ResourceKind::ConstantBuffer | ResourceKind::Texture | ResourceKind::ReadWrite => {
                HeapCategory::Buffer
            }
            ResourceKind::Sampler => HeapCategory::Sampler,
        }
    }
}

/// A variable inside a constant buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstantVariable {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// A resource a shader entry point declares as bound.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundResource {
    pub stage: ShaderStage,
    pub kind: ResourceKind,
    pub name: String,
    /// Register space, `@group` in WGSL.
    pub space: u32,
    /// Register slot, `@binding` in WGSL.
    pub slot: u32,
    /// Byte size, constant buffers only.
    pub size: Option<u32>,
    pub variables: Vec<ConstantVariable>,
    pub binding_type: BindingType,
}

impl BoundResource {
    pub fn constant_buffer(stage: ShaderStage, name: impl Into<String>, slot: u32, size: u32) -> Self {
        Self {
            stage,
            kind: ResourceKind::ConstantBuffer,
            name: name.into(),
            space: 0,
            slot,
            size: Some(size),
            variables: Vec::new(),
            binding_type: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    pub fn texture(stage: ShaderStage, name: impl Into<String>, slot: u32) -> Self {
        Self {
            stage,
            kind: ResourceKind::Texture,
            name: name.into(),
            space: 0,
            slot,
            size: None,
            variables: Vec::new(),
            binding_type: BindingType::Texture {
                sample_type: TextureSampleType::Float { filterable: true },
                view_dimension: TextureViewDimension::D2,
                multisampled: false,
            },
        }
    }

    pub fn read_write(stage: ShaderStage, name: impl Into<String>, slot: u32) -> Self {
        Self {
            stage,
            kind: ResourceKind::ReadWrite,
            name: name.into(),
            space: 0,
            slot,
            size: None,
            variables: Vec::new(),
            binding_type: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    pub fn sampler(stage: ShaderStage, name: impl Into<String>, slot: u32) -> Self {
        Self {
            stage,
            kind: ResourceKind::Sampler,
            name: name.into(),
            space: 0,
            slot,
            size: None,
            variables: Vec::new(),
            binding_type: BindingType::Sampler(SamplerBindingType::Filtering),
        }
    }

    #[inline]
    pub fn in_space(mut self, space: u32) -> Self {
        self.space = space;
        self
    }
}

/// Extracts the bound resources of a shader entry point.
pub trait ShaderReflector {
    fn reflect(
        &self,
        code: &ShaderCode,
        stage: ShaderStage,
        entry_point: &str,
    ) -> Result<Reflection, ReflectionError>;
}

/// Reflects WGSL and SPIR-V through naga.
#[derive(Clone, Copy, Debug, Default)]
pub struct NagaReflector;

impl ShaderReflector for NagaReflector {
    fn reflect(
        &self,
        code: &ShaderCode,
        stage: ShaderStage,
        entry_point: &str,
    ) -> Result<Reflection, ReflectionError> {
        let module = parse_module(code)?;
        let info = validate_module(&module)?;

        reflect_module(&module, &info, stage, entry_point)
    }
}

#[inline]
pub fn reflect(
    code: &ShaderCode,
    stage: ShaderStage,
    entry_point: &str,
) -> Result<Reflection, ReflectionError> {
    NagaReflector.reflect(code, stage, entry_point)
}

pub fn parse_module(code: &ShaderCode) -> Result<Module, ReflectionError> {
    match code {
        ShaderCode::Wgsl(source) => naga::front::wgsl::parse_str(source)
            .map_err(|err| ReflectionError::Parse(err.emit_to_string(source))),
        ShaderCode::SpirV(bytes) => {
            naga::front::spv::parse_u8_slice(bytes, &naga::front::spv::Options::default())
                .map_err(|err| ReflectionError::Parse(err.to_string()))
        }
    }
}

pub fn validate_module(module: &Module) -> Result<ModuleInfo, ReflectionError> {
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(module)
        .map_err(|err| ReflectionError::Validation(err.as_inner().to_string()))
}

pub(crate) fn naga_stage(stage: ShaderStage) -> Option<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Some(naga::ShaderStage::Vertex),
        ShaderStage::Pixel => Some(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Some(naga::ShaderStage::Compute),
        ShaderStage::Geometry => None,
    }
}

pub(crate) fn entry_point_index(
    module: &Module,
    stage: ShaderStage,
    entry_point: &str,
) -> Result<usize, ReflectionError> {
    let naga_stage = naga_stage(stage).ok_or(ReflectionError::UnsupportedStage(stage))?;

    let index = module
        .entry_points
        .iter()
        .position(|ep| ep.name == entry_point)
        .ok_or_else(|| ReflectionError::MissingEntryPoint(entry_point.to_owned()))?;

    if module.entry_points[index].stage != naga_stage {
        return Err(ReflectionError::StageMismatch {
            entry_point: entry_point.to_owned(),
            expected: stage,
        });
    }

    Ok(index)
}

pub fn reflect_module(
    module: &Module,
    info: &ModuleInfo,
    stage: ShaderStage,
    entry_point: &str,
) -> Result<Reflection, ReflectionError> {
    let index = entry_point_index(module, stage, entry_point)?;
    let function_info = info.get_entry_point(index);

    let mut resources = Vec::new();

    for (handle, variable) in module.global_variables.iter() {
        let binding = match variable.binding {
            Some(ref binding) => binding,
            None => continue,
        };

        // resources the entry point never touches are not part of its interface
        if function_info[handle].is_empty() {
            continue;
        }

        let name = variable.name.clone().unwrap_or_default();
        let inner = &module.types[variable.ty].inner;

        let (kind, binding_type) = match classify(&name, variable.space, inner)? {
            Some(classified) => classified,
            None => continue,
        };

        let (size, variables) = if kind == ResourceKind::ConstantBuffer {
            (
                Some(inner.size(module.to_ctx())),
                constant_variables(module, inner),
            )
        } else {
            (None, Vec::new())
        };

        resources.push(BoundResource {
            stage,
            kind,
            name,
            space: binding.group,
            slot: binding.binding,
            size,
            variables,
            binding_type,
        });
    }

    let workgroup_size = match stage {
        ShaderStage::Compute => Some(module.entry_points[index].workgroup_size),
        _ => None,
    };

    log::trace!(
        "reflected {} resources from {:?} entry point `{}`",
        resources.len(),
        stage,
        entry_point
    );

    Ok(Reflection {
        resources,
        workgroup_size,
    })
}

fn classify(
    name: &str,
    space: AddressSpace,
    inner: &TypeInner,
) -> Result<Option<(ResourceKind, BindingType)>, ReflectionError> {
    let classified = match space {
        AddressSpace::Uniform => (
            ResourceKind::ConstantBuffer,
            BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        ),
        AddressSpace::Storage { access } => {
            let writable = access.contains(StorageAccess::STORE);
            let kind = if writable {
                ResourceKind::ReadWrite
            } else {
                ResourceKind::Texture
            };

            (
                kind,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage {
                        read_only: !writable,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            )
        }
        AddressSpace::Handle => handle_binding(name, inner)?,
        _ => return Ok(None),
    };

    Ok(Some(classified))
}

/// Moves every bound global of `module` that `layout` placed for `stage` to
/// `@group(root index) @binding(offset)`. Other globals keep their binding.
pub fn remap_bindings(module: &mut Module, stage: ShaderStage, layout: &ResourceLayout) {
    let mut located = Vec::new();

    for (handle, variable) in module.global_variables.iter() {
        let binding = match variable.binding {
            Some(ref binding) => binding,
            None => continue,
        };

        let name = variable.name.as_deref().unwrap_or_default();
        let inner = &module.types[variable.ty].inner;

        let kind = match classify(name, variable.space, inner) {
            Ok(Some((kind, _))) => kind,
            _ => continue,
        };

        if let Some(location) = layout.locate(stage, kind, binding.group, binding.binding) {
            located.push((handle, location));
        }
    }

    for (handle, location) in located {
        if let Some(ref mut binding) = module.global_variables.get_mut(handle).binding {
            binding.group = location.root_index;
            binding.binding = location.offset;
        }
    }
}

fn constant_variables(module: &Module, inner: &TypeInner) -> Vec<ConstantVariable> {
    match inner {
        TypeInner::Struct { members, .. } => members
            .iter()
            .map(|member| ConstantVariable {
                name: member.name.clone().unwrap_or_default(),
                offset: member.offset,
                size: module.types[member.ty].inner.size(module.to_ctx()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn unsupported(name: &str, reason: impl Into<String>) -> ReflectionError {
    ReflectionError::UnsupportedResource {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

fn handle_binding(
    name: &str,
    inner: &TypeInner,
) -> Result<(ResourceKind, BindingType), ReflectionError> {
    match *inner {
        TypeInner::Image {
            dim,
            arrayed,
            class,
        } => {
            let view_dimension = view_dimension(dim, arrayed);

            match class {
                ImageClass::Sampled { kind, multi } => {
                    let sample_type = match kind {
                        ScalarKind::Float => TextureSampleType::Float { filterable: !multi },
                        ScalarKind::Sint => TextureSampleType::Sint,
                        ScalarKind::Uint => TextureSampleType::Uint,
                        other => return Err(unsupported(name, format!("{:?} texels", other))),
                    };

                    Ok((
                        ResourceKind::Texture,
                        BindingType::Texture {
                            sample_type,
                            view_dimension,
                            multisampled: multi,
                        },
                    ))
                }
                ImageClass::Depth { multi } => Ok((
                    ResourceKind::Texture,
                    BindingType::Texture {
                        sample_type: TextureSampleType::Depth,
                        view_dimension,
                        multisampled: multi,
                    },
                )),
                ImageClass::Storage { format, access } => {
                    let load = access.contains(StorageAccess::LOAD);
                    let store = access.contains(StorageAccess::STORE);

                    let (kind, access) = match (load, store) {
                        (true, true) => (ResourceKind::ReadWrite, StorageTextureAccess::ReadWrite),
                        (false, true) => (ResourceKind::ReadWrite, StorageTextureAccess::WriteOnly),
                        _ => (ResourceKind::Texture, StorageTextureAccess::ReadOnly),
                    };

                    let format = storage_format(format)
                        .ok_or_else(|| unsupported(name, format!("{:?} storage", format)))?;

                    Ok((
                        kind,
                        BindingType::StorageTexture {
                            access,
                            format,
                            view_dimension,
                        },
                    ))
                }
            }
        }
        TypeInner::Sampler { comparison } => {
            let ty = if comparison {
                SamplerBindingType::Comparison
            } else {
                SamplerBindingType::Filtering
            };

            Ok((ResourceKind::Sampler, BindingType::Sampler(ty)))
        }
        TypeInner::BindingArray { .. } => Err(unsupported(name, "binding arrays")),
        _ => Err(unsupported(name, "not a texture or sampler")),
    }
}

fn view_dimension(dim: ImageDimension, arrayed: bool) -> TextureViewDimension {
    match (dim, arrayed) {
        (ImageDimension::D1, _) => TextureViewDimension::D1,
        (ImageDimension::D2, false) => TextureViewDimension::D2,
        (ImageDimension::D2, true) => TextureViewDimension::D2Array,
        (ImageDimension::D3, _) => TextureViewDimension::D3,
        (ImageDimension::Cube, false) => TextureViewDimension::Cube,
        (ImageDimension::Cube, true) => TextureViewDimension::CubeArray,
    }
}

fn storage_format(format: StorageFormat) -> Option<TextureFormat> {
    Some(match format {
        StorageFormat::R32Uint => TextureFormat::R32Uint,
        StorageFormat::R32Sint => TextureFormat::R32Sint,
        StorageFormat::R32Float => TextureFormat::R32Float,
        StorageFormat::Rg32Uint => TextureFormat::Rg32Uint,
        StorageFormat::Rg32Sint => TextureFormat::Rg32Sint,
        StorageFormat::Rg32Float => TextureFormat::Rg32Float,
        StorageFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        StorageFormat::Rgba8Snorm => TextureFormat::Rgba8Snorm,
        StorageFormat::Rgba8Uint => TextureFormat::Rgba8Uint,
        StorageFormat::Rgba8Sint => TextureFormat::Rgba8Sint,
        StorageFormat::Rgba16Uint => TextureFormat::Rgba16Uint,
        StorageFormat::Rgba16Sint => TextureFormat::Rgba16Sint,
        StorageFormat::Rgba16Float => TextureFormat::Rgba16Float,
        StorageFormat::Rgba32Uint => TextureFormat::Rgba32Uint,
        StorageFormat::Rgba32Sint => TextureFormat::Rgba32Sint,
        StorageFormat::Rgba32Float => TextureFormat::Rgba32Float,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceLayoutBuilder;

    const SCENE: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(1) var albedo: texture_2d<f32>;
@group(0) @binding(2) var albedo_sampler: sampler;
@group(1) @binding(0) var<storage, read_write> counters: array<u32>;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return camera.view_proj * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return textureSample(albedo, albedo_sampler, vec2<f32>(0.5, 0.5));
}

@compute @workgroup_size(8, 4, 1)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    counters[id.x] = counters[id.x] + 1u;
}
"#;

    fn wgsl() -> ShaderCode {
        ShaderCode::Wgsl(SCENE.into())
    }

    #[test]
    fn vertex_entry_reports_only_used_constant_buffer() {
        let reflection = reflect(&wgsl(), ShaderStage::Vertex, "vs_main").unwrap();

        assert_eq!(reflection.resources.len(), 1);

        let camera = &reflection.resources[0];
        assert_eq!(camera.kind, ResourceKind::ConstantBuffer);
        assert_eq!(camera.name, "camera");
        assert_eq!((camera.space, camera.slot), (0, 0));
        assert_eq!(camera.size, Some(80));
        assert_eq!(
            camera.variables,
            vec![
                ConstantVariable {
                    name: "view_proj".into(),
                    offset: 0,
                    size: 64,
                },
                ConstantVariable {
                    name: "position".into(),
                    offset: 64,
                    size: 16,
                },
            ]
        );
        assert_eq!(reflection.workgroup_size, None);
    }

    #[test]
    fn pixel_entry_keeps_declaration_order() {
        let reflection = reflect(&wgsl(), ShaderStage::Pixel, "fs_main").unwrap();

        let kinds = reflection
            .resources
            .iter()
            .map(|resource| (resource.kind, resource.slot))
            .collect::<Vec<_>>();

        assert_eq!(
            kinds,
            vec![(ResourceKind::Texture, 1), (ResourceKind::Sampler, 2)]
        );
        assert!(reflection
            .resources
            .iter()
            .all(|resource| resource.stage == ShaderStage::Pixel));
    }

    #[test]
    fn compute_entry_reports_read_write_and_workgroup() {
        let reflection = reflect(&wgsl(), ShaderStage::Compute, "cs_main").unwrap();

        assert_eq!(reflection.workgroup_size, Some([8, 4, 1]));
        assert_eq!(reflection.resources.len(), 1);
        assert_eq!(reflection.resources[0].kind, ResourceKind::ReadWrite);
        assert_eq!(reflection.resources[0].space, 1);
    }

    #[test]
    fn malformed_source_is_a_parse_error() {
        let code = ShaderCode::Wgsl("fn broken( {".into());

        assert!(matches!(
            reflect(&code, ShaderStage::Vertex, "vs_main"),
            Err(ReflectionError::Parse(_))
        ));
    }

    #[test]
    fn garbage_bytecode_is_a_parse_error() {
        let code = ShaderCode::SpirV(vec![0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0].into());

        assert!(matches!(
            reflect(&code, ShaderStage::Compute, "main"),
            Err(ReflectionError::Parse(_))
        ));
    }

    #[test]
    fn entry_point_lookup_errors() {
        assert_eq!(
            reflect(&wgsl(), ShaderStage::Vertex, "missing"),
            Err(ReflectionError::MissingEntryPoint("missing".into()))
        );
        assert_eq!(
            reflect(&wgsl(), ShaderStage::Vertex, "fs_main"),
            Err(ReflectionError::StageMismatch {
                entry_point: "fs_main".into(),
                expected: ShaderStage::Vertex,
            })
        );
        assert_eq!(
            reflect(&wgsl(), ShaderStage::Geometry, "vs_main"),
            Err(ReflectionError::UnsupportedStage(ShaderStage::Geometry))
        );
    }

    const SHARED_SLOT: &str = r#"
@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(0) var samp: sampler;

@fragment
fn main() -> @location(0) vec4<f32> {
    return textureSample(tex, samp, vec2<f32>(0.5, 0.5));
}
"#;

    fn binding_of(module: &Module, name: &str) -> (u32, u32) {
        let (_, variable) = module
            .global_variables
            .iter()
            .find(|(_, variable)| variable.name.as_deref() == Some(name))
            .unwrap();
        let binding = variable.binding.as_ref().unwrap();

        (binding.group, binding.binding)
    }

    #[test]
    fn remap_moves_bindings_into_layout_tables() {
        let vs = reflect(&wgsl(), ShaderStage::Vertex, "vs_main").unwrap();
        let ps = reflect(&wgsl(), ShaderStage::Pixel, "fs_main").unwrap();

        let layout = ResourceLayoutBuilder::new()
            .stage(ShaderStage::Vertex, &vs.resources)
            .stage(ShaderStage::Pixel, &ps.resources)
            .build()
            .unwrap();

        let mut module = parse_module(&wgsl()).unwrap();
        remap_bindings(&mut module, ShaderStage::Pixel, &layout);

        assert_eq!(binding_of(&module, "albedo"), (0, 1));
        assert_eq!(binding_of(&module, "albedo_sampler"), (1, 0));
        // placed for another stage, or not placed at all
        assert_eq!(binding_of(&module, "camera"), (0, 0));
        assert_eq!(binding_of(&module, "counters"), (1, 0));
    }

    #[test]
    fn remap_keeps_texture_and_sampler_on_one_slot_apart() {
        let resources = vec![
            BoundResource::texture(ShaderStage::Pixel, "tex", 0),
            BoundResource::sampler(ShaderStage::Pixel, "samp", 0),
        ];

        let layout = ResourceLayoutBuilder::new()
            .stage(ShaderStage::Pixel, &resources)
            .build()
            .unwrap();

        let mut module = parse_module(&ShaderCode::Wgsl(SHARED_SLOT.into())).unwrap();
        remap_bindings(&mut module, ShaderStage::Pixel, &layout);

        assert_eq!(binding_of(&module, "tex"), (0, 0));
        assert_eq!(binding_of(&module, "samp"), (1, 0));
    }
}

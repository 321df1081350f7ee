use std::collections::HashSet;

use crate::{structural_hash, BindingType, BoundResource, ReflectionError, ResourceKind, ShaderStage};

/// Kind of descriptor heap a resource lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeapCategory {
    /// Constant buffers, textures and read-write resources.
    Buffer,
    Sampler,
}

impl HeapCategory {
    /// Order in which categories are laid out in a binding signature.
    pub const PRIORITY: [HeapCategory; 2] = [HeapCategory::Buffer, HeapCategory::Sampler];

    /// Resource kinds of the category, in layout order.
    #[inline]
    pub fn kinds(self) -> &'static [ResourceKind] {
        match self {
            HeapCategory::Buffer => &[
                ResourceKind::ConstantBuffer,
                ResourceKind::Texture,
                ResourceKind::ReadWrite,
            ],
            HeapCategory::Sampler => &[ResourceKind::Sampler],
        }
    }
}

/// One descriptor of a root parameter's table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub stage: ShaderStage,
    pub kind: ResourceKind,
    pub space: u32,
    pub slot: u32,
    /// Offset from the start of the table.
    pub offset: u32,
    pub binding_type: BindingType,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RootParameter {
    pub category: HeapCategory,
    /// Stages that see the table, in stage priority order.
    pub stages: Vec<ShaderStage>,
    pub ranges: Vec<DescriptorRange>,
}

/// Backend independent description of a binding signature.
///
/// This is what gets hashed and what a backend compiles into its native
/// signature object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BindingSignatureDesc {
    pub parameters: Vec<RootParameter>,
}

/// A descriptor heap the caller has to bind at draw time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapRequirement {
    category: HeapCategory,
    resources: Vec<BoundResource>,
    root_index: u32,
}

impl HeapRequirement {
    #[inline]
    pub fn category(&self) -> HeapCategory {
        self.category
    }

    /// Resources indexed by their offset inside the heap.
    #[inline]
    pub fn resources(&self) -> &[BoundResource] {
        &self.resources
    }

    #[inline]
    pub fn resource(&self, offset: usize) -> &BoundResource {
        assert!(offset < self.resources.len(), "offset out of range");
        &self.resources[offset]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[inline]
    pub fn root_index(&self) -> u32 {
        self.root_index
    }
}

/// Where a declared resource ended up in a [`ResourceLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceLocation {
    pub root_index: u32,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLayout {
    heaps: Vec<HeapRequirement>,
    signature: BindingSignatureDesc,
    hash: u64,
}

impl ResourceLayout {
    #[inline]
    pub fn heaps(&self) -> &[HeapRequirement] {
        &self.heaps
    }

    #[inline]
    pub fn heap(&self, index: usize) -> &HeapRequirement {
        assert!(index < self.heaps.len(), "heap index out of range");
        &self.heaps[index]
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.signature.parameters.len()
    }

    #[inline]
    pub fn signature(&self) -> &BindingSignatureDesc {
        &self.signature
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Where the `kind` resource of `stage` at `space`/`slot` was placed.
    pub fn locate(
        &self,
        stage: ShaderStage,
        kind: ResourceKind,
        space: u32,
        slot: u32,
    ) -> Option<ResourceLocation> {
        self.heaps
            .iter()
            .filter(|heap| heap.category == kind.category())
            .find_map(|heap| {
                heap.resources.iter().position(|r| {
                    r.stage == stage && r.kind == kind && r.space == space && r.slot == slot
                })
                .map(|offset| ResourceLocation {
                    root_index: heap.root_index,
                    offset: offset as u32,
                })
            })
    }
}

/// Arranges reflected resources of several stages into a [`ResourceLayout`].
///
/// Heaps are laid out category by category, stage by stage, kind by kind,
/// all in fixed priority order; within a kind resources keep their
/// declaration order. The order stages are added in does not matter.
#[derive(Clone, Debug, Default)]
pub struct ResourceLayoutBuilder<'a> {
    stages: Vec<(ShaderStage, &'a [BoundResource])>,
}

impl<'a> ResourceLayoutBuilder<'a> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stage(&mut self, stage: ShaderStage, resources: &'a [BoundResource]) -> &mut Self {
        self.stages.push((stage, resources));
        self
    }

    pub fn build(&self) -> Result<ResourceLayout, ReflectionError> {
        let mut seen = HashSet::new();

        for &(stage, resources) in &self.stages {
            for resource in resources {
                if !seen.insert((stage, resource.kind, resource.space, resource.slot)) {
                    return Err(ReflectionError::DuplicateSlot {
                        stage,
                        kind: resource.kind,
                        space: resource.space,
                        slot: resource.slot,
                    });
                }
            }
        }

        let mut heaps = Vec::new();
        let mut signature = BindingSignatureDesc::default();

        for category in HeapCategory::PRIORITY {
            let mut resources = Vec::new();
            let mut stages = Vec::new();

            for stage in ShaderStage::PRIORITY {
                let count = resources.len();

                for &kind in category.kinds() {
                    let declared = self
                        .stages
                        .iter()
                        .filter(|(s, _)| *s == stage)
                        .flat_map(|(_, list)| list.iter())
                        .filter(|resource| resource.kind == kind);

                    for resource in declared {
                        let mut resource = resource.clone();
                        resource.stage = stage;
                        resources.push(resource);
                    }
                }

                if resources.len() > count {
                    stages.push(stage);
                }
            }

            if resources.is_empty() {
                continue;
            }

            let root_index = signature.parameters.len() as u32;

            let ranges = resources
                .iter()
                .enumerate()
                .map(|(offset, resource)| DescriptorRange {
                    stage: resource.stage,
                    kind: resource.kind,
                    space: resource.space,
                    slot: resource.slot,
                    offset: offset as u32,
                    binding_type: resource.binding_type,
                })
                .collect();

            signature.parameters.push(RootParameter {
                category,
                stages,
                ranges,
            });

            heaps.push(HeapRequirement {
                category,
                resources,
                root_index,
            });
        }

        let hash = structural_hash(&signature);

        log::trace!(
            "built resource layout {:#018x} with {} root parameters",
            hash,
            signature.parameters.len()
        );

        Ok(ResourceLayout {
            heaps,
            signature,
            hash,
        })
    }
}

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    CacheKey, CompileTarget, ComputePipelineDescriptor, Error, PipelineBackend,
    PipelineCompileError, PipelineDescriptor, ResourceLayout,
};

/// Identity of a compiled graphics pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub fixed_function: u64,
    pub signature: u64,
    pub vertex: u64,
    pub pixel: u64,
    pub geometry: u64,
}

impl PipelineKey {
    #[inline]
    pub fn signature_key(&self) -> SignatureKey {
        SignatureKey {
            fixed_function: self.fixed_function,
            signature: self.signature,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub fixed_function: u64,
    pub signature: u64,
    pub compute: u64,
}

impl ComputePipelineKey {
    #[inline]
    pub fn signature_key(&self) -> SignatureKey {
        SignatureKey {
            fixed_function: self.fixed_function,
            signature: self.signature,
        }
    }
}

/// Identity of a compiled binding signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignatureKey {
    pub fixed_function: u64,
    pub signature: u64,
}

/// Get-or-create cache of binding signatures and pipelines.
///
/// Entries are never evicted. A miss compiles while holding the entry, so a
/// key is compiled at most once even when several threads ask for it.
pub struct PipelineCache<B: PipelineBackend> {
    backend: B,
    signatures: DashMap<SignatureKey, Arc<B::BindingSignature>>,
    pipelines: DashMap<PipelineKey, Arc<B::RenderPipeline>>,
    compute_pipelines: DashMap<ComputePipelineKey, Arc<B::ComputePipeline>>,
}

impl<B: PipelineBackend> PipelineCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            signatures: DashMap::new(),
            pipelines: DashMap::new(),
            compute_pipelines: DashMap::new(),
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn compute_pipeline_count(&self) -> usize {
        self.compute_pipelines.len()
    }

    #[inline]
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn get_pipeline(&self, desc: &PipelineDescriptor) -> crate::Result<Arc<B::RenderPipeline>> {
        let key = desc.key()?;

        if let Some(pipeline) = self.pipelines.get(&key) {
            log::trace!("render pipeline cache hit {:x?}", key);
            return Ok(pipeline.clone());
        }

        let entry = match self.pipelines.entry(key) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => entry,
        };

        let pipeline_desc = desc.desc()?;

        let pipeline = self.with_signature(key.signature_key(), pipeline_desc.layout, |signature| {
            self.backend
                .create_render_pipeline(&pipeline_desc, signature)
                .map_err(|err| {
                    compile_error(CompileTarget::RenderPipeline, CacheKey::Render(key), err)
                })
        })?;

        log::debug!("compiled render pipeline {:x?}", key);

        let pipeline = Arc::new(pipeline);
        entry.insert(pipeline.clone());

        Ok(pipeline)
    }

    pub fn get_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> crate::Result<Arc<B::ComputePipeline>> {
        let key = desc.key()?;

        if let Some(pipeline) = self.compute_pipelines.get(&key) {
            log::trace!("compute pipeline cache hit {:x?}", key);
            return Ok(pipeline.clone());
        }

        let entry = match self.compute_pipelines.entry(key) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => entry,
        };

        let pipeline_desc = desc.desc()?;

        let pipeline = self.with_signature(key.signature_key(), pipeline_desc.layout, |signature| {
            self.backend
                .create_compute_pipeline(&pipeline_desc, signature)
                .map_err(|err| {
                    compile_error(CompileTarget::ComputePipeline, CacheKey::Compute(key), err)
                })
        })?;

        log::debug!("compiled compute pipeline {:x?}", key);

        let pipeline = Arc::new(pipeline);
        entry.insert(pipeline.clone());

        Ok(pipeline)
    }

    #[inline]
    pub fn get_binding_signature(
        &self,
        desc: &PipelineDescriptor,
    ) -> crate::Result<Arc<B::BindingSignature>> {
        self.signature(desc.top_level_hash(), desc.resource_layout()?)
    }

    #[inline]
    pub fn get_compute_binding_signature(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> crate::Result<Arc<B::BindingSignature>> {
        self.signature(desc.top_level_hash(), desc.resource_layout()?)
    }

    fn signature(
        &self,
        fixed_function: u64,
        layout: &ResourceLayout,
    ) -> crate::Result<Arc<B::BindingSignature>> {
        let key = SignatureKey {
            fixed_function,
            signature: layout.hash(),
        };

        if let Some(signature) = self.signatures.get(&key) {
            log::trace!("binding signature cache hit {:x?}", key);
            return Ok(signature.clone());
        }

        match self.signatures.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let signature = Arc::new(self.compile_signature(key, layout)?);
                entry.insert(signature.clone());

                Ok(signature)
            }
        }
    }

    /// Runs `build` with the signature of `key`, compiling the signature
    /// first if needed. A freshly compiled signature is only kept when
    /// `build` succeeds.
    fn with_signature<T>(
        &self,
        key: SignatureKey,
        layout: &ResourceLayout,
        build: impl FnOnce(&B::BindingSignature) -> Result<T, PipelineCompileError>,
    ) -> crate::Result<T> {
        match self.signatures.entry(key) {
            Entry::Occupied(entry) => Ok(build(entry.get())?),
            Entry::Vacant(entry) => {
                let signature = self.compile_signature(key, layout)?;
                let value = build(&signature)?;

                entry.insert(Arc::new(signature));

                Ok(value)
            }
        }
    }

    fn compile_signature(
        &self,
        key: SignatureKey,
        layout: &ResourceLayout,
    ) -> Result<B::BindingSignature, Error> {
        let signature = self
            .backend
            .create_binding_signature(layout.signature())
            .map_err(|err| {
                compile_error(CompileTarget::BindingSignature, CacheKey::Signature(key), err)
            })?;

        log::debug!(
            "compiled binding signature {:x?} with {} root parameters",
            key,
            layout.parameter_count()
        );

        Ok(signature)
    }
}

fn compile_error(target: CompileTarget, key: CacheKey, err: anyhow::Error) -> PipelineCompileError {
    log::warn!("failed to compile {:?} for {:x?}: {:#}", target, key, err);

    PipelineCompileError {
        target,
        key,
        message: format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_key_drops_shader_hashes() {
        let key = PipelineKey {
            fixed_function: 1,
            signature: 2,
            vertex: 3,
            pixel: 4,
            geometry: 5,
        };

        let compute = ComputePipelineKey {
            fixed_function: 1,
            signature: 2,
            compute: 6,
        };

        assert_eq!(key.signature_key(), compute.signature_key());
        assert_eq!(
            key.signature_key(),
            SignatureKey {
                fixed_function: 1,
                signature: 2,
            }
        );
    }
}

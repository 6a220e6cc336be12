//! Memoized pipelines and samplers.
//!
//! Pipelines are expensive to build and samplers are a limited resource on
//! some drivers. [`StateCache`] hands out one shared object per distinct
//! descriptor. Pipeline descriptors compare their shaders by identity, so two
//! descriptors only hit the same entry when built from the same
//! [`Shader`](crate::Shader) objects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::GpuDevice;
use crate::error::GpuResult;
use crate::resources::{Pipeline, Sampler};
use crate::types::{PipelineDescriptor, SamplerDescriptor};

/// Descriptor-keyed cache of pipelines and samplers for one device.
///
/// # Example
///
/// ```ignore
/// let cache = StateCache::new(device.clone());
/// let sampler = cache.sampler(&SamplerDescriptor::linear())?;
/// let same = cache.sampler(&SamplerDescriptor::linear())?;
/// assert!(Arc::ptr_eq(&sampler, &same));
/// ```
pub struct StateCache {
    device: Arc<GpuDevice>,
    pipelines: Mutex<HashMap<PipelineDescriptor, Arc<Pipeline>>>,
    samplers: Mutex<HashMap<SamplerDescriptor, Arc<Sampler>>>,
}

impl StateCache {
    pub fn new(device: Arc<GpuDevice>) -> Self {
        Self {
            device,
            pipelines: Mutex::new(HashMap::new()),
            samplers: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &Arc<GpuDevice> {
        &self.device
    }

    /// The pipeline for `descriptor`, created on first request.
    ///
    /// A failed creation caches nothing.
    pub fn pipeline(&self, descriptor: &PipelineDescriptor) -> GpuResult<Arc<Pipeline>> {
        let mut pipelines = self.pipelines.lock();
        if let Some(pipeline) = pipelines.get(descriptor) {
            return Ok(pipeline.clone());
        }
        let pipeline = self.device.create_pipeline(descriptor)?;
        pipelines.insert(descriptor.clone(), pipeline.clone());
        Ok(pipeline)
    }

    /// The sampler for `descriptor`, created on first request.
    pub fn sampler(&self, descriptor: &SamplerDescriptor) -> GpuResult<Arc<Sampler>> {
        let mut samplers = self.samplers.lock();
        if let Some(sampler) = samplers.get(descriptor) {
            return Ok(sampler.clone());
        }
        let sampler = self.device.create_sampler(descriptor)?;
        samplers.insert(descriptor.clone(), sampler.clone());
        Ok(sampler)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.lock().len()
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.lock().len()
    }

    /// Drop every cached object. Objects still referenced elsewhere stay
    /// alive until released.
    pub fn clear(&self) {
        self.pipelines.lock().clear();
        self.samplers.lock().clear();
    }
}

impl std::fmt::Debug for StateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCache")
            .field("pipelines", &self.pipeline_count())
            .field("samplers", &self.sampler_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(StateCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AddressMode, ColorAttachmentState, PixelFormat, ShaderDescriptor, ShaderStage,
    };
    use crate::{DeviceParameters, DriverKind};

    fn cache() -> StateCache {
        let device =
            GpuDevice::new(DeviceParameters::new().with_driver(DriverKind::Dummy)).unwrap();
        StateCache::new(device)
    }

    #[test]
    fn test_sampler_memoized_by_descriptor() {
        let cache = cache();
        let a = cache.sampler(&SamplerDescriptor::linear()).unwrap();
        let b = cache.sampler(&SamplerDescriptor::linear()).unwrap();
        let c = cache
            .sampler(&SamplerDescriptor::linear().with_address_mode(AddressMode::Repeat))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.sampler_count(), 2);
    }

    #[test]
    fn test_pipeline_keyed_by_shader_identity() {
        let cache = cache();
        let device = cache.device().clone();
        let shader = |stage| {
            device
                .create_shader(&ShaderDescriptor::new(stage, vec![0x03, 0x02, 0x23, 0x07]))
                .unwrap()
        };
        let vs = shader(ShaderStage::Vertex);
        let fs = shader(ShaderStage::Fragment);
        let other_fs = shader(ShaderStage::Fragment);

        let descriptor = PipelineDescriptor::new(vs.clone(), fs)
            .with_color_attachment(ColorAttachmentState::new(PixelFormat::Bgra8Unorm));
        let first = cache.pipeline(&descriptor).unwrap();
        let second = cache.pipeline(&descriptor.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut rebuilt = descriptor.clone();
        rebuilt.fragment_shader = other_fs;
        let third = cache.pipeline(&rebuilt).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.pipeline_count(), 2);

        cache.clear();
        assert_eq!(cache.pipeline_count(), 0);
    }
}

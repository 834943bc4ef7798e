//! Blurred-mask compositor.
//!
//! Per frame: downsample the source into a transient buffer, run
//! `blur_iterations` vertical + horizontal blur passes ping-ponging between two
//! transient buffers, then composite the blurred result over the source where
//! the mask is set. The tap spacing grows by one texel per iteration.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::EffectError;
use crate::frame::{Frame, FramePool, TransientFrame, TransientPool};
use crate::mapping::ViewportMapping;
use crate::mask::{Eye, MaskAsset, MaskCatalog, MaskLoader};
use crate::params::{EffectParameters, ParameterHandle};
use crate::processing::backend::{
    BlurAxis, BlurPassUniforms, MaskUniforms, PassKind, RenderBackend,
};

use super::{MaskSlot, ensure_renderable, pass_through};

const REQUIRED_PASSES: [PassKind; 4] = [
    PassKind::Resample,
    PassKind::BlurVertical,
    PassKind::BlurHorizontal,
    PassKind::CompositeBlur,
];

pub struct BlurCompositor<P: FramePool = TransientPool> {
    backend: Arc<dyn RenderBackend>,
    pool: P,
    params: ParameterHandle,
    mapping: ViewportMapping,
    slot: MaskSlot,
}

impl BlurCompositor {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        mapping: ViewportMapping,
        eye: Eye,
        params: EffectParameters,
    ) -> Self {
        Self::with_pool(backend, mapping, eye, params, TransientPool::new())
    }
}

impl<P: FramePool> BlurCompositor<P> {
    pub fn with_pool(
        backend: Arc<dyn RenderBackend>,
        mapping: ViewportMapping,
        eye: Eye,
        params: EffectParameters,
        pool: P,
    ) -> Self {
        Self {
            backend,
            pool,
            params: ParameterHandle::new(params),
            mapping,
            slot: MaskSlot::new(MaskCatalog::Blur, eye),
        }
    }

    /// Handle for changing parameters between frames, possibly from another thread.
    pub fn parameters(&self) -> &ParameterHandle {
        &self.params
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn mapping(&self) -> &ViewportMapping {
        &self.mapping
    }

    pub fn set_mapping(&mut self, mapping: ViewportMapping) {
        self.mapping = mapping;
    }

    pub fn eye(&self) -> Eye {
        self.slot.eye()
    }

    pub fn mask(&self) -> &MaskAsset {
        self.slot.mask()
    }

    pub fn set_mask(&mut self, mask: MaskAsset) {
        self.slot.set(mask);
    }

    /// Select and load the mask for a blur-catalog condition id.
    pub fn set_condition(
        &mut self,
        condition_id: i32,
        loader: &dyn MaskLoader,
    ) -> Result<&'static str, EffectError> {
        self.slot.select(condition_id, loader)
    }

    /// Load the mask texture called `name`.
    pub fn set_mask_texture(
        &mut self,
        name: &str,
        loader: &dyn MaskLoader,
    ) -> Result<(), EffectError> {
        self.slot.load(name, loader)
    }

    /// Render one frame from `source` into `destination`.
    ///
    /// With iterations, blur size and downsample all zero the source is copied
    /// unchanged and no mask is applied. A backend that cannot run the passes
    /// also yields an unchanged copy.
    pub fn render(&mut self, source: &Frame, destination: &mut Frame) -> Result<(), EffectError> {
        ensure_renderable(source, destination)?;
        let params = self.params.snapshot();
        if !params.enabled || params.is_blur_bypass() {
            return pass_through(source, destination);
        }
        let result = self
            .backend
            .require(&REQUIRED_PASSES)
            .and_then(|()| self.run_chain(&params, source, &mut *destination));
        match result {
            Err(err @ EffectError::UnsupportedEffect { .. }) => {
                warn!(eye = %self.slot.eye(), "blur mask bypassed: {err}");
                pass_through(source, destination)
            }
            other => other,
        }
    }

    fn run_chain(
        &self,
        params: &EffectParameters,
        source: &Frame,
        destination: &mut Frame,
    ) -> Result<(), EffectError> {
        let backend = self.backend.as_ref();
        let pool: &dyn FramePool = &self.pool;
        let desc = source.descriptor().downsampled(params.downsample);
        let width_mod = 1.0 / 2f32.powi(params.downsample.min(31) as i32);

        let mut current = TransientFrame::acquire(pool, desc)?;
        backend.resample(source, &mut current)?;
        trace!(width = desc.width, height = desc.height, "downsampled");

        for i in 0..params.blur_iterations {
            let offset = params.blur_size * width_mod + i as f32;
            for axis in [BlurAxis::Vertical, BlurAxis::Horizontal] {
                let mut next = TransientFrame::acquire(pool, desc)?;
                backend.blur_pass(&current, &mut next, &BlurPassUniforms { axis, offset })?;
                current = next;
            }
            trace!(iteration = i, offset, "blurred");
        }

        let uniforms = MaskUniforms::new(params, &self.mapping);
        backend.composite_blur(source, &current, self.slot.mask(), destination, &uniforms)?;
        trace!("composited");
        Ok(())
    }
}

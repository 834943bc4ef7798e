//! Opaque-mask compositor: paints the mask color over the masked region in a
//! single pass, with an optional soft edge.

use std::sync::Arc;

use tracing::warn;

use crate::error::EffectError;
use crate::frame::Frame;
use crate::mapping::ViewportMapping;
use crate::mask::{Eye, MaskAsset, MaskCatalog, MaskLoader};
use crate::params::{EffectParameters, ParameterHandle};
use crate::processing::backend::{MaskUniforms, PassKind, RenderBackend};

use super::{MaskSlot, ensure_renderable, pass_through};

pub struct OpaqueCompositor {
    backend: Arc<dyn RenderBackend>,
    params: ParameterHandle,
    mapping: ViewportMapping,
    slot: MaskSlot,
}

impl OpaqueCompositor {
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        mapping: ViewportMapping,
        eye: Eye,
        params: EffectParameters,
    ) -> Self {
        Self {
            backend,
            params: ParameterHandle::new(params),
            mapping,
            slot: MaskSlot::new(MaskCatalog::Opaque, eye),
        }
    }

    pub fn parameters(&self) -> &ParameterHandle {
        &self.params
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

    /// Select and load the mask for an opaque-catalog condition id.
    pub fn set_condition(
        &mut self,
        condition_id: i32,
        loader: &dyn MaskLoader,
    ) -> Result<&'static str, EffectError> {
        self.slot.select(condition_id, loader)
    }

    pub fn set_mask_texture(
        &mut self,
        name: &str,
        loader: &dyn MaskLoader,
    ) -> Result<(), EffectError> {
        self.slot.load(name, loader)
    }

    /// Render one frame. Disabled effects and unsupported backends copy the
    /// source unchanged. Empty frames are a [`EffectError::FrameMismatch`].
    pub fn render(&mut self, source: &Frame, destination: &mut Frame) -> Result<(), EffectError> {
        ensure_renderable(source, destination)?;
        let params = self.params.snapshot();
        if !params.enabled {
            return pass_through(source, destination);
        }
        let uniforms = MaskUniforms::new(&params, &self.mapping);
        let result = self
            .backend
            .require(&[PassKind::CompositeOpaque])
            .and_then(|()| {
                self.backend
                    .composite_opaque(source, self.slot.mask(), &mut *destination, &uniforms)
            });
        match result {
            Err(err @ EffectError::UnsupportedEffect { .. }) => {
                warn!(eye = %self.slot.eye(), "opaque mask bypassed: {err}");
                pass_through(source, destination)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::mask::MemoryMaskLoader;
    use crate::processing::backend::UnavailableBackend;
    use crate::processing::cpu::CpuBackend;
    use image::{Rgba, RgbaImage};

    fn grey(w: u32, h: u32) -> Frame {
        Frame::from_image(
            RgbaImage::from_pixel(w, h, Rgba([128, 128, 128, 255])),
            PixelFormat::Rgba8Unorm,
        )
    }

    /// White on the left half, black on the right.
    fn half_mask() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    fn opaque(params: EffectParameters) -> OpaqueCompositor {
        let loader = MemoryMaskLoader::new().with("central_scotoma_simulated_left_clamp30_gaussian", half_mask());
        let mut compositor =
            OpaqueCompositor::new(Arc::new(CpuBackend), ViewportMapping::identity(), Eye::Left, params);
        compositor.set_condition(1, &loader).unwrap();
        compositor
    }

    #[test]
    fn paints_black_where_mask_is_white() {
        let source = grey(8, 8);
        let mut destination = Frame::new(8, 8, PixelFormat::Rgba8Unorm);
        let mut effect = opaque(EffectParameters::opaque());
        effect.render(&source, &mut destination).unwrap();
        assert_eq!(destination.image().get_pixel(0, 4).0, [0, 0, 0, 255]);
        assert_eq!(destination.image().get_pixel(7, 4).0, [128, 128, 128, 255]);
    }

    #[test]
    fn invert_swaps_the_masked_region() {
        let source = grey(8, 8);
        let mut destination = Frame::new(8, 8, PixelFormat::Rgba8Unorm);
        let mut effect = opaque(EffectParameters::opaque());
        effect.parameters().update(|p| p.mask_invert = true);
        effect.render(&source, &mut destination).unwrap();
        assert_eq!(destination.image().get_pixel(0, 4).0, [128, 128, 128, 255]);
        assert_eq!(destination.image().get_pixel(7, 4).0, [0, 0, 0, 255]);
    }

    #[test]
    fn transparent_color_leaves_frame_untouched() {
        let source = grey(8, 8);
        let mut destination = Frame::new(8, 8, PixelFormat::Rgba8Unorm);
        let mut effect = opaque(EffectParameters {
            mask_color: [1.0, 0.0, 0.0, 0.0],
            ..EffectParameters::opaque()
        });
        effect.render(&source, &mut destination).unwrap();
        assert_eq!(destination, source);
    }

    #[test]
    fn mask_value_scales_coverage() {
        let source = grey(8, 8);
        let mut destination = Frame::new(8, 8, PixelFormat::Rgba8Unorm);
        let mut effect = opaque(EffectParameters {
            mask_value: 0.5,
            ..EffectParameters::opaque()
        });
        effect.render(&source, &mut destination).unwrap();
        assert_eq!(destination.image().get_pixel(0, 4).0, [64, 64, 64, 255]);
    }

    #[test]
    fn disabled_effect_copies_source() {
        let source = grey(8, 8);
        let mut destination = Frame::new(8, 8, PixelFormat::Rgba8Unorm);
        let mut effect = opaque(EffectParameters {
            enabled: false,
            ..EffectParameters::opaque()
        });
        effect.render(&source, &mut destination).unwrap();
        assert_eq!(destination, source);
    }

    #[test]
    fn unsupported_backend_copies_source() {
        let source = grey(4, 4);
        let mut destination = Frame::new(4, 4, PixelFormat::Rgba8Unorm);
        let mut effect = OpaqueCompositor::new(
            Arc::new(UnavailableBackend::new("wgpu-compute", "no adapter")),
            ViewportMapping::identity(),
            Eye::Right,
            EffectParameters::opaque(),
        );
        effect.set_mask(MaskAsset::new("white", half_mask()).unwrap());
        effect.render(&source, &mut destination).unwrap();
        assert_eq!(destination, source);
    }

    #[test]
    fn empty_source_is_rejected() {
        let source = Frame::new(0, 0, PixelFormat::Rgba8Unorm);
        let mut destination = grey(2, 2);
        let mut effect = opaque(EffectParameters::opaque());
        assert!(matches!(
            effect.render(&source, &mut destination),
            Err(EffectError::FrameMismatch(_))
        ));
        assert_eq!(destination, grey(2, 2));
    }
}

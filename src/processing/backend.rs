use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::EffectError;
use crate::frame::Frame;
use crate::mapping::ViewportMapping;
use crate::mask::MaskAsset;
use crate::params::EffectParameters;

use super::cpu::CpuBackend;
use super::gpu::WgpuBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Cpu,
    WgpuCompute,
    #[default]
    Auto,
}

/// The pass kinds an effect may ask a backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Resample,
    BlurVertical,
    BlurHorizontal,
    CompositeBlur,
    CompositeOpaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlurAxis {
    Vertical,
    Horizontal,
}

impl BlurAxis {
    pub const fn pass(self) -> PassKind {
        match self {
            Self::Vertical => PassKind::BlurVertical,
            Self::Horizontal => PassKind::BlurHorizontal,
        }
    }

    /// Unit step in texel space.
    pub const fn direction(self) -> (f32, f32) {
        match self {
            Self::Vertical => (0.0, 1.0),
            Self::Horizontal => (1.0, 0.0),
        }
    }
}

/// Uniforms of one separable blur pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurPassUniforms {
    pub axis: BlurAxis,
    /// Tap spacing in texels of the buffer being blurred.
    pub offset: f32,
}

/// Uniforms of a mask composite pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskUniforms {
    pub color: [f32; 4],
    pub scale: [f32; 2],
    pub trans: [f32; 2],
    pub invert: bool,
    pub value: f32,
    pub spread: f32,
}

impl MaskUniforms {
    pub fn new(params: &EffectParameters, mapping: &ViewportMapping) -> Self {
        Self {
            color: params.mask_color,
            scale: mapping.scale(),
            trans: mapping.translation(),
            invert: params.mask_invert,
            value: params.mask_value,
            spread: params.mask_spread,
        }
    }

    /// Mask-space UV for a screen-space UV.
    #[inline]
    pub fn mask_uv(&self, u: f32, v: f32) -> (f32, f32) {
        (
            u * self.scale[0] - self.trans[0],
            v * self.scale[1] - self.trans[1],
        )
    }
}

/// Executes the effect passes. Every pass writes all texels of `dst`.
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, _pass: PassKind) -> bool {
        true
    }

    /// Bilinear resample of `src` into `dst` at `dst`'s resolution.
    fn resample(&self, src: &Frame, dst: &mut Frame) -> Result<(), EffectError>;

    /// One 7-tap separable blur pass; `dst` must match `src`'s size.
    fn blur_pass(
        &self,
        src: &Frame,
        dst: &mut Frame,
        uniforms: &BlurPassUniforms,
    ) -> Result<(), EffectError>;

    /// Blend `blurred` (upsampled) over `source` where the mask is set.
    fn composite_blur(
        &self,
        source: &Frame,
        blurred: &Frame,
        mask: &MaskAsset,
        dst: &mut Frame,
        uniforms: &MaskUniforms,
    ) -> Result<(), EffectError>;

    /// Blend the mask color over `source` where the mask is set.
    fn composite_opaque(
        &self,
        source: &Frame,
        mask: &MaskAsset,
        dst: &mut Frame,
        uniforms: &MaskUniforms,
    ) -> Result<(), EffectError>;

    /// Fails with [`EffectError::UnsupportedEffect`] naming the first missing pass.
    fn require(&self, passes: &[PassKind]) -> Result<(), EffectError> {
        match passes.iter().find(|pass| !self.supports(**pass)) {
            Some(pass) => Err(EffectError::UnsupportedEffect {
                backend: self.name(),
                reason: format!("{pass:?} pass unavailable"),
            }),
            None => Ok(()),
        }
    }
}

/// Stand-in for a backend that could not be initialised; supports nothing.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    name: &'static str,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }

    fn unsupported(&self) -> EffectError {
        EffectError::UnsupportedEffect {
            backend: self.name,
            reason: self.reason.clone(),
        }
    }
}

impl RenderBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, _pass: PassKind) -> bool {
        false
    }

    fn resample(&self, _src: &Frame, _dst: &mut Frame) -> Result<(), EffectError> {
        Err(self.unsupported())
    }

    fn blur_pass(
        &self,
        _src: &Frame,
        _dst: &mut Frame,
        _uniforms: &BlurPassUniforms,
    ) -> Result<(), EffectError> {
        Err(self.unsupported())
    }

    fn composite_blur(
        &self,
        _source: &Frame,
        _blurred: &Frame,
        _mask: &MaskAsset,
        _dst: &mut Frame,
        _uniforms: &MaskUniforms,
    ) -> Result<(), EffectError> {
        Err(self.unsupported())
    }

    fn composite_opaque(
        &self,
        _source: &Frame,
        _mask: &MaskAsset,
        _dst: &mut Frame,
        _uniforms: &MaskUniforms,
    ) -> Result<(), EffectError> {
        Err(self.unsupported())
    }
}

/// Build the backend for `kind`.
///
/// `auto` prefers the wgpu compute backend and falls back to the CPU. An
/// explicit `wgpu-compute` request that cannot be met yields an
/// [`UnavailableBackend`], so effects render as pass-through.
pub fn create(kind: BackendKind) -> Arc<dyn RenderBackend> {
    match kind {
        BackendKind::Cpu => Arc::new(CpuBackend),
        BackendKind::WgpuCompute => match WgpuBackend::new() {
            Ok(gpu) => Arc::new(gpu),
            Err(err) => {
                warn!("wgpu compute backend unavailable: {err}");
                Arc::new(UnavailableBackend::new("wgpu-compute", err.to_string()))
            }
        },
        BackendKind::Auto => match WgpuBackend::new() {
            Ok(gpu) => {
                info!("using wgpu compute backend");
                Arc::new(gpu)
            }
            Err(err) => {
                info!("falling back to cpu backend: {err}");
                Arc::new(CpuBackend)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_backend_reports_unsupported() {
        let backend = UnavailableBackend::new("test", "no adapter");
        assert!(!backend.supports(PassKind::Resample));
        let err = backend.require(&[PassKind::CompositeOpaque]).unwrap_err();
        assert!(matches!(err, EffectError::UnsupportedEffect { .. }));
    }

    #[test]
    fn cpu_backend_is_always_available() {
        let backend = create(BackendKind::Cpu);
        assert_eq!(backend.name(), "cpu");
        assert!(
            backend
                .require(&[PassKind::Resample, PassKind::CompositeBlur])
                .is_ok()
        );
    }

    #[test]
    fn mask_uniforms_carry_mapping_and_parameters() {
        let mapping = ViewportMapping {
            scale_x: 2.0,
            scale_y: 1.5,
            trans_x: 0.5,
            trans_y: 0.25,
            pixel_extent_x: 0.0,
            pixel_extent_y: 0.0,
        };
        let uniforms = MaskUniforms::new(&EffectParameters::opaque(), &mapping);
        assert_eq!(uniforms.scale, [2.0, 1.5]);
        assert_eq!(uniforms.trans, [0.5, 0.25]);
        assert_eq!(uniforms.color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(uniforms.mask_uv(0.5, 0.5), mapping.mask_uv(0.5, 0.5));
    }
}

use image::{Rgba, RgbaImage};

use crate::error::EffectError;
use crate::frame::Frame;
use crate::mask::MaskAsset;

use super::backend::{BlurPassUniforms, MaskUniforms, RenderBackend};
use super::sampling::{
    BLUR_WEIGHTS, lerp, mask_weight, opaque_coverage, sample_texels, sample_uv, texel_uv, to_u8,
};

/// Reference implementation of every pass, run on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl RenderBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resample(&self, src: &Frame, dst: &mut Frame) -> Result<(), EffectError> {
        resample_into(src.image(), dst.image_mut());
        Ok(())
    }

    fn blur_pass(
        &self,
        src: &Frame,
        dst: &mut Frame,
        uniforms: &BlurPassUniforms,
    ) -> Result<(), EffectError> {
        ensure_same_size(src, dst)?;
        let image = src.image();
        let (dx, dy) = uniforms.axis.direction();
        for (x, y, pixel) in dst.image_mut().enumerate_pixels_mut() {
            let cx = x as f32 + 0.5;
            let cy = y as f32 + 0.5;
            let mut acc = [0.0f32; 4];
            for (tap, &weight) in BLUR_WEIGHTS.iter().enumerate() {
                let step = (tap as f32 - 3.0) * uniforms.offset;
                let sample = sample_texels(image, cx + dx * step, cy + dy * step);
                for ch in 0..4 {
                    acc[ch] += sample[ch] * weight;
                }
            }
            *pixel = pack(acc);
        }
        Ok(())
    }

    fn composite_blur(
        &self,
        source: &Frame,
        blurred: &Frame,
        mask: &MaskAsset,
        dst: &mut Frame,
        uniforms: &MaskUniforms,
    ) -> Result<(), EffectError> {
        let (width, height) = (dst.width(), dst.height());
        let tint = uniforms.color;
        for (x, y, pixel) in dst.image_mut().enumerate_pixels_mut() {
            let (u, v) = texel_uv(x, y, width, height);
            let weight = sample_mask(mask, uniforms, u, v);
            let base = sample_uv(source.image(), u, v);
            let blur = sample_uv(blurred.image(), u, v);
            let mut out = base;
            for ch in 0..3 {
                let region = lerp(blur[ch], tint[ch], tint[3]);
                out[ch] = lerp(base[ch], region, weight);
            }
            *pixel = pack(out);
        }
        Ok(())
    }

    fn composite_opaque(
        &self,
        source: &Frame,
        mask: &MaskAsset,
        dst: &mut Frame,
        uniforms: &MaskUniforms,
    ) -> Result<(), EffectError> {
        let (width, height) = (dst.width(), dst.height());
        let color = uniforms.color;
        for (x, y, pixel) in dst.image_mut().enumerate_pixels_mut() {
            let (u, v) = texel_uv(x, y, width, height);
            let weight = sample_mask(mask, uniforms, u, v);
            let coverage = opaque_coverage(weight, uniforms.value, uniforms.spread) * color[3];
            let base = sample_uv(source.image(), u, v);
            let mut out = base;
            for ch in 0..3 {
                out[ch] = lerp(base[ch], color[ch], coverage);
            }
            *pixel = pack(out);
        }
        Ok(())
    }
}

/// Bilinear resample used by both the backend and pass-through paths.
pub fn resample_into(src: &RgbaImage, dst: &mut RgbaImage) {
    let (width, height) = dst.dimensions();
    for (x, y, pixel) in dst.enumerate_pixels_mut() {
        let (u, v) = texel_uv(x, y, width, height);
        *pixel = pack(sample_uv(src, u, v));
    }
}

fn sample_mask(mask: &MaskAsset, uniforms: &MaskUniforms, u: f32, v: f32) -> f32 {
    let (mu, mv) = uniforms.mask_uv(u, v);
    mask_weight(sample_uv(mask.image(), mu, mv), uniforms.invert)
}

fn ensure_same_size(src: &Frame, dst: &Frame) -> Result<(), EffectError> {
    if src.width() == dst.width() && src.height() == dst.height() {
        Ok(())
    } else {
        Err(EffectError::FrameMismatch(format!(
            "blur pass needs equal sizes, got {}x{} -> {}x{}",
            src.width(),
            src.height(),
            dst.width(),
            dst.height()
        )))
    }
}

#[inline]
fn pack(c: [f32; 4]) -> Rgba<u8> {
    Rgba([to_u8(c[0]), to_u8(c[1]), to_u8(c[2]), to_u8(c[3])])
}

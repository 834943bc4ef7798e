//! Shared texel math for the CPU backend and the WGSL kernels.
//!
//! Sampling treats texel centers as lying at `i + 0.5` and clamps to the
//! edge, matching bilinear filtering with clamp addressing on the GPU.

use image::RgbaImage;

/// 7-tap Gaussian used by each separable blur pass, center at index 3.
pub const BLUR_WEIGHTS: [f32; 7] = [0.0205, 0.0855, 0.232, 0.324, 0.232, 0.0855, 0.0205];

pub fn rgba_to_f32(image: &RgbaImage) -> Vec<f32> {
    image
        .pixels()
        .flat_map(|p| p.0.iter().map(|&c| (c as f32) / 255.0))
        .collect()
}

/// Overwrite `out` with normalized RGBA floats, rounding to the nearest level.
pub fn write_f32(out: &mut RgbaImage, data: &[f32]) {
    for (i, pixel) in out.pixels_mut().enumerate() {
        let base = i * 4;
        pixel.0 = [
            to_u8(data.get(base).copied().unwrap_or(0.0)),
            to_u8(data.get(base + 1).copied().unwrap_or(0.0)),
            to_u8(data.get(base + 2).copied().unwrap_or(0.0)),
            to_u8(data.get(base + 3).copied().unwrap_or(1.0)),
        ];
    }
}

#[inline]
pub fn to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[inline]
pub fn texel(image: &RgbaImage, x: i64, y: i64) -> [f32; 4] {
    if image.width() == 0 || image.height() == 0 {
        return [0.0; 4];
    }
    let cx = x.clamp(0, image.width() as i64 - 1) as u32;
    let cy = y.clamp(0, image.height() as i64 - 1) as u32;
    let p = image.get_pixel(cx, cy).0;
    [
        p[0] as f32 / 255.0,
        p[1] as f32 / 255.0,
        p[2] as f32 / 255.0,
        p[3] as f32 / 255.0,
    ]
}

/// Bilinear sample at continuous texel-space coordinates.
pub fn sample_texels(image: &RgbaImage, px: f32, py: f32) -> [f32; 4] {
    let qx = px - 0.5;
    let qy = py - 0.5;
    let x0 = qx.floor();
    let y0 = qy.floor();
    let fx = qx - x0;
    let fy = qy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let a = texel(image, x0, y0);
    let b = texel(image, x0 + 1, y0);
    let c = texel(image, x0, y0 + 1);
    let d = texel(image, x0 + 1, y0 + 1);
    let mut out = [0.0; 4];
    for ch in 0..4 {
        let top = lerp(a[ch], b[ch], fx);
        let bottom = lerp(c[ch], d[ch], fx);
        out[ch] = lerp(top, bottom, fy);
    }
    out
}

/// Bilinear sample at normalized UV coordinates.
pub fn sample_uv(image: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    sample_texels(image, u * image.width() as f32, v * image.height() as f32)
}

/// UV of the center of destination texel `(x, y)`.
#[inline]
pub fn texel_uv(x: u32, y: u32, width: u32, height: u32) -> (f32, f32) {
    (
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn luminance(rgb: [f32; 3]) -> f32 {
    (0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]).clamp(0.0, 1.0)
}

/// Hermite smoothstep with WGSL semantics.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Effect weight of a mask texel: luminance times alpha, optionally inverted.
#[inline]
pub fn mask_weight(texel: [f32; 4], invert: bool) -> f32 {
    let weight = luminance([texel[0], texel[1], texel[2]]) * texel[3];
    if invert { 1.0 - weight } else { weight }
}

/// Opacity of the opaque mask for a given mask weight.
#[inline]
pub fn opaque_coverage(weight: f32, value: f32, spread: f32) -> f32 {
    let edge = if spread > 0.0 {
        smoothstep(0.0, spread, weight)
    } else {
        weight
    };
    (value * edge).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn blur_weights_are_symmetric_and_normalized() {
        let sum: f32 = BLUR_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
        for i in 0..3 {
            assert_eq!(BLUR_WEIGHTS[i], BLUR_WEIGHTS[6 - i]);
        }
    }

    #[test]
    fn sampling_at_texel_centers_is_exact() {
        let image = RgbaImage::from_fn(3, 2, |x, y| Rgba([(x * 80) as u8, (y * 200) as u8, 7, 255]));
        for y in 0..2 {
            for x in 0..3 {
                let s = sample_texels(&image, x as f32 + 0.5, y as f32 + 0.5);
                assert_eq!(to_u8(s[0]), (x * 80) as u8);
                assert_eq!(to_u8(s[1]), (y * 200) as u8);
            }
        }
    }

    #[test]
    fn sampling_between_texels_interpolates_and_clamps() {
        let image = RgbaImage::from_fn(2, 1, |x, _| Rgba([if x == 0 { 0 } else { 255 }, 0, 0, 255]));
        let mid = sample_texels(&image, 1.0, 0.5);
        assert!((mid[0] - 0.5).abs() < 1e-6);
        let outside = sample_uv(&image, 4.0, 0.5);
        assert!((outside[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mask_weight_follows_luminance_and_alpha() {
        assert_eq!(mask_weight([0.0, 0.0, 0.0, 1.0], false), 0.0);
        assert!((mask_weight([1.0, 1.0, 1.0, 1.0], false) - 1.0).abs() < 1e-6);
        assert!((mask_weight([1.0, 1.0, 1.0, 0.5], false) - 0.5).abs() < 1e-6);
        assert!((mask_weight([0.0, 0.0, 0.0, 1.0], true) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn coverage_softens_with_spread() {
        assert_eq!(opaque_coverage(0.0, 1.0, 0.0), 0.0);
        assert!((opaque_coverage(0.25, 1.0, 0.0) - 0.25).abs() < 1e-6);
        assert!((opaque_coverage(0.25, 2.0, 0.0) - 0.5).abs() < 1e-6);
        assert_eq!(opaque_coverage(0.5, 1.0, 0.5), 1.0);
        assert!(opaque_coverage(0.1, 1.0, 0.5) < 0.25);
        assert_eq!(opaque_coverage(1.0, 2.0, 0.0), 1.0);
    }
}

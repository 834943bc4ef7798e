//! Projection of a clinically authored mask onto a specific display.
//!
//! Visual-field maps are authored against a fixed angular extent (the central
//! 60 degrees of a 30-2 perimetry test). The mapping tells the compositor how
//! far to stretch the mask UVs and how much to offset them so that the mask
//! covers the same visual angle on every headset.

use tracing::debug;

use crate::display::DisplayProfile;
use crate::error::EffectError;

/// Reference field of view the bundled masks were authored for, in degrees.
pub const DEFAULT_REFERENCE_FOV: f32 = 60.0;

/// Normalized scale and translation consumed as shader uniforms.
///
/// Mask UVs are derived as `uv * scale - trans`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMapping {
    pub scale_x: f32,
    pub scale_y: f32,
    pub trans_x: f32,
    pub trans_y: f32,
    /// Pixel span of the reference field of view on this display.
    pub pixel_extent_x: f32,
    pub pixel_extent_y: f32,
}

impl ViewportMapping {
    /// Compute the mapping for `profile` relative to `reference_fov` degrees.
    ///
    /// # Errors
    /// Returns [`EffectError::DegenerateGeometry`] when a field of view, the
    /// reference angle, or a screen dimension cannot be used as a divisor.
    pub fn compute(profile: &DisplayProfile, reference_fov: f32) -> Result<Self, EffectError> {
        check_angle("fov-x", profile.fov_x)?;
        check_angle("fov-y", profile.fov_y)?;
        check_angle("reference fov", reference_fov)?;
        if profile.screen_width == 0 || profile.screen_height == 0 {
            return Err(EffectError::DegenerateGeometry(format!(
                "screen dimensions {}x{} must be non-zero",
                profile.screen_width, profile.screen_height
            )));
        }

        let width = profile.screen_width as f32;
        let height = profile.screen_height as f32;
        let pixel_extent_x = width * (reference_fov / profile.fov_x);
        let pixel_extent_y = height * (reference_fov / profile.fov_y);
        let scale_x = profile.fov_x / reference_fov;
        let scale_y = profile.fov_y / reference_fov;
        let trans_x = (width - pixel_extent_x) / 2.0 / width * scale_x;
        let trans_y = (height - pixel_extent_y) / 2.0 / height * scale_y;

        debug!(pixel_extent_x, pixel_extent_y, "reference field pixel count");
        debug!(scale_x, scale_y, trans_x, trans_y, "viewport mapping");

        Ok(Self {
            scale_x,
            scale_y,
            trans_x,
            trans_y,
            pixel_extent_x,
            pixel_extent_y,
        })
    }

    /// Mapping that leaves mask UVs untouched.
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            trans_x: 0.0,
            trans_y: 0.0,
            pixel_extent_x: 0.0,
            pixel_extent_y: 0.0,
        }
    }

    pub fn scale(&self) -> [f32; 2] {
        [self.scale_x, self.scale_y]
    }

    pub fn translation(&self) -> [f32; 2] {
        [self.trans_x, self.trans_y]
    }

    /// Mask-space coordinate for a screen-space UV.
    pub fn mask_uv(&self, u: f32, v: f32) -> (f32, f32) {
        (u * self.scale_x - self.trans_x, v * self.scale_y - self.trans_y)
    }
}

impl Default for ViewportMapping {
    fn default() -> Self {
        Self::identity()
    }
}

fn check_angle(what: &str, degrees: f32) -> Result<(), EffectError> {
    if degrees.is_finite() && degrees > 0.0 {
        Ok(())
    } else {
        Err(EffectError::DegenerateGeometry(format!(
            "{what} must be a positive angle, got {degrees}"
        )))
    }
}

//! Tunable effect parameters and the handle used to change them live.

use std::sync::Arc;

use anyhow::{Result, ensure};
use serde::Deserialize;
use tokio::sync::watch;

pub const MAX_BLUR_ITERATIONS: u32 = 4;
pub const MAX_DOWNSAMPLE: u32 = 2;
pub const MAX_BLUR_SIZE: f32 = 10.0;
pub const MAX_MASK_VALUE: f32 = 2.0;

/// Per-compositor configuration, read once per frame.
///
/// Ranges are a caller contract: the compositors do not clamp or reject
/// out-of-range values. [`EffectParameters::validate`] is available for
/// configuration input.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EffectParameters {
    /// Blur iterations, 0-4. Each adds a vertical and a horizontal pass.
    pub blur_iterations: u32,
    /// Blur kernel spacing in full-resolution texels, 0.0-10.0.
    pub blur_size: f32,
    /// Octaves of downsampling before blurring, 0-2.
    pub downsample: u32,
    /// Linear RGBA tint; alpha is the tint strength.
    pub mask_color: [f32; 4],
    pub mask_invert: bool,
    /// Mask opacity, 0.0-2.0.
    pub mask_value: f32,
    /// Mask edge softness; zero uses the raw mask weight.
    pub mask_spread: f32,
    pub enabled: bool,
}

impl EffectParameters {
    /// Defaults for the opaque mask: a solid black scotoma.
    pub const fn opaque() -> Self {
        Self {
            blur_iterations: 0,
            blur_size: 0.0,
            downsample: 0,
            mask_color: [0.0, 0.0, 0.0, 1.0],
            mask_invert: false,
            mask_value: 1.0,
            mask_spread: 0.0,
            enabled: true,
        }
    }

    /// All three blur controls are zero: the blur chain is bypassed.
    pub fn is_blur_bypass(&self) -> bool {
        self.blur_iterations == 0 && self.blur_size == 0.0 && self.downsample == 0
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.blur_iterations <= MAX_BLUR_ITERATIONS,
            "blur-iterations must be at most {MAX_BLUR_ITERATIONS}"
        );
        ensure!(
            self.downsample <= MAX_DOWNSAMPLE,
            "downsample must be at most {MAX_DOWNSAMPLE}"
        );
        ensure!(
            (0.0..=MAX_BLUR_SIZE).contains(&self.blur_size),
            "blur-size must be within 0.0..={MAX_BLUR_SIZE}"
        );
        ensure!(
            (0.0..=MAX_MASK_VALUE).contains(&self.mask_value),
            "mask-value must be within 0.0..={MAX_MASK_VALUE}"
        );
        ensure!(
            self.mask_spread >= 0.0 && self.mask_spread.is_finite(),
            "mask-spread must be a non-negative number"
        );
        ensure!(
            self.mask_color.iter().all(|c| (0.0..=1.0).contains(c)),
            "mask-color components must be within 0.0..=1.0"
        );
        Ok(())
    }
}

impl Default for EffectParameters {
    /// Defaults for the blur mask: two iterations at half resolution, no tint.
    fn default() -> Self {
        Self {
            blur_iterations: 2,
            blur_size: 3.0,
            downsample: 1,
            mask_color: [0.0, 0.0, 0.0, 0.0],
            mask_invert: false,
            mask_value: 1.0,
            mask_spread: 0.0,
            enabled: true,
        }
    }
}

/// Shared handle to a compositor's parameters.
///
/// Clones may be moved to a UI or tooling thread. The compositor takes one
/// [`snapshot`](Self::snapshot) at the start of each render call, so an update
/// never lands halfway through a frame.
#[derive(Debug, Clone)]
pub struct ParameterHandle {
    tx: Arc<watch::Sender<EffectParameters>>,
}

impl ParameterHandle {
    pub fn new(initial: EffectParameters) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> EffectParameters {
        *self.tx.borrow()
    }

    pub fn update(&self, apply: impl FnOnce(&mut EffectParameters)) {
        self.tx.send_modify(apply);
    }

    pub fn replace(&self, params: EffectParameters) -> EffectParameters {
        self.tx.send_replace(params)
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<EffectParameters> {
        self.tx.subscribe()
    }
}

impl Default for ParameterHandle {
    fn default() -> Self {
        Self::new(EffectParameters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_requires_all_blur_controls_zero() {
        let mut params = EffectParameters {
            blur_iterations: 0,
            blur_size: 0.0,
            downsample: 0,
            ..EffectParameters::default()
        };
        assert!(params.is_blur_bypass());
        params.downsample = 1;
        assert!(!params.is_blur_bypass());
        assert!(!EffectParameters::default().is_blur_bypass());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(EffectParameters::default().validate().is_ok());
        assert!(EffectParameters::opaque().validate().is_ok());
        let too_many = EffectParameters {
            blur_iterations: 5,
            ..EffectParameters::default()
        };
        assert!(too_many.validate().is_err());
        let too_small = EffectParameters {
            downsample: 3,
            ..EffectParameters::default()
        };
        assert!(too_small.validate().is_err());
        let too_wide = EffectParameters {
            blur_size: 10.5,
            ..EffectParameters::default()
        };
        assert!(too_wide.validate().is_err());
    }

    #[test]
    fn updates_from_another_thread_are_visible_to_snapshots() {
        let handle = ParameterHandle::default();
        let before = handle.snapshot();
        let tuner = handle.clone();
        std::thread::spawn(move || tuner.update(|p| p.blur_iterations = 4))
            .join()
            .unwrap();
        assert_eq!(before.blur_iterations, 2);
        assert_eq!(handle.snapshot().blur_iterations, 4);
    }

    #[test]
    fn subscribers_see_replacements() {
        let handle = ParameterHandle::default();
        let mut rx = handle.subscribe();
        let previous = handle.replace(EffectParameters::opaque());
        assert_eq!(previous, EffectParameters::default());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), EffectParameters::opaque());
    }

    #[test]
    fn blur_tint_is_transparent_while_opaque_paints_black() {
        assert_eq!(EffectParameters::default().mask_color, [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(EffectParameters::opaque().mask_color, [0.0, 0.0, 0.0, 1.0]);
    }
}

//! The two screen-space compositors and the state they share.

pub mod blur;
pub mod opaque;

use tracing::debug;

use crate::error::EffectError;
use crate::frame::Frame;
use crate::mask::{Eye, MaskAsset, MaskCatalog, MaskLoader, MaskSelector};
use crate::processing::cpu::resample_into;

/// The mask a compositor currently applies, and how to pick the next one.
#[derive(Debug, Clone)]
pub(crate) struct MaskSlot {
    selector: MaskSelector,
    eye: Eye,
    mask: MaskAsset,
}

impl MaskSlot {
    pub(crate) fn new(catalog: MaskCatalog, eye: Eye) -> Self {
        Self {
            selector: MaskSelector::new(catalog),
            eye,
            mask: MaskAsset::blank(),
        }
    }

    pub(crate) fn eye(&self) -> Eye {
        self.eye
    }

    pub(crate) fn mask(&self) -> &MaskAsset {
        &self.mask
    }

    pub(crate) fn set(&mut self, mask: MaskAsset) {
        self.mask = mask;
    }

    /// Select the mask for `condition_id` and load it unless already current.
    pub(crate) fn select(
        &mut self,
        condition_id: i32,
        loader: &dyn MaskLoader,
    ) -> Result<&'static str, EffectError> {
        let name = self.selector.select_mask(condition_id, self.eye);
        self.load(name, loader)?;
        Ok(name)
    }

    /// Replace the mask with the texture called `name`.
    ///
    /// On failure the previous mask stays in place.
    pub(crate) fn load(&mut self, name: &str, loader: &dyn MaskLoader) -> Result<(), EffectError> {
        if self.mask.name() == name {
            return Ok(());
        }
        let mask = loader.load(name)?;
        debug!(eye = %self.eye, mask = name, "mask texture selected");
        self.mask = mask;
        Ok(())
    }
}

/// Reject frames with no texels before any pass samples them.
pub(crate) fn ensure_renderable(source: &Frame, destination: &Frame) -> Result<(), EffectError> {
    if source.is_empty() || destination.is_empty() {
        return Err(EffectError::FrameMismatch(format!(
            "cannot render {}x{} into {}x{}",
            source.width(),
            source.height(),
            destination.width(),
            destination.height()
        )));
    }
    Ok(())
}

/// Copy `source` to `destination` unchanged, resampling only when the sizes differ.
pub(crate) fn pass_through(source: &Frame, destination: &mut Frame) -> Result<(), EffectError> {
    if source.width() == destination.width() && source.height() == destination.height() {
        destination.copy_from(source)
    } else {
        ensure_renderable(source, destination)?;
        resample_into(source.image(), destination.image_mut());
        Ok(())
    }
}

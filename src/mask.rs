//! Clinical mask selection and loading.
//!
//! Name resolution is pure: a condition id plus eye laterality maps to a
//! texture name. Loading that name is a separate, fallible step performed by a
//! [`MaskLoader`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::Deserialize;
use tracing::debug;

use crate::error::EffectError;

/// Texture name of the mask that applies no effect.
pub const BLANK_MASK: &str = "_black";

const MASK_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const fn is_left(self) -> bool {
        matches!(self, Self::Left)
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Simulated visual-field conditions with a bundled mask texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    None,
    HomonymousHemianopiaIncomplete,
    HomonymousHemianopiaComplete,
    BitemporalLoss,
    CentralScotoma,
    PeripheralLoss,
}

impl Condition {
    /// Texture name for this condition as seen by `eye`.
    pub const fn texture_name(self, eye: Eye) -> &'static str {
        let left = eye.is_left();
        match self {
            Self::None => BLANK_MASK,
            Self::HomonymousHemianopiaIncomplete if left => {
                "homonymous_hemianopia_incomplete_left_clamp30_gaussian"
            }
            Self::HomonymousHemianopiaIncomplete => {
                "homonymous_hemianopia_incomplete_right_clamp30_gaussian"
            }
            Self::HomonymousHemianopiaComplete if left => {
                "homonymous_hemianopia_complete_left_clamp30_gaussian"
            }
            Self::HomonymousHemianopiaComplete => {
                "homonymous_hemianopia_complete_right_clamp30_gaussian"
            }
            Self::BitemporalLoss if left => "bitemporal_loss_simulated_left_clamp30_gaussian",
            Self::BitemporalLoss => "bitemporal_loss_simulated_right_clamp30_gaussian",
            Self::CentralScotoma if left => "central_scotoma_simulated_left_clamp30_gaussian",
            Self::CentralScotoma => "central_scotoma_simulated_right_clamp30_gaussian",
            Self::PeripheralLoss if left => "peripheral_loss_left_approx",
            Self::PeripheralLoss => "peripheral_loss_right_approx",
        }
    }

    /// Whether the left and right eyes use different textures.
    pub const fn has_laterality(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Condition numbering used by each effect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskCatalog {
    /// 0 blank, 1-2 homonymous hemianopia, 3 bitemporal loss, 4 central scotoma.
    Blur,
    /// 0 blank, 1 central scotoma, 2 peripheral loss.
    Opaque,
}

impl MaskCatalog {
    const BLUR: &'static [Condition] = &[
        Condition::None,
        Condition::HomonymousHemianopiaIncomplete,
        Condition::HomonymousHemianopiaComplete,
        Condition::BitemporalLoss,
        Condition::CentralScotoma,
    ];
    const OPAQUE: &'static [Condition] = &[
        Condition::None,
        Condition::CentralScotoma,
        Condition::PeripheralLoss,
    ];

    pub const fn conditions(self) -> &'static [Condition] {
        match self {
            Self::Blur => Self::BLUR,
            Self::Opaque => Self::OPAQUE,
        }
    }

    /// Condition for `condition_id`; ids outside the catalog mean no condition.
    pub fn condition(self, condition_id: i32) -> Condition {
        usize::try_from(condition_id)
            .ok()
            .and_then(|idx| self.conditions().get(idx).copied())
            .unwrap_or(Condition::None)
    }
}

/// Resolves condition ids to mask texture names for one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskSelector {
    catalog: MaskCatalog,
}

impl MaskSelector {
    pub const fn new(catalog: MaskCatalog) -> Self {
        Self { catalog }
    }

    pub const fn catalog(&self) -> MaskCatalog {
        self.catalog
    }

    pub fn select_mask(&self, condition_id: i32, eye: Eye) -> &'static str {
        self.catalog.condition(condition_id).texture_name(eye)
    }
}

/// A loaded mask texture.
///
/// The weight of a texel is its luminance multiplied by alpha, so black or
/// transparent texels leave the frame untouched.
#[derive(Debug, Clone)]
pub struct MaskAsset {
    name: String,
    image: Arc<RgbaImage>,
}

impl MaskAsset {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Result<Self, EffectError> {
        let name = name.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(EffectError::ResourceNotFound(format!(
                "mask {name} has no pixels"
            )));
        }
        Ok(Self {
            name,
            image: Arc::new(image),
        })
    }

    /// The built-in mask that applies no effect.
    pub fn blank() -> Self {
        Self {
            name: BLANK_MASK.to_string(),
            image: Arc::new(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Name to texture resource loading.
pub trait MaskLoader {
    /// # Errors
    /// Returns [`EffectError::ResourceNotFound`] when no texture exists for `name`.
    fn load(&self, name: &str) -> Result<MaskAsset, EffectError>;
}

/// Loads `<root>/<name>.png` (or `.jpg`/`.jpeg`).
///
/// The blank mask is built in and never touches the filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryMaskLoader {
    root: PathBuf,
}

impl DirectoryMaskLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        MASK_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl MaskLoader for DirectoryMaskLoader {
    fn load(&self, name: &str) -> Result<MaskAsset, EffectError> {
        if name == BLANK_MASK && self.locate(name).is_none() {
            return Ok(MaskAsset::blank());
        }
        let path = self.locate(name).ok_or_else(|| {
            EffectError::ResourceNotFound(format!(
                "mask {name} not found in {}",
                self.root.display()
            ))
        })?;
        let image = image::open(&path)
            .map_err(|err| EffectError::ResourceNotFound(format!("mask {name}: {err}")))?
            .to_rgba8();
        debug!(
            mask = name,
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded mask texture"
        );
        MaskAsset::new(name, image)
    }
}

/// Serves masks from memory, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryMaskLoader {
    textures: HashMap<String, RgbaImage>,
}

impl MemoryMaskLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.textures.insert(name.into(), image);
    }

    pub fn with(mut self, name: impl Into<String>, image: RgbaImage) -> Self {
        self.insert(name, image);
        self
    }
}

impl MaskLoader for MemoryMaskLoader {
    fn load(&self, name: &str) -> Result<MaskAsset, EffectError> {
        match self.textures.get(name) {
            Some(image) => MaskAsset::new(name, image.clone()),
            None if name == BLANK_MASK => Ok(MaskAsset::blank()),
            None => Err(EffectError::ResourceNotFound(format!("mask {name}"))),
        }
    }
}

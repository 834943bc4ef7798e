//! Head-mounted display geometry lookup.
//!
//! Maps the model name reported by the XR runtime to the per-eye pixel
//! resolution and monocular field of view used to scale the clinical masks.
//! Unknown or empty names resolve to the default development profile.

use std::fmt;

use serde::Deserialize;
use tracing::info;

const MODEL_RIFT_CV1: &str = "Oculus Rift CV1";
const MODEL_VIVE_1: &str = "Vive MV";
const MODEL_VIVE_PRO: &str = "Vive Pro";
const MODEL_VARJO_XR3: &str = "Varjo XR3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// No headset recognised; geometry of the default development headset.
    Editor,
    OculusCv1,
    Vive,
    VivePro,
    VarjoXr3,
    /// Geometry supplied explicitly by configuration.
    Custom,
}

impl DeviceKind {
    const KNOWN: &'static [Self] = &[Self::OculusCv1, Self::Vive, Self::VivePro, Self::VarjoXr3];

    /// Runtime model name that selects this device, if any.
    pub const fn model_name(&self) -> Option<&'static str> {
        match self {
            Self::OculusCv1 => Some(MODEL_RIFT_CV1),
            Self::Vive => Some(MODEL_VIVE_1),
            Self::VivePro => Some(MODEL_VIVE_PRO),
            Self::VarjoXr3 => Some(MODEL_VARJO_XR3),
            Self::Editor | Self::Custom => None,
        }
    }

    fn from_model_name(model: &str) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|kind| kind.model_name() == Some(model))
            .unwrap_or(Self::Editor)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Editor => f.write_str("editor"),
            Self::Custom => f.write_str("custom"),
            other => f.write_str(other.model_name().unwrap_or("unknown")),
        }
    }
}

/// Per-eye display geometry of the attached headset. Immutable once resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayProfile {
    pub id: DeviceKind,
    /// Horizontal pixels per eye.
    pub screen_width: u32,
    /// Vertical pixels per eye.
    pub screen_height: u32,
    /// Monocular horizontal field of view in degrees.
    pub fov_x: f32,
    /// Monocular vertical field of view in degrees.
    pub fov_y: f32,
}

impl DisplayProfile {
    /// Table geometry for a device kind.
    ///
    /// Figures are per eye. The Vive Pro values are the HMDQ measurements
    /// (98.755 x 107.72) rather than the advertised 100 x 110; the Varjo XR3
    /// uses the 1920 x 1920 focus-display resolution.
    pub const fn for_device(kind: DeviceKind) -> Self {
        let (screen_width, screen_height, fov_x, fov_y) = match kind {
            DeviceKind::OculusCv1 => (1080, 1200, 84.0, 93.0),
            DeviceKind::Vive => (1080, 1200, 100.0, 110.0),
            DeviceKind::VarjoXr3 => (1920, 1920, 99.0, 99.0),
            DeviceKind::VivePro | DeviceKind::Editor | DeviceKind::Custom => {
                (1440, 1600, 98.755, 107.72)
            }
        };
        Self {
            id: kind,
            screen_width,
            screen_height,
            fov_x,
            fov_y,
        }
    }

    /// Explicit geometry that bypasses the device table.
    pub const fn custom(screen_width: u32, screen_height: u32, fov_x: f32, fov_y: f32) -> Self {
        Self {
            id: DeviceKind::Custom,
            screen_width,
            screen_height,
            fov_x,
            fov_y,
        }
    }

    /// Horizontal pixels per degree. Vertical density may differ.
    pub fn pixel_density(&self) -> f32 {
        self.screen_width as f32 / self.fov_x
    }
}

impl Default for DisplayProfile {
    fn default() -> Self {
        Self::for_device(DeviceKind::Editor)
    }
}

/// Resolve the display profile for a runtime model name.
///
/// Matching is exact. Anything unrecognised, including an empty name, yields
/// the default profile; this never fails.
pub fn resolve(device_name: &str) -> DisplayProfile {
    let kind = DeviceKind::from_model_name(device_name);
    let profile = DisplayProfile::for_device(kind);
    if kind == DeviceKind::Editor {
        info!(
            device = device_name,
            "no known headset detected, assuming Vive Pro geometry"
        );
    } else {
        info!(device = device_name, kind = %kind, "headset connected");
    }
    profile
}

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::display::{self, DisplayProfile};
use crate::mapping::DEFAULT_REFERENCE_FOV;
use crate::mask::MaskCatalog;
use crate::params::EffectParameters;
use crate::processing::backend::BackendKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Field of view, in degrees, that the mask textures were authored for.
    pub reference_fov_degrees: f32,
    /// Render backend: `cpu`, `wgpu-compute` or `auto`.
    pub backend: BackendKind,
    /// Directory holding the mask textures.
    pub mask_directory: PathBuf,
    pub display: DisplayConfig,
    pub effect: EffectConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.reference_fov_degrees.is_finite() && self.reference_fov_degrees > 0.0,
            "reference-fov-degrees must be positive"
        );
        ensure!(
            self.reference_fov_degrees < 180.0,
            "reference-fov-degrees must be below 180"
        );
        self.display.validate().context("invalid display configuration")?;
        self.effect
            .parameters()?
            .validate()
            .context("invalid effect parameters")?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            reference_fov_degrees: DEFAULT_REFERENCE_FOV,
            backend: BackendKind::default(),
            mask_directory: PathBuf::from("masks"),
            display: DisplayConfig::default(),
            effect: EffectConfig::default(),
        }
    }
}

/// Which headset geometry to simulate.
///
/// `custom` wins over `device`; with neither, the default profile is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DisplayConfig {
    /// Runtime model name, e.g. `"Vive Pro"`.
    pub device: Option<String>,
    pub custom: Option<CustomDisplay>,
}

impl DisplayConfig {
    pub fn profile(&self) -> DisplayProfile {
        match (&self.custom, &self.device) {
            (Some(custom), _) => DisplayProfile::custom(
                custom.screen_width,
                custom.screen_height,
                custom.fov_x,
                custom.fov_y,
            ),
            (None, Some(device)) => display::resolve(device),
            (None, None) => display::resolve(""),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(custom) = &self.custom {
            ensure!(
                custom.screen_width > 0 && custom.screen_height > 0,
                "display.custom screen size must be non-zero"
            );
            ensure!(
                custom.fov_x > 0.0 && custom.fov_x < 180.0,
                "display.custom.fov-x must be within (0, 180)"
            );
            ensure!(
                custom.fov_y > 0.0 && custom.fov_y < 180.0,
                "display.custom.fov-y must be within (0, 180)"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CustomDisplay {
    pub screen_width: u32,
    pub screen_height: u32,
    pub fov_x: f32,
    pub fov_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    #[default]
    Blur,
    Opaque,
}

impl EffectKind {
    /// Mask catalog the condition ids of this effect index into.
    pub fn catalog(self) -> MaskCatalog {
        match self {
            Self::Blur => MaskCatalog::Blur,
            Self::Opaque => MaskCatalog::Opaque,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blur => "blur",
            Self::Opaque => "opaque",
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EffectConfig {
    #[serde(rename = "type")]
    pub kind: EffectKind,
    /// Condition id in the catalog of `kind`; 0 is no impairment.
    pub condition: i32,
    /// Omitted fields take the defaults of `kind`.
    parameters: Option<serde_yaml::Value>,
}

impl EffectConfig {
    pub fn new(kind: EffectKind, condition: i32) -> Self {
        Self {
            kind,
            condition,
            parameters: None,
        }
    }

    /// Parameters for this effect, with unset fields filled from the
    /// per-kind defaults.
    pub fn parameters(&self) -> Result<EffectParameters> {
        let mut params = match self.kind {
            EffectKind::Blur => EffectParameters::default(),
            EffectKind::Opaque => EffectParameters::opaque(),
        };
        if let Some(overrides) = &self.parameters {
            let overrides: ParameterOverrides = serde_yaml::from_value(overrides.clone())
                .context("parsing effect.parameters")?;
            overrides.apply(&mut params);
        }
        Ok(params)
    }
}

/// Partial parameter set layered over the per-kind defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ParameterOverrides {
    blur_iterations: Option<u32>,
    blur_size: Option<f32>,
    downsample: Option<u32>,
    mask_color: Option<[f32; 4]>,
    mask_invert: Option<bool>,
    mask_value: Option<f32>,
    mask_spread: Option<f32>,
    enabled: Option<bool>,
}

impl ParameterOverrides {
    fn apply(self, params: &mut EffectParameters) {
        if let Some(v) = self.blur_iterations {
            params.blur_iterations = v;
        }
        if let Some(v) = self.blur_size {
            params.blur_size = v;
        }
        if let Some(v) = self.downsample {
            params.downsample = v;
        }
        if let Some(v) = self.mask_color {
            params.mask_color = v;
        }
        if let Some(v) = self.mask_invert {
            params.mask_invert = v;
        }
        if let Some(v) = self.mask_value {
            params.mask_value = v;
        }
        if let Some(v) = self.mask_spread {
            params.mask_spread = v;
        }
        if let Some(v) = self.enabled {
            params.enabled = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DeviceKind;

    #[test]
    fn opaque_defaults_are_layered_under_overrides() {
        let yaml = r#"
effect:
  type: opaque
  condition: 2
  parameters:
    mask-spread: 0.25
"#;
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        let params = cfg.effect.parameters().unwrap();
        assert_eq!(cfg.effect.kind, EffectKind::Opaque);
        assert_eq!(params.mask_color, [0.0, 0.0, 0.0, 1.0]);
        assert!((params.mask_spread - 0.25).abs() < f32::EPSILON);
        assert_eq!(params.blur_iterations, 0);
    }

    #[test]
    fn unknown_parameter_fails_validation() {
        let yaml = r#"
effect:
  parameters:
    blur-radius: 3.0
"#;
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn custom_geometry_overrides_device() {
        let display = DisplayConfig {
            device: Some("Vive MV".into()),
            custom: Some(CustomDisplay {
                screen_width: 2000,
                screen_height: 2000,
                fov_x: 90.0,
                fov_y: 90.0,
            }),
        };
        let profile = display.profile();
        assert_eq!(profile.id, DeviceKind::Custom);
        assert_eq!(profile.screen_width, 2000);
    }
}

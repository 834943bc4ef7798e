//! A simulation session: one display profile, one mapping and a compositor
//! per eye, all resolved once when the session starts.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{Configuration, EffectKind};
use crate::display::DisplayProfile;
use crate::effects::blur::BlurCompositor;
use crate::effects::opaque::OpaqueCompositor;
use crate::error::EffectError;
use crate::frame::Frame;
use crate::mapping::ViewportMapping;
use crate::mask::{Eye, MaskAsset, MaskLoader, MaskSelector};
use crate::params::{EffectParameters, ParameterHandle};
use crate::processing::backend::{self, RenderBackend};

pub enum Compositor {
    Blur(BlurCompositor),
    Opaque(OpaqueCompositor),
}

impl Compositor {
    fn new(
        kind: EffectKind,
        backend: Arc<dyn RenderBackend>,
        mapping: ViewportMapping,
        eye: Eye,
        params: EffectParameters,
    ) -> Self {
        match kind {
            EffectKind::Blur => Self::Blur(BlurCompositor::new(backend, mapping, eye, params)),
            EffectKind::Opaque => {
                Self::Opaque(OpaqueCompositor::new(backend, mapping, eye, params))
            }
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Blur(_) => EffectKind::Blur,
            Self::Opaque(_) => EffectKind::Opaque,
        }
    }

    pub fn render(&mut self, source: &Frame, destination: &mut Frame) -> Result<(), EffectError> {
        match self {
            Self::Blur(c) => c.render(source, destination),
            Self::Opaque(c) => c.render(source, destination),
        }
    }

    pub fn parameters(&self) -> &ParameterHandle {
        match self {
            Self::Blur(c) => c.parameters(),
            Self::Opaque(c) => c.parameters(),
        }
    }

    pub fn mask(&self) -> &MaskAsset {
        match self {
            Self::Blur(c) => c.mask(),
            Self::Opaque(c) => c.mask(),
        }
    }

    pub fn set_condition(
        &mut self,
        condition_id: i32,
        loader: &dyn MaskLoader,
    ) -> Result<&'static str, EffectError> {
        match self {
            Self::Blur(c) => c.set_condition(condition_id, loader),
            Self::Opaque(c) => c.set_condition(condition_id, loader),
        }
    }

    pub fn set_mask(&mut self, mask: MaskAsset) {
        match self {
            Self::Blur(c) => c.set_mask(mask),
            Self::Opaque(c) => c.set_mask(mask),
        }
    }

    fn set_mapping(&mut self, mapping: ViewportMapping) {
        match self {
            Self::Blur(c) => c.set_mapping(mapping),
            Self::Opaque(c) => c.set_mapping(mapping),
        }
    }
}

pub struct Session {
    profile: DisplayProfile,
    reference_fov: f32,
    mapping: ViewportMapping,
    loader: Box<dyn MaskLoader>,
    left: Compositor,
    right: Compositor,
}

impl Session {
    /// Start a session on the backend named by the configuration.
    pub fn start(config: &Configuration, loader: Box<dyn MaskLoader>) -> Result<Self> {
        let backend = backend::create(config.backend);
        Self::with_backend(config, loader, backend)
    }

    pub fn with_backend(
        config: &Configuration,
        loader: Box<dyn MaskLoader>,
        backend: Arc<dyn RenderBackend>,
    ) -> Result<Self> {
        let profile = config.display.profile();
        let reference_fov = config.reference_fov_degrees;
        let mapping = ViewportMapping::compute(&profile, reference_fov)
            .context("computing viewport mapping")?;
        let params = config.effect.parameters()?;
        let kind = config.effect.kind;

        let mut left = Compositor::new(kind, backend.clone(), mapping, Eye::Left, params);
        let mut right = Compositor::new(kind, backend.clone(), mapping, Eye::Right, params);
        let condition = config.effect.condition;
        for compositor in [&mut left, &mut right] {
            compositor
                .set_condition(condition, loader.as_ref())
                .with_context(|| format!("loading masks for condition {condition}"))?;
        }
        info!(
            device = %profile.id,
            effect = %kind,
            backend = backend.name(),
            condition,
            scale_x = mapping.scale_x,
            scale_y = mapping.scale_y,
            "session started"
        );
        Ok(Self {
            profile,
            reference_fov,
            mapping,
            loader,
            left,
            right,
        })
    }

    pub fn profile(&self) -> &DisplayProfile {
        &self.profile
    }

    pub fn mapping(&self) -> &ViewportMapping {
        &self.mapping
    }

    pub fn reference_fov(&self) -> f32 {
        self.reference_fov
    }

    pub fn compositor(&self, eye: Eye) -> &Compositor {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }

    pub fn compositor_mut(&mut self, eye: Eye) -> &mut Compositor {
        match eye {
            Eye::Left => &mut self.left,
            Eye::Right => &mut self.right,
        }
    }

    pub fn render(
        &mut self,
        eye: Eye,
        source: &Frame,
        destination: &mut Frame,
    ) -> Result<(), EffectError> {
        self.compositor_mut(eye).render(source, destination)
    }

    /// Switch both eyes to a new condition.
    ///
    /// Both masks are loaded before either is swapped in; on error neither
    /// eye changes.
    pub fn set_condition(&mut self, condition_id: i32) -> Result<(), EffectError> {
        let selector = MaskSelector::new(self.left.kind().catalog());
        let left = self
            .loader
            .load(selector.select_mask(condition_id, Eye::Left))?;
        let right = self
            .loader
            .load(selector.select_mask(condition_id, Eye::Right))?;
        self.left.set_mask(left);
        self.right.set_mask(right);
        debug!(condition = condition_id, "condition changed");
        Ok(())
    }

    /// Recompute the mapping for a new reference FOV.
    pub fn set_reference_fov(&mut self, reference_fov: f32) -> Result<(), EffectError> {
        let mapping = ViewportMapping::compute(&self.profile, reference_fov)?;
        self.reference_fov = reference_fov;
        self.mapping = mapping;
        self.left.set_mapping(mapping);
        self.right.set_mapping(mapping);
        debug!(reference_fov, "reference field of view changed");
        Ok(())
    }
}

use thiserror::Error;

/// Library error type for the visual-field effect pipeline.
#[derive(Debug, Error)]
pub enum EffectError {
    /// A field-of-view or screen dimension used as a denominator is zero or invalid.
    #[error("degenerate display geometry: {0}")]
    DegenerateGeometry(String),

    /// A mask texture or shader asset could not be found or decoded.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The active render backend cannot execute a pass the effect needs.
    #[error("effect unsupported on backend {backend}: {reason}")]
    UnsupportedEffect {
        backend: &'static str,
        reason: String,
    },

    /// Frame sizes or formats do not fit the requested operation.
    #[error("frame mismatch: {0}")]
    FrameMismatch(String),

    /// Runtime failure reported by the render backend.
    #[error("render backend error: {0}")]
    Backend(anyhow::Error),
}

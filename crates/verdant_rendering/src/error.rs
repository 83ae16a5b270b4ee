//! # Render Error Types
//!
//! Asset failures are wrapped so a skipped placement can carry its cause.
//! Device and resource creation failures are not represented here: they
//! surface through wgpu's device error handler.

use thiserror::Error;
use verdant_assets::AssetError;

/// Errors reported by the instance renderer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A model file could not be loaded.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Instance id does not exist in the registry.
    #[error("unknown instance: {0}")]
    UnknownInstance(u32),

    /// Instance exists but its model has no skeleton.
    #[error("instance {0} is not animated")]
    NotAnimated(u32),

    /// Animation request names a sequence the model does not have.
    #[error("instance {instance}: sequence {sequence} out of range, model has {available}")]
    UnknownAnimationSequence {
        /// Target instance.
        instance: u32,
        /// Requested sequence index.
        sequence: u32,
        /// Sequences the model declares.
        available: u32,
    },

    /// Bounded animation queue is full this frame.
    #[error("animation request queue is full")]
    AnimationQueueFull,

    /// Renderer owning the animation queue was dropped.
    #[error("animation request queue is closed")]
    AnimationQueueClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

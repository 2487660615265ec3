//! # Rendering System
//!
//! Turns a [`SceneGraph`](crate::scene::SceneGraph) into calls on a
//! [`GpuContext`]. The renderer never talks to a concrete graphics API.
//!
//! ## Architecture
//!
//! - **Renderer**: per-frame pipeline and lifecycle (init, context loss)
//! - **Shader variants**: feature defines folded into cached program variants
//! - **Semantics**: shader inputs bound by name to values pulled from the frame
//! - **State cache**: redundant fixed-function state calls are dropped
//! - **Resource pools**: GPU objects created lazily and collected when unused
//!
//! ## Current Limitations
//!
//! - Single render target; framebuffer objects beyond the default are not managed
//! - Shading templates are skeletal, lighting math is minimal

use thiserror::Error;

pub mod geometry;
pub mod gpu;
pub mod headless;
pub mod light;
pub mod material;
pub mod pipeline;
pub mod render_list;
pub mod resource_pool;
pub mod semantic;
pub mod shader;
pub mod state_cache;
pub mod texture;

#[cfg(test)]
mod tests;

pub use geometry::{attribute_names, Geometry, SharedGeometry, VertexAttribute};
pub use gpu::{GpuCapabilities, GpuContext, GpuError, RawHandle, StateCommand};
pub use headless::RecordingContext;
pub use light::{Light, LightAggregate, LightKind, LightManager, ShadowBinding};
pub use material::{BlendState, Material, MaterialId, ShadingModel, SharedMaterial, Side};
pub use pipeline::{FrameStats, Renderer, RendererEvent, RendererEventKind, RendererStatus, Viewport};
pub use render_list::{RenderItem, RenderList};
pub use resource_pool::{GpuResource, ResourceKey, ResourcePool, ResourcePools};
pub use semantic::{Semantic, SemanticDescriptor, SemanticRegistry, SemanticValue};
pub use shader::{RenderOptions, ShaderTemplate, ShaderVariant, ShaderVariantResolver};
pub use state_cache::GpuStateCache;
pub use texture::{SharedTexture, Texture};

use crate::config::ConfigError;

/// Rendering system errors
///
/// # Design Philosophy
/// Per-frame failures are not returned from `render`; they move the renderer
/// into a non-ready state and are reported through its event channel. These
/// errors surface from initialization and from the internal draw path.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// Occurs when the configuration is invalid or the device cannot report
    /// its capabilities.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A shader variant did not compile or link
    #[error("Shader variant {variant} failed to compile: {log}")]
    ShaderCompilation {
        /// Variant label (`template#id`)
        variant: String,
        /// Compiler or linker log
        log: String,
    },

    /// The GPU context is lost
    #[error("GPU context lost")]
    ContextLost,

    /// Device-level error
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Invalid renderer configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

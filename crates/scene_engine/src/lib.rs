//! # Scene Engine
//!
//! A retained-mode 3D scene-graph renderer core.
//!
//! ## Features
//!
//! - **Scene Graph**: arena of spatial nodes with dirty-flag transform propagation
//! - **Shader Variants**: feature defines resolved into cached program variants
//! - **Semantic Binding**: shader inputs bound by name, no hard-coded uniforms
//! - **State Diffing**: redundant GPU state calls are never issued
//! - **Frame-based GC**: GPU objects unused for a frame are released
//! - **API Agnostic**: every device call goes through the `GpuContext` trait
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_engine::prelude::*;
//!
//! let mut scene = SceneGraph::new();
//! let root = scene.root();
//! let camera = scene
//!     .create_child(
//!         root,
//!         Node::camera("camera", Camera::perspective(60.0, 4.0 / 3.0, 0.1, 100.0))
//!             .with_position(0.0, 0.0, 5.0),
//!     )
//!     .unwrap();
//! let cube = Drawable::new(Geometry::cube(1.0).into_shared(), Material::lambert().into_shared());
//! scene.create_child(root, Node::mesh("cube", cube));
//!
//! let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::default());
//! renderer.initialize().unwrap();
//! let stats = renderer.render(&mut scene, camera);
//! assert_eq!(stats.draw_calls, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::must_use_candidate
)]

pub mod config;
pub mod core;
pub mod events;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for applications
pub mod prelude {
    pub use crate::config::{Config, ConfigError};
    pub use crate::core::{ClearMask, RendererConfig, ShaderPrecision};
    pub use crate::events::{EventChannel, Propagation};
    pub use crate::foundation::math::{Mat4, Quat, Vec3};
    pub use crate::render::{
        FrameStats, Geometry, GpuContext, Light, Material, RecordingContext, RenderError, RenderResult, Renderer,
        RendererEvent, RendererEventKind, RendererStatus, SemanticDescriptor, SemanticValue, Texture,
    };
    pub use crate::scene::{Camera, Drawable, Node, NodeEvent, NodeEventKind, NodeId, SceneGraph, TraverseControl};
}

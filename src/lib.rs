//! Scene Renderer - a scene-graph renderer over a minimal graphics device trait
//!
//! A tree of [`scene::Node`]s carries transforms with lazily recomputed world
//! matrices. Mesh nodes pair [`resources::Geometry`] with a [`resources::Material`]
//! whose [`shader::Program`] is built on first use from registry, inline or file
//! sources run through the `#include` preprocessor.
//!
//! # Features
//! - Stale-flag transform propagation with weak parent links
//! - Shader registry plus file storage behind one include expander
//! - Deferred program builds keyed on the active define set
//! - One draw call per visible mesh, instanced when requested
//! - Solid color and cube map backgrounds
//! - Headless device that records every call, for tests and tooling

pub mod backend;
pub mod clock;
pub mod events;
pub mod logging;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;

use std::path::PathBuf;

use glam::Vec4;

pub use backend::{GraphicsDevice, HeadlessDevice};
pub use clock::{Clock, FrameContext};
pub use events::EventBus;
pub use logging::LoggerConfig;
pub use renderer::{RenderTarget, RenderTargetDesc, Renderer, SharedRenderTarget};
pub use scene::{Camera, Node, NodeRef};

/// Configuration for creating a [`Renderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial default framebuffer width
    pub width: u32,
    /// Initial default framebuffer height
    pub height: u32,
    /// Color used by automatic and explicit color clears
    pub clear_color: Vec4,
    /// Clear color, depth and stencil at the start of every `render`
    pub auto_clear: bool,
    /// Root directory for file-based shader sources
    pub shader_root: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            clear_color: Vec4::new(0.07, 0.13, 0.17, 1.0),
            auto_clear: true,
            shader_root: None,
        }
    }
}

// =============================================================================
// VKSCENE - Vulkan scene renderer built around a render graph
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Editor / device_status binaries                                │
// │    └── Renderer (frame loop, MSAA switching)                    │
// │          ├── Scene (camera, static meshes, skybox)              │
// │          │     └── Pipelines built from reflected SPIR-V        │
// │          └── RenderGraph (passes, ordering, layout transitions) │
// │                └── Vulkan backend (allocator, commands, sync)   │
// └─────────────────────────────────────────────────────────────────┘
//
// The graph, reflection, scene tree, camera and asset decoding are plain
// Rust and are tested without a GPU; everything under `backend` talks to
// Vulkan through ash.
//
// =============================================================================

pub mod assets;
pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod hot_reload;
pub mod logging;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod window;

pub use config::Config;
pub use renderer::{Renderer, RendererSettings};
pub use scene::{Camera, Drawable, Scene};

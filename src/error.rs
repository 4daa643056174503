// Error types for every fallible construction path
//
// Library code never terminates the process. Each subsystem returns its own
// error enum so callers (and tests) can match on the failure; the binaries
// decide whether an error is fatal.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::graph::GraphState;

/// Failures while bringing up the instance, physical device or logical device
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(String),

    #[error("no Vulkan-capable GPU found")]
    NoDevice,

    #[error("no suitable GPU found: {}", .0.join("; "))]
    NoSuitableDevice(Vec<String>),

    #[error("GPU cannot present to the window surface")]
    PresentUnsupported,

    #[error("unsupported window system: {0}")]
    UnsupportedPlatform(String),

    #[error("swapchain is out of date")]
    OutOfDate,

    #[error("invalid application name: {0}")]
    InvalidName(#[from] std::ffi::NulError),

    #[error("Vulkan call failed: {0}")]
    Vk(#[from] vk::Result),

    #[error("failed to create the memory allocator: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),
}

/// Failures of the resource allocator and of host-side buffer access
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("GPU memory allocation for '{name}' failed: {source}")]
    OutOfMemory {
        name: String,
        #[source]
        source: gpu_allocator::AllocationError,
    },

    #[error("buffer '{0}' is not host visible")]
    NotHostVisible(String),

    #[error("write of {len} bytes exceeds the {capacity} byte buffer '{name}'")]
    Overflow { name: String, len: u64, capacity: u64 },

    #[error("image '{name}' has invalid extent {width}x{height}x{layers}")]
    InvalidExtent {
        name: String,
        width: u32,
        height: u32,
        layers: u32,
    },

    #[error("Vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
}

/// Reflection failures. The supported shader interface is deliberately narrow,
/// everything outside it is reported rather than skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReflectError {
    #[error("shader binary length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("malformed SPIR-V: {0}")]
    Parse(String),

    #[error("shader has no entry point")]
    MissingEntryPoint,

    #[error("unsupported shader stage {0}")]
    UnsupportedStage(String),

    #[error("vertex input at location {location} has unsupported type ({detail})")]
    UnsupportedInputType { location: u32, detail: String },

    #[error("vertex input variable %{0} has no location")]
    MissingLocation(u32),

    #[error("descriptor at binding {binding} uses set {set}; only set 0 is supported")]
    UnsupportedDescriptorSet { set: u32, binding: u32 },

    #[error("descriptor at binding {binding} is a {kind}, which is not supported")]
    UnsupportedDescriptor { binding: u32, kind: &'static str },

    #[error("descriptor variable %{0} has no binding number")]
    MissingBinding(u32),

    #[error("specialization constants are not supported")]
    SpecializationConstant,

    #[error("shader declares more than one push-constant block")]
    MultiplePushConstantBlocks,

    #[error("type %{0} is referenced but never declared")]
    UnknownType(u32),
}

/// Shader module loading failures
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reflect shader {path}: {source}")]
    Reflect {
        path: PathBuf,
        #[source]
        source: ReflectError,
    },

    #[error("shader {path} is a {found} shader, expected {expected}")]
    StageMismatch {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
}

/// Pipeline and pipeline-layout construction failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a {0} shader is already registered with this pipeline")]
    DuplicateStage(&'static str),

    #[error("pipeline '{0}' has no vertex shader")]
    MissingVertexShader(String),

    #[error("binding {binding} declared as {first} and as {second}")]
    BindingConflict {
        binding: u32,
        first: &'static str,
        second: &'static str,
    },

    #[error("pipeline '{0}' has not been built yet")]
    NotBuilt(String),

    #[error("reloaded shaders of '{0}' changed the pipeline layout")]
    LayoutChanged(String),

    #[error("vertex stride {reflected} of '{label}' does not match the {expected} byte vertex type")]
    VertexLayoutMismatch {
        label: String,
        reflected: u32,
        expected: u32,
    },

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("Vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
}

/// Failures while building GPU-side scene objects
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Render graph construction, compilation and execution failures
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cannot {op} while the graph is {state}")]
    InvalidState { op: &'static str, state: GraphState },

    #[error("a render pass named '{0}' already exists")]
    DuplicatePass(String),

    #[error("resource '{0}' is already declared with a different kind")]
    ResourceKindMismatch(String),

    #[error("resource '{0}' was re-declared with a different description")]
    ResourceInfoMismatch(String),

    #[error("texture '{0}' has no description and no default is set")]
    MissingResourceInfo(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("imported texture '{0}' was not re-imported this frame")]
    MissingImport(String),

    #[error("pass '{pass}' reads '{resource}' before any pass writes it")]
    ReadBeforeWrite { pass: String, resource: String },

    #[error("pass '{pass}' accesses '{resource}' which it did not declare")]
    UndeclaredAccess { pass: String, resource: String },

    #[error("pass '{pass}' uses '{resource}' as {role} but its usage flags forbid it")]
    UsageMismatch {
        pass: String,
        resource: String,
        role: &'static str,
    },

    #[error("pass '{pass}' needs '{resource}' in two different layouts")]
    LayoutConflict { pass: String, resource: String },

    #[error("dependency cycle between passes: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("backend failed to create '{name}': {source}")]
    Backend {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("pass '{pass}' failed: {source}")]
    PassFailed {
        pass: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Asset decoding failures
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to import model {path}: {source}")]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    #[error("model {0} contains no triangle meshes")]
    NoMeshes(PathBuf),

    #[error("mesh primitive in {0} has no positions")]
    MissingPositions(PathBuf),

    #[error("unsupported texture format {0}")]
    UnsupportedTextureFormat(String),

    #[error("pixel buffer of {len} bytes does not match {width}x{height}")]
    PixelCount { width: u32, height: u32, len: usize },

    #[error("cube face {face} is {found:?}, expected {expected:?}")]
    MismatchedCubeFaces {
        face: &'static str,
        expected: (u32, u32),
        found: (u32, u32),
    },
}

/// Window creation failures
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to create the event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create the window: {0}")]
    Os(#[from] winit::error::OsError),

    #[error("window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("the window was not created by the event loop")]
    NotCreated,

    #[error("failed to create a surface for the window: {0}")]
    Surface(#[from] DeviceError),
}

/// Failures while recording or presenting a frame
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

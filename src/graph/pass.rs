// Render pass declarations and the context handed to pass closures

use super::backend::RenderBackend;
use super::registry::{BufferId, Registry, ResourceKey, TextureId};
use crate::error::GraphError;
use crate::resource::{ImageLayout, TextureInfo, TextureUsage};

/// Role a pass gives one of its textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureAccess {
    Sampled,
    ColorAttachment,
    DepthAttachment,
    ResolveTarget,
    TransferSrc,
    TransferDst,
}

impl TextureAccess {
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Sampled | Self::TransferSrc)
    }

    /// Layout the texture has to be in while the pass runs
    pub fn layout(self) -> ImageLayout {
        match self {
            Self::Sampled => ImageLayout::ShaderReadOnly,
            Self::ColorAttachment | Self::ResolveTarget => ImageLayout::ColorAttachment,
            Self::DepthAttachment => ImageLayout::DepthAttachment,
            Self::TransferSrc => ImageLayout::TransferSrc,
            Self::TransferDst => ImageLayout::TransferDst,
        }
    }

    pub fn required_usage(self) -> TextureUsage {
        match self {
            Self::Sampled => TextureUsage::SAMPLED,
            Self::ColorAttachment | Self::ResolveTarget => TextureUsage::COLOR_ATTACHMENT,
            Self::DepthAttachment => TextureUsage::DEPTH_ATTACHMENT,
            Self::TransferSrc => TextureUsage::TRANSFER_SRC,
            Self::TransferDst => TextureUsage::TRANSFER_DST,
        }
    }

    pub fn role_name(self) -> &'static str {
        match self {
            Self::Sampled => "sampled texture",
            Self::ColorAttachment => "color attachment",
            Self::DepthAttachment => "depth attachment",
            Self::ResolveTarget => "resolve target",
            Self::TransferSrc => "transfer source",
            Self::TransferDst => "transfer destination",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferAccess {
    Read,
    Write,
}

/// Deferred command recording of one pass
pub type PassFn<B> = Box<dyn FnMut(&mut PassContext<'_, B>) -> anyhow::Result<()>>;

/// Footprint of a pass after names were resolved at compile time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ResolvedFootprint {
    pub textures: Vec<(TextureId, TextureAccess)>,
    pub buffers: Vec<(BufferId, BufferAccess)>,
}

impl ResolvedFootprint {
    fn declares_texture(&self, id: TextureId) -> bool {
        self.textures.iter().any(|&(t, _)| t == id)
    }

    fn writes_texture(&self, id: TextureId) -> bool {
        self.textures.iter().any(|&(t, access)| t == id && access.is_write())
    }

    fn declares_buffer(&self, id: BufferId) -> bool {
        self.buffers.iter().any(|&(b, _)| b == id)
    }

    fn writes_buffer(&self, id: BufferId) -> bool {
        self.buffers.iter().any(|&(b, access)| b == id && access == BufferAccess::Write)
    }
}

pub(crate) struct PassDecl<B: RenderBackend> {
    pub name: String,
    pub textures: Vec<(String, TextureAccess)>,
    pub buffers: Vec<(String, BufferAccess)>,
    pub execute: Option<PassFn<B>>,
    pub resolved: ResolvedFootprint,
}

impl<B: RenderBackend> PassDecl<B> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            textures: Vec::new(),
            buffers: Vec::new(),
            execute: None,
            resolved: ResolvedFootprint::default(),
        }
    }
}

/// Declares the resource footprint of a freshly added pass.
///
/// ```ignore
/// graph
///     .add_render_pass("scene")?
///     .write_color("scene_color")
///     .write_depth("scene_depth")
///     .execute(move |ctx| draw_scene(ctx));
/// ```
pub struct PassBuilder<'g, B: RenderBackend> {
    pass: &'g mut PassDecl<B>,
}

impl<'g, B: RenderBackend> PassBuilder<'g, B> {
    pub(crate) fn new(pass: &'g mut PassDecl<B>) -> Self {
        Self { pass }
    }

    fn texture(self, name: &str, access: TextureAccess) -> Self {
        self.pass.textures.push((name.to_string(), access));
        self
    }

    pub fn read_texture(self, name: &str) -> Self {
        self.texture(name, TextureAccess::Sampled)
    }

    pub fn write_color(self, name: &str) -> Self {
        self.texture(name, TextureAccess::ColorAttachment)
    }

    pub fn write_depth(self, name: &str) -> Self {
        self.texture(name, TextureAccess::DepthAttachment)
    }

    /// Multisample resolve destination of the pass
    pub fn write_resolve(self, name: &str) -> Self {
        self.texture(name, TextureAccess::ResolveTarget)
    }

    pub fn transfer_src(self, name: &str) -> Self {
        self.texture(name, TextureAccess::TransferSrc)
    }

    pub fn transfer_dst(self, name: &str) -> Self {
        self.texture(name, TextureAccess::TransferDst)
    }

    pub fn read_buffer(self, name: &str) -> Self {
        self.pass.buffers.push((name.to_string(), BufferAccess::Read));
        self
    }

    pub fn write_buffer(self, name: &str) -> Self {
        self.pass.buffers.push((name.to_string(), BufferAccess::Write));
        self
    }

    /// Set the closure that records the pass. A pass without one only
    /// contributes its layout transitions.
    pub fn execute<F>(self, f: F)
    where
        F: FnMut(&mut PassContext<'_, B>) -> anyhow::Result<()> + 'static,
    {
        self.pass.execute = Some(Box::new(f));
    }
}

/// What a pass closure sees while it records: the command context and the
/// resources of its own footprint, nothing else.
pub struct PassContext<'a, B: RenderBackend> {
    pub cmd: &'a mut B::CommandContext,
    pub(crate) pass: &'a str,
    pub(crate) footprint: &'a ResolvedFootprint,
    pub(crate) registry: &'a mut Registry<B>,
}

impl<'a, B: RenderBackend> PassContext<'a, B> {
    pub fn pass_name(&self) -> &str {
        self.pass
    }

    fn undeclared(&self, resource: &str) -> GraphError {
        GraphError::UndeclaredAccess {
            pass: self.pass.to_string(),
            resource: resource.to_string(),
        }
    }

    fn texture_id(&self, name: &str) -> Result<TextureId, GraphError> {
        match self.registry.get(name) {
            Some(ResourceKey::Texture(id)) if self.footprint.declares_texture(id) => Ok(id),
            _ => Err(self.undeclared(name)),
        }
    }

    fn buffer_id(&self, name: &str) -> Result<BufferId, GraphError> {
        match self.registry.get(name) {
            Some(ResourceKey::Buffer(id)) if self.footprint.declares_buffer(id) => Ok(id),
            _ => Err(self.undeclared(name)),
        }
    }

    pub fn texture(&self, name: &str) -> Result<&B::Texture, GraphError> {
        let id = self.texture_id(name)?;
        self.registry.textures[id]
            .resource
            .as_ref()
            .ok_or_else(|| GraphError::UnknownResource(name.to_string()))
    }

    /// Mutable access, only for textures the pass writes
    pub fn texture_mut(&mut self, name: &str) -> Result<&mut B::Texture, GraphError> {
        let id = self.texture_id(name)?;
        if !self.footprint.writes_texture(id) {
            return Err(self.undeclared(name));
        }
        self.registry.textures[id]
            .resource
            .as_mut()
            .ok_or_else(|| GraphError::UnknownResource(name.to_string()))
    }

    pub fn texture_info(&self, name: &str) -> Result<TextureInfo, GraphError> {
        let id = self.texture_id(name)?;
        self.registry.textures[id]
            .info
            .ok_or_else(|| GraphError::MissingResourceInfo(name.to_string()))
    }

    pub fn buffer(&self, name: &str) -> Result<&B::Buffer, GraphError> {
        let id = self.buffer_id(name)?;
        self.registry.buffers[id]
            .resource
            .as_ref()
            .ok_or_else(|| GraphError::UnknownResource(name.to_string()))
    }

    pub fn buffer_mut(&mut self, name: &str) -> Result<&mut B::Buffer, GraphError> {
        let id = self.buffer_id(name)?;
        if !self.footprint.writes_buffer(id) {
            return Err(self.undeclared(name));
        }
        self.registry.buffers[id]
            .resource
            .as_mut()
            .ok_or_else(|| GraphError::UnknownResource(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_roles() {
        assert!(TextureAccess::ColorAttachment.is_write());
        assert!(TextureAccess::ResolveTarget.is_write());
        assert!(TextureAccess::TransferDst.is_write());
        assert!(!TextureAccess::Sampled.is_write());
        assert!(!TextureAccess::TransferSrc.is_write());
    }

    #[test]
    fn resolve_shares_the_color_layout() {
        assert_eq!(TextureAccess::ResolveTarget.layout(), ImageLayout::ColorAttachment);
        assert_eq!(
            TextureAccess::ResolveTarget.required_usage(),
            TextureAccess::ColorAttachment.required_usage()
        );
        assert_eq!(TextureAccess::Sampled.layout(), ImageLayout::ShaderReadOnly);
    }
}

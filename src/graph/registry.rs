// Name -> resource registry of a render graph
//
// Slots outlive individual frames: a name keeps its slot (and key) until
// `release_resources`, so the compiled topology stays comparable.

use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;

use super::backend::RenderBackend;
use crate::resource::{BufferInfo, ImageLayout, TextureInfo};

new_key_type! {
    /// Stable handle of a graph texture
    pub struct TextureId;
    /// Stable handle of a graph buffer
    pub struct BufferId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Texture(TextureId),
    Buffer(BufferId),
}

pub(crate) struct TextureSlot<T> {
    pub name: String,
    pub info: Option<TextureInfo>,
    pub resource: Option<T>,
    /// Layout the texture is in as far as recorded commands are concerned
    pub layout: ImageLayout,
    pub imported: bool,
    pub final_layout: Option<ImageLayout>,
}

pub(crate) struct BufferSlot<T> {
    pub name: String,
    pub info: Option<BufferInfo>,
    pub resource: Option<T>,
}

pub(crate) struct Registry<B: RenderBackend> {
    pub textures: SlotMap<TextureId, TextureSlot<B::Texture>>,
    pub buffers: SlotMap<BufferId, BufferSlot<B::Buffer>>,
    pub names: HashMap<String, ResourceKey>,
}

impl<B: RenderBackend> Registry<B> {
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<ResourceKey> {
        self.names.get(name).copied()
    }

    pub fn declare_texture(&mut self, name: &str) -> TextureId {
        let id = self.textures.insert(TextureSlot {
            name: name.to_string(),
            info: None,
            resource: None,
            layout: ImageLayout::Undefined,
            imported: false,
            final_layout: None,
        });
        self.names.insert(name.to_string(), ResourceKey::Texture(id));
        id
    }

    pub fn declare_buffer(&mut self, name: &str) -> BufferId {
        let id = self.buffers.insert(BufferSlot {
            name: name.to_string(),
            info: None,
            resource: None,
        });
        self.names.insert(name.to_string(), ResourceKey::Buffer(id));
        id
    }

    pub fn name_of(&self, key: ResourceKey) -> String {
        match key {
            ResourceKey::Texture(id) => self.textures.get(id).map(|s| s.name.clone()),
            ResourceKey::Buffer(id) => self.buffers.get(id).map(|s| s.name.clone()),
        }
        .unwrap_or_default()
    }

    pub fn is_imported(&self, key: ResourceKey) -> bool {
        match key {
            ResourceKey::Texture(id) => self.textures.get(id).is_some_and(|s| s.imported),
            ResourceKey::Buffer(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.textures.clear();
        self.buffers.clear();
        self.names.clear();
    }
}

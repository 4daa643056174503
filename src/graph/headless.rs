// CPU-only render graph backend
//
// Textures and buffers are plain byte vectors and the command context is a
// text log, which makes graph behavior observable without a GPU.

use thiserror::Error;

use super::backend::RenderBackend;
use crate::resource::{BufferInfo, ImageLayout, TextureInfo};

#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error("cannot create zero-sized resource '{0}'")]
    ZeroSized(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessTexture {
    pub name: String,
    pub info: TextureInfo,
    pub bytes: Vec<u8>,
}

impl HeadlessTexture {
    /// Zero-filled texture, e.g. to import as an external target
    pub fn new(name: &str, info: TextureInfo) -> Self {
        Self {
            name: name.to_string(),
            info,
            bytes: vec![0; info.byte_size() as usize],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessBuffer {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Recorded commands, one line each
#[derive(Debug, Default)]
pub struct CommandLog {
    pub entries: Vec<String>,
}

impl CommandLog {
    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Position of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    pub textures_created: usize,
    pub buffers_created: usize,
}

impl RenderBackend for HeadlessBackend {
    type Texture = HeadlessTexture;
    type Buffer = HeadlessBuffer;
    type CommandContext = CommandLog;
    type Error = HeadlessError;

    fn create_texture(&mut self, name: &str, info: &TextureInfo) -> Result<HeadlessTexture, HeadlessError> {
        if info.byte_size() == 0 {
            return Err(HeadlessError::ZeroSized(name.to_string()));
        }
        self.textures_created += 1;
        Ok(HeadlessTexture::new(name, *info))
    }

    fn create_buffer(&mut self, name: &str, info: &BufferInfo) -> Result<HeadlessBuffer, HeadlessError> {
        if info.size == 0 {
            return Err(HeadlessError::ZeroSized(name.to_string()));
        }
        self.buffers_created += 1;
        Ok(HeadlessBuffer {
            name: name.to_string(),
            bytes: vec![0; info.size as usize],
        })
    }

    fn transition_texture(
        &mut self,
        cmd: &mut CommandLog,
        texture: &HeadlessTexture,
        _info: &TextureInfo,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        cmd.push(format!("transition {} {} -> {}", texture.name, from, to));
    }
}

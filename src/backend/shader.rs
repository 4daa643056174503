// Shader module loading
//
// Vulkan consumes SPIR-V. A `ShaderModule` keeps the path it was loaded from
// so pipelines can re-read it on hot reload, and the reflection of its
// interface so pipeline layouts never have to be written by hand.

use ash::vk;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::reflect::{self, ShaderReflection, ShaderStage};
use super::VulkanDevice;
use crate::error::ShaderError;

pub struct ShaderModule {
    pub handle: vk::ShaderModule,
    pub reflection: ShaderReflection,
    path: PathBuf,
    device: Arc<VulkanDevice>,
}

/// Read and reflect a SPIR-V file without touching the GPU
pub fn read_spirv(path: &Path, stage: ShaderStage) -> Result<(Vec<u32>, ShaderReflection), ShaderError> {
    let bytes = std::fs::read(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reflection = reflect::reflect_bytes(&bytes).map_err(|source| ShaderError::Reflect {
        path: path.to_path_buf(),
        source,
    })?;
    if reflection.stage != stage {
        return Err(ShaderError::StageMismatch {
            path: path.to_path_buf(),
            expected: stage.name(),
            found: reflection.stage.name(),
        });
    }

    // read_spv handles alignment of the byte buffer for us
    let words = ash::util::read_spv(&mut std::io::Cursor::new(&bytes)).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((words, reflection))
}

impl ShaderModule {
    /// Load a compiled shader of the given stage from disk
    pub fn build(device: &Arc<VulkanDevice>, stage: ShaderStage, path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let (words, reflection) = read_spirv(path, stage)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let handle = unsafe { device.device.create_shader_module(&create_info, None) }?;
        log::debug!("Loaded {} shader {}", stage.name(), path.display());

        Ok(Self {
            handle,
            reflection,
            path: path.to_path_buf(),
            device: device.clone(),
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.reflection.stage
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the same file again, e.g. after it was recompiled
    pub fn reload(&self) -> Result<Self, ShaderError> {
        Self::build(&self.device, self.stage(), &self.path)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.handle, None) };
    }
}

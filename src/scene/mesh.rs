// Static mesh - geometry, diffuse texture and a dedicated pipeline
//
// Everything is uploaded once at build time. Only the pipeline is ever
// rebuilt, when the render target changes (e.g. a new MSAA sample count).

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::{BuildContext, DrawCall, PushConstants, ShaderPaths};
use crate::assets::{ImageData, MeshData, Vertex};
use crate::backend::reflect::ShaderStage;
use crate::backend::{
    Buffer, DescriptorPool, DescriptorSet, Image, Pipeline, RenderTarget, Sampler, ShaderModule,
};
use crate::error::{BuildError, PipelineError};
use crate::resource::BufferUsage;

const MATERIAL_BINDING: u32 = 0;
const DIFFUSE_BINDING: u32 = 1;

/// Per-material constants at binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
}

pub struct StaticMesh {
    name: String,
    /// Transform baked in by the asset, applied before the node transform
    pub model: Mat4,
    index_count: u32,
    // Field order is drop order: the set and pool go before the resources
    // they reference
    descriptor_set: DescriptorSet,
    _descriptor_pool: DescriptorPool,
    pipeline: Pipeline,
    _material: Buffer,
    _sampler: Sampler,
    _texture: Image,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
}

impl StaticMesh {
    pub fn build(
        ctx: &BuildContext<'_>,
        name: &str,
        mesh: &MeshData,
        shaders: &ShaderPaths,
        target: &RenderTarget,
    ) -> Result<Self, BuildError> {
        // Vertex and index data
        let mut vertex_buffer = ctx.allocator.allocate_buffer(
            &format!("{name} vertices"),
            BufferUsage::VERTEX,
            std::mem::size_of_val(mesh.vertices.as_slice()) as u64,
        )?;
        vertex_buffer.fill_pod(&mesh.vertices)?;
        let mut index_buffer = ctx.allocator.allocate_buffer(
            &format!("{name} indices"),
            BufferUsage::INDEX,
            std::mem::size_of_val(mesh.indices.as_slice()) as u64,
        )?;
        index_buffer.fill_pod(&mesh.indices)?;

        // Diffuse texture, white when the asset has none
        let white = ImageData::solid(1, 1, [255; 4]);
        let diffuse = mesh.base_color.as_ref().unwrap_or(&white);
        let texture = ctx.upload_texture(&format!("{name} diffuse"), &[diffuse], true)?;
        let sampler = Sampler::new(ctx.device, texture.info.mip_levels, vk::SamplerAddressMode::REPEAT)?;

        let mut material = ctx.allocator.allocate_buffer(
            &format!("{name} material"),
            BufferUsage::UNIFORM,
            std::mem::size_of::<MaterialUniform>() as u64,
        )?;
        material.fill_pod(&[MaterialUniform { base_color: [1.0; 4] }])?;

        // Pipeline and its descriptor set
        let mut pipeline = Pipeline::new(ctx.device, name);
        pipeline.add_shader(ShaderModule::build(ctx.device, ShaderStage::Vertex, &shaders.vertex)?)?;
        pipeline.add_shader(ShaderModule::build(ctx.device, ShaderStage::Fragment, &shaders.fragment)?)?;
        pipeline.expect_vertex_stride(Vertex::STRIDE)?;
        pipeline.build(target)?;

        let layout = pipeline.layout_desc()?;
        let descriptor_pool = DescriptorPool::for_layout(ctx.device, &layout, 1)?;
        let descriptor_set = descriptor_pool.allocate(pipeline.set_layout())?;
        descriptor_set.write_uniform_buffer(MATERIAL_BINDING, &material);
        descriptor_set.write_image_sampler(DIFFUSE_BINDING, &texture, &sampler);

        log::info!(
            "Built static mesh '{}': {} vertices, {} indices",
            name,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(Self {
            name: name.to_string(),
            model: mesh.transform,
            index_count: mesh.indices.len() as u32,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            pipeline,
            _material: material,
            _sampler: sampler,
            _texture: texture,
            vertex_buffer,
            index_buffer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rebuild only the pipeline for a new target; buffers, texture and
    /// descriptor set are kept
    pub fn update_material(&mut self, target: &RenderTarget) -> Result<(), PipelineError> {
        self.pipeline.update(target)
    }

    pub fn reload_shaders(&mut self) -> Result<(), PipelineError> {
        self.pipeline.reload_shaders()
    }

    pub fn draw_call(&self, view_proj: Mat4, world: Mat4) -> Result<DrawCall, PipelineError> {
        Ok(DrawCall {
            pipeline: self.pipeline.handle()?,
            layout: self.pipeline.layout(),
            push_stages: self.pipeline.push_constant_stages(),
            descriptor_set: self.descriptor_set.handle,
            geometry: Some((self.vertex_buffer.handle, self.index_buffer.handle)),
            count: self.index_count,
            push_constants: PushConstants {
                view_proj,
                model: world * self.model,
            },
        })
    }
}

// Skybox - cube map drawn behind everything else
//
// The cube is generated in the vertex shader from the vertex index, so there
// is no vertex buffer. Depth test and write are off and the skybox is drawn
// first; later geometry simply covers it.

use ash::vk;
use glam::Mat4;

use super::{BuildContext, DrawCall, PushConstants, ShaderPaths};
use crate::assets::ImageData;
use crate::backend::reflect::ShaderStage;
use crate::backend::{DescriptorPool, DescriptorSet, Image, Pipeline, RenderTarget, Sampler, ShaderModule};
use crate::error::{BuildError, PipelineError};

const CUBE_BINDING: u32 = 0;
const CUBE_VERTICES: u32 = 36;

pub struct Skybox {
    descriptor_set: DescriptorSet,
    _descriptor_pool: DescriptorPool,
    pipeline: Pipeline,
    _sampler: Sampler,
    _cube: Image,
}

impl Skybox {
    /// `faces` in cube-map order: +X, -X, +Y, -Y, +Z, -Z
    pub fn build(
        ctx: &BuildContext<'_>,
        faces: &[ImageData; 6],
        shaders: &ShaderPaths,
        target: &RenderTarget,
    ) -> Result<Self, BuildError> {
        let layers: Vec<&ImageData> = faces.iter().collect();
        let cube = ctx.upload_texture("skybox", &layers, false)?;
        let sampler = Sampler::new(ctx.device, 1, vk::SamplerAddressMode::CLAMP_TO_EDGE)?;

        let mut pipeline = Pipeline::new(ctx.device, "skybox");
        pipeline.add_shader(ShaderModule::build(ctx.device, ShaderStage::Vertex, &shaders.vertex)?)?;
        pipeline.add_shader(ShaderModule::build(ctx.device, ShaderStage::Fragment, &shaders.fragment)?)?;
        {
            let config = pipeline.config_mut();
            config.depth_test = false;
            config.depth_write = false;
            config.cull_mode = vk::CullModeFlags::NONE;
        }
        pipeline.build(target)?;

        let layout = pipeline.layout_desc()?;
        let descriptor_pool = DescriptorPool::for_layout(ctx.device, &layout, 1)?;
        let descriptor_set = descriptor_pool.allocate(pipeline.set_layout())?;
        descriptor_set.write_image_sampler(CUBE_BINDING, &cube, &sampler);

        log::info!("Built skybox ({}x{} faces)", faces[0].width, faces[0].height);
        Ok(Self {
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            pipeline,
            _sampler: sampler,
            _cube: cube,
        })
    }

    pub fn update_material(&mut self, target: &RenderTarget) -> Result<(), PipelineError> {
        self.pipeline.update(target)
    }

    pub fn reload_shaders(&mut self) -> Result<(), PipelineError> {
        self.pipeline.reload_shaders()
    }

    /// The camera translation is dropped so the sky stays at infinity
    pub fn draw_call(&self, view: Mat4, projection: Mat4) -> Result<DrawCall, PipelineError> {
        let rotation_only = Mat4::from_mat3(glam::Mat3::from_mat4(view));
        Ok(DrawCall {
            pipeline: self.pipeline.handle()?,
            layout: self.pipeline.layout(),
            push_stages: self.pipeline.push_constant_stages(),
            descriptor_set: self.descriptor_set.handle,
            geometry: None,
            count: CUBE_VERTICES,
            push_constants: PushConstants {
                view_proj: projection * rotation_only,
                model: Mat4::IDENTITY,
            },
        })
    }
}

// Graphics pipeline creation and management
//
// The layout (descriptor set layout + push constants + vertex input) is derived
// from shader reflection. Pipelines target dynamic rendering, so instead of a
// render pass they are built against a `RenderTarget` describing the
// attachment formats and sample count.

use ash::vk;
use std::sync::Arc;

use super::convert;
use super::reflect::{DescriptorKind, ShaderReflection, ShaderStage, VertexInput};
use super::shader::ShaderModule;
use super::VulkanDevice;
use crate::error::PipelineError;
use crate::resource::TextureFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: vk::ShaderStageFlags,
}

/// Merged interface of every stage of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLayoutDesc {
    stages: Vec<ShaderStage>,
    bindings: Vec<LayoutBinding>,
    push_constant_size: u32,
    push_constant_stages: vk::ShaderStageFlags,
    vertex_inputs: Vec<VertexInput>,
    vertex_stride: u32,
}

impl PipelineLayoutDesc {
    pub fn add_shader(&mut self, reflection: &ShaderReflection) -> Result<(), PipelineError> {
        if self.stages.contains(&reflection.stage) {
            return Err(PipelineError::DuplicateStage(reflection.stage.name()));
        }

        // Validate every binding before touching self
        for incoming in &reflection.bindings {
            if let Some(existing) = self.bindings.iter().find(|b| b.binding == incoming.binding) {
                if existing.kind != incoming.kind {
                    return Err(PipelineError::BindingConflict {
                        binding: incoming.binding,
                        first: existing.kind.name(),
                        second: incoming.kind.name(),
                    });
                }
            }
        }

        let flags = reflection.stage.vk_flags();
        for incoming in &reflection.bindings {
            match self.bindings.iter_mut().find(|b| b.binding == incoming.binding) {
                Some(existing) => existing.stages |= flags,
                None => self.bindings.push(LayoutBinding {
                    binding: incoming.binding,
                    kind: incoming.kind,
                    stages: flags,
                }),
            }
        }
        self.bindings.sort_by_key(|b| b.binding);

        if reflection.push_constant_size > 0 {
            self.push_constant_size = self.push_constant_size.max(reflection.push_constant_size);
            self.push_constant_stages |= flags;
        }
        if reflection.stage == ShaderStage::Vertex {
            self.vertex_inputs = reflection.vertex_inputs.clone();
            self.vertex_stride = reflection.vertex_stride;
        }
        self.stages.push(reflection.stage);
        Ok(())
    }

    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constant_stages
    }

    pub fn vertex_inputs(&self) -> &[VertexInput] {
        &self.vertex_inputs
    }

    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    fn vertex_descriptions(&self) -> (Vec<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>) {
        if self.vertex_inputs.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let binding = vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(self.vertex_stride)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build();
        let attributes = self
            .vertex_inputs
            .iter()
            .map(|input| {
                vk::VertexInputAttributeDescription::builder()
                    .binding(0)
                    .location(input.location)
                    .format(input.format.vk_format())
                    .offset(input.offset)
                    .build()
            })
            .collect();
        (vec![binding], attributes)
    }
}

/// Fixed-function state that is not derived from shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub blend: bool,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            blend: false,
            depth_test: true,
            depth_write: true,
        }
    }
}

/// Attachment formats and sample count a pipeline renders into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub samples: u32,
}

impl RenderTarget {
    pub fn new(color: TextureFormat, depth: Option<TextureFormat>, samples: u32) -> Self {
        Self {
            color_formats: vec![color],
            depth_format: depth,
            samples,
        }
    }
}

pub struct Pipeline {
    label: String,
    device: Arc<VulkanDevice>,
    shaders: Vec<ShaderModule>,
    config: PipelineConfig,
    /// Layout the native handles below were created from
    built_layout: Option<PipelineLayoutDesc>,
    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
    handle: vk::Pipeline,
    target: Option<RenderTarget>,
}

impl Pipeline {
    pub fn new(device: &Arc<VulkanDevice>, label: &str) -> Self {
        Self {
            label: label.to_string(),
            device: device.clone(),
            shaders: Vec::new(),
            config: PipelineConfig::default(),
            built_layout: None,
            set_layout: vk::DescriptorSetLayout::null(),
            layout: vk::PipelineLayout::null(),
            handle: vk::Pipeline::null(),
            target: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn add_shader(&mut self, shader: ShaderModule) -> Result<(), PipelineError> {
        if self.shaders.iter().any(|s| s.stage() == shader.stage()) {
            return Err(PipelineError::DuplicateStage(shader.stage().name()));
        }
        // Surface binding conflicts now rather than at build time
        let mut desc = self.layout_desc()?;
        desc.add_shader(&shader.reflection)?;
        self.shaders.push(shader);
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Changes take effect on the next `build` or `update`
    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    /// Merged interface of the registered shaders
    pub fn layout_desc(&self) -> Result<PipelineLayoutDesc, PipelineError> {
        merge_layout(self.shaders.iter().map(|s| &s.reflection))
    }

    pub fn is_built(&self) -> bool {
        self.handle != vk::Pipeline::null()
    }

    pub fn handle(&self) -> Result<vk::Pipeline, PipelineError> {
        if !self.is_built() {
            return Err(PipelineError::NotBuilt(self.label.clone()));
        }
        Ok(self.handle)
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.built_layout
            .as_ref()
            .map_or(vk::ShaderStageFlags::empty(), |desc| desc.push_constant_stages())
    }

    /// Fails with `VertexLayoutMismatch` when the vertex shader's inputs do not
    /// add up to the CPU vertex type
    pub fn expect_vertex_stride(&self, expected: u32) -> Result<(), PipelineError> {
        let desc = self.layout_desc()?;
        check_vertex_stride(&self.label, &desc, expected)
    }

    /// Create the layout (first call only) and the native pipeline
    pub fn build(&mut self, target: &RenderTarget) -> Result<(), PipelineError> {
        let desc = self.layout_desc()?;
        if !desc.has_stage(ShaderStage::Vertex) {
            return Err(PipelineError::MissingVertexShader(self.label.clone()));
        }
        if self.built_layout.is_none() {
            self.create_layout(&desc)?;
            self.built_layout = Some(desc);
        }
        self.destroy_pipeline();
        self.handle = self.create_pipeline(target)?;
        self.target = Some(target.clone());
        log::debug!("Built pipeline '{}' for {} sample(s)", self.label, target.samples);
        Ok(())
    }

    /// Rebuild only the native pipeline for a new target. The caller makes
    /// sure the GPU no longer uses the old one.
    pub fn update(&mut self, target: &RenderTarget) -> Result<(), PipelineError> {
        if self.built_layout.is_none() {
            return Err(PipelineError::NotBuilt(self.label.clone()));
        }
        self.build(target)
    }

    /// Re-read every shader from disk and rebuild the native pipeline. A change
    /// to the layout is rejected and the old shaders stay in use.
    pub fn reload_shaders(&mut self) -> Result<(), PipelineError> {
        let reloaded = self
            .shaders
            .iter()
            .map(|shader| shader.reload())
            .collect::<Result<Vec<_>, _>>()?;
        let desc = merge_layout(reloaded.iter().map(|s| &s.reflection))?;
        if let Some(built) = &self.built_layout {
            if *built != desc {
                return Err(PipelineError::LayoutChanged(self.label.clone()));
            }
        }

        self.shaders = reloaded;
        if let Some(target) = self.target.clone() {
            self.destroy_pipeline();
            self.handle = self.create_pipeline(&target)?;
        }
        log::info!("Reloaded shaders of '{}'", self.label);
        Ok(())
    }

    fn create_layout(&mut self, desc: &PipelineLayoutDesc) -> Result<(), PipelineError> {
        let bindings: Vec<_> = desc
            .bindings()
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(b.binding)
                    .descriptor_type(b.kind.vk_type())
                    .descriptor_count(1)
                    .stage_flags(b.stages)
                    .build()
            })
            .collect();
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        self.set_layout = unsafe {
            self.device
                .device
                .create_descriptor_set_layout(&set_layout_info, None)
        }?;

        let push_constant_ranges: Vec<_> = if desc.push_constant_size() > 0 {
            vec![vk::PushConstantRange::builder()
                .stage_flags(desc.push_constant_stages())
                .offset(0)
                .size(desc.push_constant_size())
                .build()]
        } else {
            Vec::new()
        };
        let set_layouts = [self.set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        self.layout = unsafe { self.device.device.create_pipeline_layout(&layout_info, None) }?;
        Ok(())
    }

    fn create_pipeline(&self, target: &RenderTarget) -> Result<vk::Pipeline, PipelineError> {
        let desc = self
            .built_layout
            .as_ref()
            .ok_or_else(|| PipelineError::NotBuilt(self.label.clone()))?;

        // Shader stages
        let entry_point = c"main";
        let shader_stages: Vec<_> = self
            .shaders
            .iter()
            .map(|shader| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(shader.stage().vk_flags())
                    .module(shader.handle)
                    .name(entry_point)
                    .build()
            })
            .collect();

        // Vertex input
        let (bindings, attributes) = desc.vertex_descriptions();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.config.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.config.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(convert::sample_count(target.samples));

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.config.depth_test)
            .depth_write_enable(self.config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(self.config.blend)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();
        let color_blend_attachments = vec![color_blend_attachment; target.color_formats.len()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        // Dynamic rendering: formats instead of a render pass
        let color_formats: Vec<_> = target.color_formats.iter().map(|&f| convert::format(f)).collect();
        let depth_format = target.depth_format.map_or(vk::Format::UNDEFINED, convert::format);
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .push_next(&mut rendering_info)
            .build();

        let pipelines = unsafe {
            self.device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)
        }?;
        pipelines
            .first()
            .copied()
            .ok_or_else(|| PipelineError::NotBuilt(self.label.clone()))
    }

    fn destroy_pipeline(&mut self) {
        if self.handle != vk::Pipeline::null() {
            unsafe { self.device.device.destroy_pipeline(self.handle, None) };
            self.handle = vk::Pipeline::null();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.destroy_pipeline();
        unsafe {
            if self.layout != vk::PipelineLayout::null() {
                self.device.device.destroy_pipeline_layout(self.layout, None);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                self.device.device.destroy_descriptor_set_layout(self.set_layout, None);
            }
        }
    }
}

pub fn merge_layout<'a>(
    reflections: impl IntoIterator<Item = &'a ShaderReflection>,
) -> Result<PipelineLayoutDesc, PipelineError> {
    let mut desc = PipelineLayoutDesc::default();
    for reflection in reflections {
        desc.add_shader(reflection)?;
    }
    Ok(desc)
}

pub fn check_vertex_stride(label: &str, desc: &PipelineLayoutDesc, expected: u32) -> Result<(), PipelineError> {
    if desc.vertex_stride() != expected {
        return Err(PipelineError::VertexLayoutMismatch {
            label: label.to_string(),
            reflected: desc.vertex_stride(),
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::reflect::{DescriptorBinding, VertexFormat};

    fn stage(stage: ShaderStage, push_constant_size: u32, bindings: &[(u32, DescriptorKind)]) -> ShaderReflection {
        ShaderReflection {
            stage,
            vertex_inputs: Vec::new(),
            vertex_stride: 0,
            bindings: bindings
                .iter()
                .map(|&(binding, kind)| DescriptorBinding { binding, kind })
                .collect(),
            push_constant_size,
        }
    }

    #[test]
    fn push_constant_size_is_the_largest_block() {
        let desc = merge_layout(&[
            stage(ShaderStage::Vertex, 16, &[]),
            stage(ShaderStage::Fragment, 32, &[]),
        ])
        .unwrap();
        assert_eq!(desc.push_constant_size(), 32);
        assert_eq!(
            desc.push_constant_stages(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn shared_binding_is_merged_once() {
        let desc = merge_layout(&[
            stage(ShaderStage::Vertex, 0, &[(0, DescriptorKind::UniformBuffer)]),
            stage(
                ShaderStage::Fragment,
                0,
                &[
                    (1, DescriptorKind::CombinedImageSampler),
                    (0, DescriptorKind::UniformBuffer),
                ],
            ),
        ])
        .unwrap();
        assert_eq!(
            desc.bindings(),
            &[
                LayoutBinding {
                    binding: 0,
                    kind: DescriptorKind::UniformBuffer,
                    stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                },
                LayoutBinding {
                    binding: 1,
                    kind: DescriptorKind::CombinedImageSampler,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                },
            ]
        );
    }

    #[test]
    fn conflicting_binding_kinds_are_rejected() {
        let err = merge_layout(&[
            stage(ShaderStage::Vertex, 0, &[(0, DescriptorKind::UniformBuffer)]),
            stage(ShaderStage::Fragment, 0, &[(0, DescriptorKind::CombinedImageSampler)]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BindingConflict {
                binding: 0,
                first: "uniform buffer",
                second: "combined image sampler"
            }
        ));
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let mut desc = PipelineLayoutDesc::default();
        desc.add_shader(&stage(ShaderStage::Fragment, 0, &[])).unwrap();
        let err = desc.add_shader(&stage(ShaderStage::Fragment, 0, &[])).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStage("fragment")));
    }

    #[test]
    fn failed_merge_leaves_layout_untouched() {
        let mut desc = PipelineLayoutDesc::default();
        desc.add_shader(&stage(ShaderStage::Vertex, 0, &[(0, DescriptorKind::UniformBuffer)]))
            .unwrap();
        let before = desc.clone();
        let conflicting = stage(
            ShaderStage::Fragment,
            0,
            &[
                (1, DescriptorKind::UniformBuffer),
                (0, DescriptorKind::CombinedImageSampler),
            ],
        );
        assert!(desc.add_shader(&conflicting).is_err());
        assert_eq!(desc, before);
    }

    #[test]
    fn vertex_layout_comes_from_vertex_stage() {
        let mut vertex = stage(ShaderStage::Vertex, 0, &[]);
        vertex.vertex_inputs = vec![
            VertexInput {
                location: 0,
                format: VertexFormat::Vec3,
                offset: 0,
            },
            VertexInput {
                location: 1,
                format: VertexFormat::Vec2,
                offset: 12,
            },
        ];
        vertex.vertex_stride = 20;
        let desc = merge_layout(&[vertex, stage(ShaderStage::Fragment, 0, &[])]).unwrap();

        let (bindings, attributes) = desc.vertex_descriptions();
        assert_eq!(bindings[0].stride, 20);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);

        assert!(check_vertex_stride("mesh", &desc, 20).is_ok());
        let err = check_vertex_stride("mesh", &desc, 48).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::VertexLayoutMismatch {
                reflected: 20,
                expected: 48,
                ..
            }
        ));
    }

    #[test]
    fn default_config_matches_opaque_geometry() {
        let config = PipelineConfig::default();
        assert_eq!(config.cull_mode, vk::CullModeFlags::BACK);
        assert!(config.depth_test && config.depth_write && !config.blend);
    }
}

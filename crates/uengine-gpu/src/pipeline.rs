//! Shader modules and render-pass based graphics pipelines.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::Owned;
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Read a whole file into memory.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| GpuError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reinterpret SPIR-V bytes as aligned words.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| GpuError::ShaderModule(e.to_string()))
}

/// Create a shader module from SPIR-V words.
pub fn create_shader_module(ctx: &Arc<GpuContext>, code: &[u32]) -> Result<Owned<vk::ShaderModule>> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { ctx.device().create_shader_module(&info, None) }
        .map_err(|e| GpuError::ShaderModule(e.to_string()))?;
    // SAFETY: just created from this device.
    Ok(unsafe { Owned::from_raw(ctx.clone(), module) })
}

/// Create a pipeline layout.
pub fn create_pipeline_layout(
    ctx: &Arc<GpuContext>,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<Owned<vk::PipelineLayout>> {
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);
    let layout = unsafe { ctx.device().create_pipeline_layout(&info, None) }
        .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;
    // SAFETY: just created from this device.
    Ok(unsafe { Owned::from_raw(ctx.clone(), layout) })
}

/// Graphics pipeline description.
#[derive(Clone)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    /// `LINE` needs the `fill_mode_non_solid` feature, which bootstrap enables.
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    /// Standard alpha blending on the single color attachment.
    pub alpha_blend: bool,
    pub subpass: u32,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            alpha_blend: true,
            subpass: 0,
        }
    }
}

impl GraphicsPipelineDesc {
    /// Load both shader stages from SPIR-V files.
    pub fn with_shader_files(
        mut self,
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<Self> {
        self.vertex_shader = spirv_words(&read_file(vertex)?)?;
        self.fragment_shader = spirv_words(&read_file(fragment)?)?;
        Ok(self)
    }

    /// Blend state for the color attachment.
    pub fn blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        if self.alpha_blend {
            state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
        } else {
            state.blend_enable(false)
        }
    }
}

/// A graphics pipeline and its layout.
pub struct GraphicsPipeline {
    pipeline: Owned<vk::Pipeline>,
    layout: Owned<vk::PipelineLayout>,
}

impl GraphicsPipeline {
    /// Create a pipeline for `render_pass` with dynamic viewport and scissor.
    pub fn new(
        ctx: &Arc<GpuContext>,
        desc: &GraphicsPipelineDesc,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        // Modules are only needed until the pipeline exists.
        let vert_module = create_shader_module(ctx, &desc.vertex_shader)?;
        let frag_module = create_shader_module(ctx, &desc.fragment_shader)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module.raw())
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module.raw())
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(desc.polygon_mode)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let color_blend_attachments = [desc.blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout = create_pipeline_layout(ctx, set_layouts, push_constant_ranges)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.raw())
            .render_pass(render_pass)
            .subpass(desc.subpass);

        let pipelines = unsafe {
            ctx.device()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".into()))?;

        Ok(Self {
            // SAFETY: just created from this device.
            pipeline: unsafe { Owned::from_raw(ctx.clone(), pipeline) },
            layout,
        })
    }

    /// Raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.raw()
    }

    /// Raw layout handle.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.raw()
    }
}

/// Full-target viewport with depth range `0..1`.
pub fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole target.
pub fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn spirv_words_require_word_alignment() {
        let bytes = 0x0723_0203_u32.to_le_bytes();
        assert_eq!(spirv_words(&bytes).unwrap(), vec![0x0723_0203]);
        assert!(matches!(
            spirv_words(&bytes[..3]),
            Err(GpuError::ShaderModule(_))
        ));
    }

    #[test]
    fn read_file_returns_contents_and_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"shader").unwrap();
        assert_eq!(read_file(file.path()).unwrap(), b"shader");

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("quad.vert.spv");
        match read_file(&missing) {
            Err(GpuError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn default_desc_blends_alpha_without_culling() {
        let desc = GraphicsPipelineDesc::default();
        assert_eq!(desc.cull_mode, vk::CullModeFlags::NONE);
        let blend = desc.blend_attachment();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);

        let opaque = GraphicsPipelineDesc {
            alpha_blend: false,
            ..GraphicsPipelineDesc::default()
        };
        assert_eq!(opaque.blend_attachment().blend_enable, vk::FALSE);
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 1200,
            height: 600,
        };
        let vp = viewport(extent);
        assert_relative_eq!(vp.width, 1200.0);
        assert_relative_eq!(vp.height, 600.0);
        assert_relative_eq!(vp.max_depth, 1.0);
        assert_eq!(scissor(extent).extent, extent);
    }
}

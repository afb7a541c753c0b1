//! Shader loading and graphics pipeline creation
//!
//! Every pipeline shares one fixed-function recipe: triangle lists, back-face
//! culling with counter-clockwise front faces, depth test and write with LESS,
//! no blending, and dynamic viewport, scissor and depth bias. [`PipelineOptions`]
//! is the only way to deviate from it.

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use crate::render::backends::vulkan::{
    VulkanError, VulkanResult, MODEL_PUSH_CONSTANT_OFFSET, MODEL_PUSH_CONSTANT_SIZE,
    TEXTURE_INDEX_PUSH_CONSTANT_OFFSET, TEXTURE_INDEX_PUSH_CONSTANT_SIZE,
};
use crate::render::primitives::mesh::Vertex;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V words
    pub fn from_words(device: Device, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, module })
    }

    /// Load a SPIR-V file
    pub fn from_file(device: Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let shader_load = |source| VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        };

        let bytes = std::fs::read(path).map_err(shader_load)?;
        let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(shader_load)?;

        log::debug!("Loaded shader {} ({} words)", path.display(), words.len());
        Self::from_words(device, &words)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage description using the `main` entry point
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Push constant ranges reserved by every pipeline layout
pub fn push_constant_ranges() -> [vk::PushConstantRange; 2] {
    [
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: MODEL_PUSH_CONSTANT_OFFSET,
            size: MODEL_PUSH_CONSTANT_SIZE,
        },
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: TEXTURE_INDEX_PUSH_CONSTANT_OFFSET,
            size: TEXTURE_INDEX_PUSH_CONSTANT_SIZE,
        },
    ]
}

/// Dynamic state shared by every pipeline
pub const DYNAMIC_STATES: [vk::DynamicState; 3] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::DEPTH_BIAS,
];

/// Overrides of the fixed pipeline recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
    /// Test fragments against the depth buffer
    pub depth_test: bool,
    /// Write passing fragments to the depth buffer
    pub depth_write: bool,
    /// Apply the dynamic depth bias
    pub depth_bias: bool,
    /// Whether the subpass has a color attachment
    pub color_attachment: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::BACK,
            depth_test: true,
            depth_write: true,
            depth_bias: false,
            color_attachment: true,
        }
    }
}

impl PipelineOptions {
    /// Depth-only rendering with bias, for the shadow pass
    pub fn shadow() -> Self {
        Self {
            depth_bias: true,
            color_attachment: false,
            ..Self::default()
        }
    }

    /// Overlay quad drawn over the scene
    pub fn overlay() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            ..Self::default()
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build a pipeline from two SPIR-V files
    pub fn from_files(
        device: &Device,
        vertex_path: &Path,
        fragment_path: &Path,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        options: PipelineOptions,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_file(device.clone(), vertex_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), fragment_path)?;
        Self::new(device, &vertex_shader, &fragment_shader, render_pass, set_layouts, options)
    }

    /// Build a pipeline from loaded shader modules
    pub fn new(
        device: &Device,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        options: PipelineOptions,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(options.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(options.depth_bias);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(options.depth_test)
            .depth_write_enable(options.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let blend_attachments: &[vk::PipelineColorBlendAttachmentState] = if options.color_attachment {
            &color_blend_attachments
        } else {
            &[]
        };
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(blend_attachments);

        let push_constant_ranges = push_constant_ranges();
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };

        let pipeline = match pipelines {
            Ok(pipelines) => pipelines.first().copied().unwrap_or_default(),
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_ranges_are_adjacent_and_disjoint() {
        let [model, textures] = push_constant_ranges();

        assert_eq!(model.offset, 0);
        assert_eq!(model.size, 64);
        assert_eq!(model.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(textures.offset, model.offset + model.size);
        assert_eq!(textures.size, 9 * 4);
        assert_eq!(textures.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn default_recipe_culls_back_faces_with_depth() {
        let options = PipelineOptions::default();

        assert_eq!(options.cull_mode, vk::CullModeFlags::BACK);
        assert!(options.depth_test && options.depth_write);
        assert!(!options.depth_bias);
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::DEPTH_BIAS));
    }

    #[test]
    fn shadow_recipe_is_depth_only_with_bias() {
        let options = PipelineOptions::shadow();

        assert!(options.depth_bias);
        assert!(!options.color_attachment);
        assert!(options.depth_write);
    }

    #[test]
    fn missing_shader_reports_its_path() {
        let path = Path::new("definitely/not/here.spv");
        let error = std::fs::read(path)
            .map_err(|source| VulkanError::ShaderLoad {
                path: path.to_path_buf(),
                source,
            })
            .expect_err("file does not exist");

        assert!(error.to_string().contains("definitely/not/here.spv"));
    }
}

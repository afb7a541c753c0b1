//! Command recording, render passes and pipelines

pub mod commands;
pub mod recorder;
pub mod render_pass;
pub mod shader;

pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use recorder::PassRecorder;
pub use render_pass::RenderPass;
pub use shader::{GraphicsPipeline, PipelineOptions, ShaderModule};

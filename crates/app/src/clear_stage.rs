//! Composite stage that clears the acquired image.

use std::sync::Arc;

use ash::vk;
use frameloop_renderer::{FrameContext, RenderStage, StageResult};
use frameloop_rhi::command::CommandBuffer;
use frameloop_rhi::device::Device;

/// Clears the surface image to a solid color inside the surface's render
/// pass, which also moves the image into the present layout.
pub struct ClearStage {
    device: Arc<Device>,
    clear_values: [vk::ClearValue; 1],
}

impl ClearStage {
    pub fn new(device: Arc<Device>, color: [f32; 4]) -> Self {
        Self {
            device,
            clear_values: [vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            }],
        }
    }
}

impl RenderStage for ClearStage {
    fn name(&self) -> &str {
        "clear"
    }

    fn record(&mut self, frame: &FrameContext) -> StageResult {
        let cmd = CommandBuffer::from_handle(self.device.clone(), frame.command_buffer);
        cmd.begin_render_pass(
            frame.target.render_pass,
            frame.target.framebuffer,
            frame.target.extent,
            &self.clear_values,
        );
        cmd.end_render_pass();
        Ok(())
    }
}

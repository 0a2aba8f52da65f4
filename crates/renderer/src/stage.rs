//! Render stages recorded into each frame.

use ash::vk;
use frameloop_rhi::swapchain::RenderTarget;

use crate::error::FrameError;

/// Error type render stages report failures with.
pub type StageError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type StageResult = Result<(), StageError>;

/// Where in the frame a stage records. Stages run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Scene,
    PostProcess,
    Overlay,
    Composite,
}

/// Per-frame recording context handed to every stage.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Index of the frame slot being recorded.
    pub frame_index: usize,
    /// Index of the acquired surface image.
    pub image_index: u32,
    /// Command buffer in the recording state.
    pub command_buffer: vk::CommandBuffer,
    pub target: RenderTarget,
}

/// Properties of the surface after it was (re)built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub image_count: u32,
    pub render_pass: vk::RenderPass,
}

/// A unit of GPU work recorded once per frame.
///
/// Returning an error aborts the frame: later stages are not run and the
/// command buffer is not submitted.
pub trait RenderStage: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Records this stage's commands.
    fn record(&mut self, frame: &FrameContext) -> StageResult;

    /// Called after the surface was rebuilt, before the next recorded frame.
    /// Size-dependent resources should be rebuilt here.
    fn surface_recreated(&mut self, _surface: &SurfaceInfo) {}
}

/// Registered stages, kept sorted by [`StageKind`] then registration order.
#[derive(Default)]
pub struct StageRegistry {
    stages: Vec<(StageKind, Box<dyn RenderStage>)>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage behind every stage of the same or an earlier kind.
    pub fn register(&mut self, kind: StageKind, stage: Box<dyn RenderStage>) {
        let at = self.stages.partition_point(|(k, _)| *k <= kind);
        tracing::debug!("Registered {:?} stage '{}'", kind, stage.name());
        self.stages.insert(at, (kind, stage));
    }

    /// Runs every stage in order, stopping at the first failure.
    pub fn record_all(&mut self, frame: &FrameContext) -> Result<(), FrameError> {
        for (_, stage) in &mut self.stages {
            if let Err(source) = stage.record(frame) {
                return Err(FrameError::recording(stage.name(), source));
            }
        }
        Ok(())
    }

    pub fn surface_recreated(&mut self, surface: &SurfaceInfo) {
        for (_, stage) in &mut self.stages {
            stage.surface_recreated(surface);
        }
    }

    /// Stage names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|(_, stage)| stage.name())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.stages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Named {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl RenderStage for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn record(&mut self, _frame: &FrameContext) -> StageResult {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(format!("{} exploded", self.name).into());
            }
            Ok(())
        }
    }

    fn stage(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Box<Named> {
        Box::new(Named {
            name,
            log: log.clone(),
            fail: false,
        })
    }

    fn context() -> FrameContext {
        FrameContext {
            frame_index: 0,
            image_index: 0,
            command_buffer: vk::CommandBuffer::null(),
            target: RenderTarget {
                image_index: 0,
                image: vk::Image::null(),
                view: vk::ImageView::null(),
                framebuffer: vk::Framebuffer::null(),
                render_pass: vk::RenderPass::null(),
                extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                format: vk::Format::B8G8R8A8_SRGB,
            },
        }
    }

    #[test]
    fn test_kind_order() {
        assert!(StageKind::Scene < StageKind::PostProcess);
        assert!(StageKind::PostProcess < StageKind::Overlay);
        assert!(StageKind::Overlay < StageKind::Composite);
    }

    #[test]
    fn test_registration_sorts_by_kind_then_insertion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StageRegistry::new();
        registry.register(StageKind::Composite, stage("blit", &log));
        registry.register(StageKind::Overlay, stage("hud", &log));
        registry.register(StageKind::Scene, stage("opaque", &log));
        registry.register(StageKind::PostProcess, stage("tonemap", &log));
        registry.register(StageKind::Scene, stage("transparent", &log));

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, ["opaque", "transparent", "tonemap", "hud", "blit"]);

        registry.record_all(&context()).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            ["opaque", "transparent", "tonemap", "hud", "blit"]
        );
    }

    #[test]
    fn test_first_failure_stops_recording() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StageRegistry::new();
        registry.register(StageKind::Scene, stage("scene", &log));
        registry.register(
            StageKind::PostProcess,
            Box::new(Named {
                name: "bloom",
                log: log.clone(),
                fail: true,
            }),
        );
        registry.register(StageKind::Overlay, stage("ui", &log));

        let err = registry.record_all(&context()).unwrap_err();
        match err {
            FrameError::Recording { stage, .. } => assert_eq!(stage, "bloom"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), ["scene", "bloom"]);
    }
}

//! frameloop - Vulkan frame loop demo
//!
//! Opens a window and presents a cleared frame on every redraw, rebuilding
//! the surface when the window is resized.

mod cli;
mod clear_stage;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use frameloop_core::{AppConfig, FrameTimer, init_logging};
use frameloop_platform::Window;
use frameloop_renderer::{
    FrameScheduler, SchedulerConfig, StageKind, SurfaceInvalidator, TickOutcome,
    VulkanBackendOptions, VulkanFrameBackend,
};

use crate::clear_stage::ClearStage;
use crate::cli::Args;

/// Frames between title updates.
const STATS_INTERVAL: u64 = 30;

struct App {
    config: AppConfig,
    // Declared before the window so the surface is gone before the window is.
    scheduler: Option<FrameScheduler<VulkanFrameBackend>>,
    invalidator: Option<SurfaceInvalidator>,
    window: Option<Window>,
    timer: FrameTimer,
    exit_code: i32,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            scheduler: None,
            invalidator: None,
            window: None,
            timer: FrameTimer::new(),
            exit_code: 0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("Failed to create window")?;

        let options = VulkanBackendOptions::from(&self.config.render);
        let backend =
            VulkanFrameBackend::new(&window, &options).context("Failed to initialize Vulkan")?;
        let device = backend.device().clone();

        let mut scheduler = FrameScheduler::new(backend, SchedulerConfig::from(&self.config.render))
            .context("Failed to create frame scheduler")?;
        scheduler.register_stage(
            StageKind::Composite,
            ClearStage::new(device, self.config.render.clear_color),
        );

        self.invalidator = Some(scheduler.invalidator());
        self.scheduler = Some(scheduler);
        self.window = Some(window);
        self.timer.reset();
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };

        match scheduler.tick() {
            Ok(TickOutcome::Presented { .. }) => {
                let stats = self.timer.tick();
                if self.config.window.show_stats
                    && stats.frame_count % STATS_INTERVAL == 0
                    && let Some(window) = &self.window
                {
                    window.show_stats(&stats);
                }
            }
            Ok(outcome) => debug!("Tick: {:?}", outcome),
            Err(e) => {
                error!("Fatal rendering error: {}", e);
                self.exit_code = 1;
                self.shutdown(event_loop);
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        info!("Shutting down after {:.1?}", self.timer.elapsed());
        // Scheduler first: it idles the device and releases the surface.
        self.scheduler = None;
        self.invalidator = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("{:#}", e);
                self.exit_code = 1;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|window| window.id() != id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                info!("Escape pressed, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(invalidator) = &self.invalidator {
                    invalidator.notify_resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else {
            return;
        };
        // Nothing is presented while minimized; sleep until the next event.
        if window.is_minimized() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    args.apply(&mut config);

    init_logging(&config.logging.filter);
    info!("Starting frameloop");
    source.log();
    debug!("Configuration: {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if app.exit_code != 0 {
        std::process::exit(app.exit_code);
    }
    Ok(())
}

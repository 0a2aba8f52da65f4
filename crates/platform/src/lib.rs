//! Windowing for the frame loop.
//!
//! This crate provides:
//! - Window creation from [`WindowConfig`](frameloop_core::config::WindowConfig) via winit
//! - Vulkan surface creation and the instance extensions it needs

mod window;

pub use window::{Surface, Window, stats_title};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;

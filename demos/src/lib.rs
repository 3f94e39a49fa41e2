//! # Lumen Demos
//!
//! Headless programs driving the frame core end to end.
//!
//! ## Available Demos
//!
//! - `frame_loop_demo` - Paced frame loop with uploads, a compute pass, a
//!   render pass and GPU timing reports

pub mod args;
pub mod scene;

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

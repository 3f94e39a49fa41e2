//! Command line arguments.

use clap::Parser;
use lumen_frame::{BackendType, FrameEnv};

/// Backend selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliBackend {
    /// wgpu when compiled in and an adapter is found, otherwise dummy.
    #[default]
    Auto,
    /// Cross-platform backend via wgpu. Requires the `wgpu-backend` feature.
    Wgpu,
    /// Host-memory backend for testing and CI environments.
    Dummy,
}

impl From<CliBackend> for BackendType {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Auto => BackendType::Auto,
            CliBackend::Wgpu => BackendType::Wgpu,
            CliBackend::Dummy => BackendType::Dummy,
        }
    }
}

/// Frame loop demo arguments.
///
/// ```bash
/// # Run 300 frames on the dummy backend with two frames in flight
/// ./frame_loop_demo --backend dummy --frames 300 --frames-in-flight 2
///
/// # Shrink the arenas to see how close the scene gets to exhausting them
/// ./frame_loop_demo --shared-size 65536 --private-size 65536
/// ```
#[derive(Parser, Debug, Clone)]
#[command(
    name = "frame_loop_demo",
    about = "Drive the Lumen frame core through a headless frame loop"
)]
pub struct DemoArgs {
    /// Graphics backend to use.
    #[arg(long, value_enum, default_value_t = CliBackend::Auto)]
    pub backend: CliBackend,

    /// Number of frames to run before exiting.
    #[arg(long, default_value_t = 120)]
    pub frames: u64,

    /// Frames the CPU may run ahead of the GPU.
    #[arg(long, default_value_t = 3)]
    pub frames_in_flight: usize,

    /// Bytes per shared (host-visible) arena.
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub shared_size: u64,

    /// Bytes per private (device-only) arena.
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub private_size: u64,

    /// Timestamp counter slots. Zero disables GPU timing.
    #[arg(long, default_value_t = 32)]
    pub counter_slots: u32,
}

impl DemoArgs {
    /// Frame core configuration described by these arguments.
    pub fn frame_env(&self) -> FrameEnv {
        FrameEnv::default()
            .with_frames_in_flight(self.frames_in_flight)
            .with_shared_allocator_size(self.shared_size)
            .with_private_allocator_size(self.private_size)
            .with_counter_sample_capacity(self.counter_slots)
    }
}

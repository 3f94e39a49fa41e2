//! Common utilities for frame core integration tests.

use std::sync::Arc;

use lumen_frame::{
    BackendType, CounterSamplingPoints, DummyBackend, FrameEnv, FramePipeline, GraphicsDevice,
};

/// Available backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Host-memory dummy backend.
    Dummy,
    /// wgpu backend on whatever adapter the machine has.
    Wgpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Wgpu => cfg!(feature = "wgpu-backend"),
        }
    }

    fn backend_type(self) -> BackendType {
        match self {
            Backend::Dummy => BackendType::Dummy,
            Backend::Wgpu => BackendType::Wgpu,
        }
    }
}

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small configuration so tests exercise exhaustion and wrap-around quickly.
pub fn small_env() -> FrameEnv {
    FrameEnv::default()
        .with_frames_in_flight(3)
        .with_shared_allocator_size(64 * 1024)
        .with_private_allocator_size(64 * 1024)
        .with_counter_sample_capacity(32)
        .with_stats_history(8)
}

/// A device plus, for the dummy backend, a handle to its test knobs.
pub struct TestContext {
    pub device: Arc<GraphicsDevice>,
    pub dummy: Option<Arc<DummyBackend>>,
}

impl TestContext {
    /// Create a context, or `None` if the backend is not available here.
    pub fn new(backend: Backend) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }
        match backend {
            Backend::Dummy => Some(Self::dummy(DummyBackend::new())),
            Backend::Wgpu => {
                let device = GraphicsDevice::create(backend.backend_type()).ok()?;
                Some(Self {
                    device,
                    dummy: None,
                })
            }
        }
    }

    /// Context on a dummy backend with the given counter support.
    pub fn dummy_with_counters(points: CounterSamplingPoints) -> Self {
        init_logging();
        Self::dummy(DummyBackend::with_counter_support(points))
    }

    fn dummy(backend: DummyBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            device: GraphicsDevice::new(backend.clone()),
            dummy: Some(backend),
        }
    }

    /// Pipeline over this context's device.
    pub fn pipeline(&self, env: FrameEnv) -> FramePipeline {
        FramePipeline::new(Arc::clone(&self.device), env).expect("pipeline creation failed")
    }
}

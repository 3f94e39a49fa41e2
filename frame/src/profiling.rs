//! CPU profiling via Tracy.
//!
//! Instrumentation is enabled with the `profiling` Cargo feature. When the
//! feature is off, every macro in this module expands to nothing. With the
//! feature on, the macros only record while a Tracy client is running; call
//! [`start`] once at startup to begin capturing.
//!
//! ```bash
//! cargo run -p lumen-demos --features profiling
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lumen_frame::{frame_mark, profile_scope};
//!
//! loop {
//!     {
//!         profile_scope!("record_passes");
//!         // ... register and dispatch the pass graph ...
//!     }
//!     frame_mark!();
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{
    self, Client, frame_mark as tracy_frame_mark, plot as tracy_plot, span,
};

/// Start the Tracy client. Returns `true` if profiling is compiled in.
#[cfg(feature = "profiling")]
pub fn start() -> bool {
    let _client = Client::start();
    log::info!("Tracy profiling client started");
    true
}

/// Start the Tracy client (no-op when profiling disabled).
#[cfg(not(feature = "profiling"))]
pub fn start() -> bool {
    false
}

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        if $crate::profiling::Client::running().is_some() {
            $crate::profiling::tracy_frame_mark();
        }
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Create a profiling span that ends with the enclosing scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|_| $crate::profiling::span!($name));
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span covering the whole function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|_| $crate::profiling::span!());
    };
}

/// Create a function span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a value over time, e.g. GPU frame time or arena usage.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        if $crate::profiling::Client::running().is_some() {
            $crate::profiling::tracy_plot!($name, $value as f64);
        }
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

/// Name the current thread in the profiler.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! set_thread_name {
    ($name:expr) => {
        if $crate::profiling::Client::running().is_some() {
            $crate::profiling::tracy_client::set_thread_name!($name);
        }
    };
}

/// Name the current thread (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! set_thread_name {
    ($name:expr) => {};
}

#[cfg(test)]
mod tests {
    use crate::{FrameEnv, FramePipeline, GraphicsDevice};

    #[test]
    fn test_macros_expand_in_any_configuration() {
        profile_function!();
        profile_scope!("scope");
        profile_plot!("value", 1.5f32);
        frame_mark!();
    }

    #[test]
    fn test_frame_runs_with_instrumented_pipeline() {
        let env = FrameEnv::default()
            .with_frames_in_flight(2)
            .with_shared_allocator_size(1024)
            .with_private_allocator_size(1024);
        let mut pipeline = FramePipeline::new(GraphicsDevice::dummy(), env).unwrap();

        let mut frame = pipeline.begin_frame();
        frame.shared().allocate(16);
        frame.submit();
        pipeline.wait_idle();

        assert_eq!(pipeline.stats().len(), 1);
    }

    #[cfg(feature = "profiling")]
    #[test]
    fn test_start_enables_client() {
        assert!(super::start());
        assert!(super::Client::running().is_some());
        profile_scope!("after_start");
        frame_mark!();
    }
}

//! Pass types.
//!
//! A pass is an encodable unit of GPU work. The graph opens and closes the
//! pass on the command stream; [`Pass::encode`] only records the body.

use crate::command::{CommandStream, PassKind, TimestampWrites};

/// An encodable unit of GPU work scheduled by a [`PassGraph`].
///
/// [`PassGraph`]: super::PassGraph
pub trait Pass: Send {
    /// Debug name, also used as the pass label on the command stream.
    fn name(&self) -> &str;

    /// Kind of work this pass records.
    fn kind(&self) -> PassKind;

    /// Counter slots to sample timestamps into, if the pass is timed.
    fn timestamps(&self) -> Option<&TimestampWrites> {
        None
    }

    /// Record the pass body into `stream`.
    fn encode(&mut self, stream: &mut CommandStream);
}

type EncodeFn = Box<dyn FnMut(&mut CommandStream) + Send>;

macro_rules! closure_pass {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        pub struct $name {
            name: String,
            timestamps: Option<TimestampWrites>,
            encode: EncodeFn,
        }

        impl $name {
            /// Create a pass whose body is recorded by `encode`.
            pub fn new(
                name: impl Into<String>,
                encode: impl FnMut(&mut CommandStream) + Send + 'static,
            ) -> Self {
                Self {
                    name: name.into(),
                    timestamps: None,
                    encode: Box::new(encode),
                }
            }

            /// Sample the pass into the given counter slots.
            pub fn with_timestamps(mut self, timestamps: TimestampWrites) -> Self {
                self.timestamps = Some(timestamps);
                self
            }
        }

        impl Pass for $name {
            fn name(&self) -> &str {
                &self.name
            }

            fn kind(&self) -> PassKind {
                $kind
            }

            fn timestamps(&self) -> Option<&TimestampWrites> {
                self.timestamps.as_ref()
            }

            fn encode(&mut self, stream: &mut CommandStream) {
                (self.encode)(stream)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .field("timestamps", &self.timestamps.as_ref().map(TimestampWrites::range))
                    .finish_non_exhaustive()
            }
        }
    };
}

closure_pass!(
    /// Rasterization pass backed by a closure.
    RenderPass,
    PassKind::Render
);

closure_pass!(
    /// Compute pass backed by a closure.
    ComputePass,
    PassKind::Compute
);

closure_pass!(
    /// Transfer pass backed by a closure.
    BlitPass,
    PassKind::Blit
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_pass_accessors() {
        let mut pass = ComputePass::new("cull", |stream: &mut CommandStream| {
            stream.insert_debug_marker("cull");
        });
        assert_eq!(pass.name(), "cull");
        assert_eq!(pass.kind(), PassKind::Compute);
        assert!(pass.timestamps().is_none());

        let mut stream = CommandStream::new("test");
        pass.encode(&mut stream);
        assert_eq!(stream.command_count(), 1);
    }

    #[test]
    fn test_pass_kinds() {
        assert_eq!(RenderPass::new("a", |_| {}).kind(), PassKind::Render);
        assert_eq!(BlitPass::new("b", |_| {}).kind(), PassKind::Blit);
    }
}

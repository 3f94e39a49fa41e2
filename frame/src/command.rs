//! Command streams.
//!
//! A [`CommandStream`] is the unit of GPU submission: passes record into it
//! in dispatch order, [`CommandStream::finish`] seals it, and the device
//! submits it together with a [`CompletionHandler`]. Recording is backend
//! neutral; each backend translates the recorded commands at submit time.
//!
//! ```text
//! begin_pass("shadow") ── copy_region ── end_pass
//! begin_pass("lighting") ── debug_marker ── end_pass
//! finish() ─► GraphicsDevice::submit(stream, on_complete)
//! ```

use std::ops::Range;
use std::sync::Arc;

use crate::resources::{Buffer, CounterBuffer, Region};

/// The kind of GPU work a pass encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    /// Rasterization work with vertex and fragment stages.
    Render,
    /// Compute dispatches.
    Compute,
    /// Copies and other transfer work.
    Blit,
}

impl PassKind {
    /// Number of timestamp slots one sampled pass of this kind consumes.
    ///
    /// Render passes sample vertex start/end and fragment start/end;
    /// compute and blit passes sample a single start/end pair.
    pub fn timestamp_slots(self) -> u32 {
        match self {
            Self::Render => 4,
            Self::Compute | Self::Blit => 2,
        }
    }

    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Compute => "compute",
            Self::Blit => "blit",
        }
    }
}

/// Counter slots a pass writes its timestamps into.
#[derive(Debug, Clone)]
pub struct TimestampWrites {
    /// Counter buffer receiving the samples.
    pub buffer: Arc<CounterBuffer>,
    /// First slot of the range.
    pub start: u32,
    /// Number of slots in the range.
    pub count: u32,
}

impl TimestampWrites {
    /// The slot range covered by these writes.
    pub fn range(&self) -> Range<u32> {
        self.start..self.start + self.count
    }
}

impl PartialEq for TimestampWrites {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.start == other.start
            && self.count == other.count
    }
}

impl Eq for TimestampWrites {}

/// Describes a pass being opened on a command stream.
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    /// Kind of work.
    pub kind: PassKind,
    /// Debug label.
    pub label: String,
    /// Optional timestamp sampling for the pass.
    pub timestamps: Option<TimestampWrites>,
}

impl PassDescriptor {
    /// Create a descriptor without timestamp sampling.
    pub fn new(kind: PassKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            timestamps: None,
        }
    }

    /// Sample timestamps into the given counter slots.
    pub fn with_timestamps(mut self, timestamps: Option<TimestampWrites>) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// A recorded command.
#[derive(Debug, Clone)]
pub(crate) enum Command {
    BeginPass {
        kind: PassKind,
        label: String,
        timestamps: Option<TimestampWrites>,
    },
    EndPass {
        kind: PassKind,
        timestamps: Option<TimestampWrites>,
    },
    CopyBuffer {
        src: Arc<Buffer>,
        src_offset: u64,
        dst: Arc<Buffer>,
        dst_offset: u64,
        size: u64,
    },
    DebugMarker(String),
}

/// A sequence of GPU commands recorded for one submission.
pub struct CommandStream {
    label: String,
    commands: Vec<Command>,
    open_pass: Option<(PassKind, Option<TimestampWrites>)>,
    encoded_passes: Vec<String>,
    finished: bool,
}

impl CommandStream {
    /// Create an empty command stream.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
            open_pass: None,
            encoded_passes: Vec::new(),
            finished: false,
        }
    }

    /// Debug label of the stream.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Labels of the passes encoded so far, in encode order.
    pub fn encoded_passes(&self) -> &[String] {
        &self.encoded_passes
    }

    /// Number of recorded commands.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub(crate) fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Open a pass. Passes cannot nest.
    pub fn begin_pass(&mut self, descriptor: &PassDescriptor) {
        self.ensure_recording("begin_pass");
        if self.open_pass.is_some() {
            crate::fatal!(
                "command stream '{}': cannot begin pass '{}' while another pass is open",
                self.label,
                descriptor.label
            );
        }
        if let Some(timestamps) = &descriptor.timestamps
            && timestamps.count < descriptor.kind.timestamp_slots()
        {
            crate::fatal!(
                "command stream '{}': {} pass '{}' needs {} timestamp slots, got {}",
                self.label,
                descriptor.kind.as_str(),
                descriptor.label,
                descriptor.kind.timestamp_slots(),
                timestamps.count
            );
        }

        log::trace!(
            "CommandStream '{}': begin {} pass '{}'",
            self.label,
            descriptor.kind.as_str(),
            descriptor.label
        );
        self.open_pass = Some((descriptor.kind, descriptor.timestamps.clone()));
        self.encoded_passes.push(descriptor.label.clone());
        self.commands.push(Command::BeginPass {
            kind: descriptor.kind,
            label: descriptor.label.clone(),
            timestamps: descriptor.timestamps.clone(),
        });
    }

    /// Close the currently open pass.
    pub fn end_pass(&mut self) {
        self.ensure_recording("end_pass");
        let Some((kind, timestamps)) = self.open_pass.take() else {
            crate::fatal!("command stream '{}': end_pass without an open pass", self.label);
        };
        self.commands.push(Command::EndPass { kind, timestamps });
    }

    /// Copy the contents of `src` into the start of `dst`.
    pub fn copy_region(&mut self, src: &Region, dst: &Region) {
        self.ensure_recording("copy_region");
        if src.size() > dst.size() {
            crate::fatal!(
                "command stream '{}': copy of {} bytes does not fit destination region of {} bytes",
                self.label,
                src.size(),
                dst.size()
            );
        }
        self.commands.push(Command::CopyBuffer {
            src: Arc::clone(src.buffer()),
            src_offset: src.begin(),
            dst: Arc::clone(dst.buffer()),
            dst_offset: dst.begin(),
            size: src.size(),
        });
    }

    /// Insert a debug marker.
    pub fn insert_debug_marker(&mut self, marker: impl Into<String>) {
        self.ensure_recording("insert_debug_marker");
        self.commands.push(Command::DebugMarker(marker.into()));
    }

    /// Seal the stream for submission.
    pub fn finish(&mut self) {
        self.ensure_recording("finish");
        if self.open_pass.is_some() {
            crate::fatal!(
                "command stream '{}': finish called with a pass still open",
                self.label
            );
        }
        self.finished = true;
    }

    fn ensure_recording(&self, operation: &str) {
        if self.finished {
            crate::fatal!(
                "command stream '{}': {operation} called after finish",
                self.label
            );
        }
    }
}

impl std::fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStream")
            .field("label", &self.label)
            .field("commands", &self.commands.len())
            .field("passes", &self.encoded_passes)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Summary of a stream the GPU has finished executing.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStream {
    /// Label of the completed stream.
    pub label: String,
    /// Number of commands executed.
    pub command_count: usize,
    /// Number of passes executed.
    pub pass_count: usize,
    /// GPU time between the start and end of the stream.
    pub gpu_time_ms: f64,
}

/// Callback run on the completion thread once a stream has executed.
pub type CompletionHandler = Box<dyn FnOnce(CompletedStream) + Send + 'static>;

static_assertions::assert_impl_all!(CommandStream: Send);
static_assertions::assert_impl_all!(TimestampWrites: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_recording() {
        let mut stream = CommandStream::new("frame0");
        stream.begin_pass(&PassDescriptor::new(PassKind::Compute, "cull"));
        stream.insert_debug_marker("dispatch");
        stream.end_pass();
        stream.begin_pass(&PassDescriptor::new(PassKind::Render, "main"));
        stream.end_pass();
        stream.finish();

        assert!(stream.is_finished());
        assert_eq!(stream.encoded_passes(), ["cull", "main"]);
        assert_eq!(stream.command_count(), 5);
    }

    #[test]
    fn test_timestamp_slots_per_kind() {
        assert_eq!(PassKind::Render.timestamp_slots(), 4);
        assert_eq!(PassKind::Compute.timestamp_slots(), 2);
        assert_eq!(PassKind::Blit.timestamp_slots(), 2);
    }

    #[test]
    #[should_panic(expected = "while another pass is open")]
    fn test_nested_pass_is_fatal() {
        let mut stream = CommandStream::new("nested");
        stream.begin_pass(&PassDescriptor::new(PassKind::Render, "outer"));
        stream.begin_pass(&PassDescriptor::new(PassKind::Render, "inner"));
    }

    #[test]
    #[should_panic(expected = "called after finish")]
    fn test_record_after_finish_is_fatal() {
        let mut stream = CommandStream::new("sealed");
        stream.finish();
        stream.insert_debug_marker("late");
    }

    #[test]
    #[should_panic(expected = "end_pass without an open pass")]
    fn test_unbalanced_end_pass_is_fatal() {
        let mut stream = CommandStream::new("unbalanced");
        stream.end_pass();
    }
}

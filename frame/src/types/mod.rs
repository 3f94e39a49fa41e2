//! Common types and descriptors for frame resources.

mod buffer;
mod counter;

pub use buffer::{BufferDescriptor, BufferUsage, BufferVisibility};
pub use counter::{CounterBufferDescriptor, CounterSamplingPoints};

//! GPU resources owned by the frame core.
//!
//! - [`Buffer`] and [`CounterBuffer`] wrap backend handles with their descriptors
//! - [`Region`] is a non-owning view of a byte range in a buffer
//! - [`TransientAllocator`] is the per-frame bump arena that hands out regions

mod buffer;
mod counter_buffer;
mod region;
mod transient;

pub use buffer::Buffer;
pub use counter_buffer::CounterBuffer;
pub use region::{BufferBinding, Region};
pub use transient::{AllocationError, TransientAllocator};

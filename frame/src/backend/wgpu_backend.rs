//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access. Recorded command
//! streams are translated into a `wgpu::CommandEncoder` at submit time; pass
//! timestamps are written with encoder-level timestamp queries, so the
//! adapter must support `TIMESTAMP_QUERY_INSIDE_ENCODERS` for counter
//! sampling to be available.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::command::{Command, CommandStream, CompletedStream, CompletionHandler, PassKind};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferUsage, CounterBufferDescriptor, CounterSamplingPoints};

use super::{GpuBackend, GpuBuffer, GpuCounterBuffer};

/// Size of one resolved timestamp.
const TIMESTAMP_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// How long blocking readbacks wait for the GPU.
const READBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Round a transfer size up to `wgpu::COPY_BUFFER_ALIGNMENT`.
///
/// Buffers are created padded to the same alignment, so a rounded transfer
/// starting at an aligned offset never leaves the buffer.
fn padded_size(size: u64) -> u64 {
    size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Fatal unless `offset` is aligned for a buffer transfer.
fn check_offset(what: &str, offset: u64) {
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        crate::fatal!(
            "WgpuBackend: {what} offset {offset} is not a multiple of {} bytes",
            wgpu::COPY_BUFFER_ALIGNMENT
        );
    }
}

struct InFlight {
    index: wgpu::SubmissionIndex,
    label: String,
    command_count: usize,
    pass_count: usize,
    submitted_at: Instant,
    on_complete: CompletionHandler,
}

struct Pending {
    count: Mutex<u64>,
    idle: Condvar,
}

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    timestamps_inside_encoders: bool,
    pending: Arc<Pending>,
    sender: Mutex<Option<mpsc::Sender<InFlight>>>,
    completion_thread: Mutex<Option<JoinHandle<()>>>,
    resolve_lock: Mutex<()>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .field("timestamps", &self.timestamps_inside_encoders)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend.
    pub fn new() -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("No compatible GPU adapter: {e}"))
        })?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let timestamp_features =
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS;
        let required_features = adapter.features() & timestamp_features;
        let timestamps_inside_encoders = required_features.contains(timestamp_features);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Lumen Frame Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| GraphicsError::InitializationFailed(format!("Device creation failed: {e}")))?;

        let device = Arc::new(device);
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });

        let (sender, receiver) = mpsc::channel::<InFlight>();
        let thread_device = Arc::clone(&device);
        let thread_pending = Arc::clone(&pending);
        let completion_thread = thread::Builder::new()
            .name("wgpu-completion".to_string())
            .spawn(move || {
                crate::set_thread_name!("wgpu-completion");
                for in_flight in receiver {
                    complete(&thread_device, &thread_pending, in_flight);
                }
            })
            .map_err(|e| {
                GraphicsError::InitializationFailed(format!("completion thread: {e}"))
            })?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue: Arc::new(queue),
            timestamps_inside_encoders,
            pending,
            sender: Mutex::new(Some(sender)),
            completion_thread: Mutex::new(Some(completion_thread)),
            resolve_lock: Mutex::new(()),
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn encode(&self, stream: &CommandStream) -> (wgpu::CommandEncoder, usize) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(stream.label()),
            });
        let mut pass_count = 0;

        for command in stream.commands() {
            match command {
                Command::BeginPass {
                    kind,
                    label,
                    timestamps,
                } => {
                    pass_count += 1;
                    encoder.push_debug_group(label);
                    if let Some(writes) = timestamps {
                        self.write_timestamps(&mut encoder, writes, *kind, PassEdge::Begin);
                    }
                }
                Command::EndPass { kind, timestamps } => {
                    if let Some(writes) = timestamps {
                        self.write_timestamps(&mut encoder, writes, *kind, PassEdge::End);
                    }
                    encoder.pop_debug_group();
                }
                Command::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    if let (GpuBuffer::Wgpu(src), GpuBuffer::Wgpu(dst)) =
                        (src.gpu_handle(), dst.gpu_handle())
                    {
                        check_offset("copy source", *src_offset);
                        check_offset("copy destination", *dst_offset);
                        encoder.copy_buffer_to_buffer(
                            src,
                            *src_offset,
                            dst,
                            *dst_offset,
                            padded_size(*size),
                        );
                    }
                }
                Command::DebugMarker(marker) => encoder.insert_debug_marker(marker),
            }
        }

        (encoder, pass_count)
    }

    fn write_timestamps(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        writes: &crate::command::TimestampWrites,
        kind: PassKind,
        edge: PassEdge,
    ) {
        if !self.timestamps_inside_encoders {
            return;
        }
        let GpuCounterBuffer::Wgpu { query_set, .. } = writes.buffer.gpu_handle() else {
            return;
        };
        // Encoder timestamps cannot split vertex and fragment work, so both
        // render intervals span the whole pass.
        let slots: &[u32] = match (kind, edge) {
            (PassKind::Render, PassEdge::Begin) => &[0, 2],
            (PassKind::Render, PassEdge::End) => &[1, 3],
            (PassKind::Compute | PassKind::Blit, PassEdge::Begin) => &[0],
            (PassKind::Compute | PassKind::Blit, PassEdge::End) => &[1],
        };
        for slot in slots {
            encoder.write_timestamp(query_set, writes.start + slot);
        }
    }
}

#[derive(Clone, Copy)]
enum PassEdge {
    Begin,
    End,
}

fn complete(device: &wgpu::Device, pending: &Pending, in_flight: InFlight) {
    let InFlight {
        index,
        label,
        command_count,
        pass_count,
        submitted_at,
        on_complete,
    } = in_flight;

    if let Err(e) = device.poll(wgpu::PollType::Wait {
        submission_index: Some(index),
        timeout: None,
    }) {
        log::warn!("WgpuBackend: waiting for '{label}' failed: {e}");
    }

    on_complete(CompletedStream {
        label,
        command_count,
        pass_count,
        gpu_time_ms: submitted_at.elapsed().as_secs_f64() * 1000.0,
    });

    let mut count = pending.count.lock();
    *count -= 1;
    if *count == 0 {
        pending.idle.notify_all();
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(handle) = self.completion_thread.lock().take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: padded_size(descriptor.size),
            usage: convert_buffer_usage(descriptor.usage) | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu(Arc::new(buffer)))
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        if let GpuBuffer::Wgpu(wgpu_buffer) = buffer {
            check_offset("write", offset);
            let padded = padded_size(data.len() as u64) as usize;
            let data = if padded == data.len() {
                Cow::Borrowed(data)
            } else {
                let mut bytes = data.to_vec();
                bytes.resize(padded, 0);
                Cow::Owned(bytes)
            };
            self.queue.write_buffer(wgpu_buffer, offset, &data);
        }
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let GpuBuffer::Wgpu(wgpu_buffer) = buffer else {
            return vec![0u8; size as usize];
        };

        check_offset("read", offset);
        let padded = padded_size(size);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read Staging Buffer"),
            size: padded,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read Buffer Encoder"),
            });
        encoder.copy_buffer_to_buffer(wgpu_buffer, offset, &staging, 0, padded);
        self.queue.submit(std::iter::once(encoder.finish()));

        match self.map_readback(&staging, 0..padded) {
            Ok(mut data) => {
                data.truncate(size as usize);
                data
            }
            Err(e) => {
                log::warn!("WgpuBackend: buffer readback failed: {e}");
                vec![0u8; size as usize]
            }
        }
    }

    fn counter_sampling_support(&self) -> CounterSamplingPoints {
        if self.timestamps_inside_encoders {
            CounterSamplingPoints::STAGE
                | CounterSamplingPoints::BLIT
                | CounterSamplingPoints::DISPATCH
        } else {
            CounterSamplingPoints::empty()
        }
    }

    fn timestamp_period_ns(&self) -> f64 {
        f64::from(self.queue.get_timestamp_period())
    }

    fn create_counter_buffer(
        &self,
        descriptor: &CounterBufferDescriptor,
    ) -> Result<GpuCounterBuffer, GraphicsError> {
        if !self.timestamps_inside_encoders {
            return Err(GraphicsError::FeatureNotSupported(
                "TIMESTAMP_QUERY_INSIDE_ENCODERS".to_string(),
            ));
        }

        let label = descriptor.label.as_deref();
        let size = u64::from(descriptor.sample_count) * TIMESTAMP_SIZE;

        let query_set = self.device.create_query_set(&wgpu::QuerySetDescriptor {
            label,
            ty: wgpu::QueryType::Timestamp,
            count: descriptor.sample_count,
        });
        let resolve = self.device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label,
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(GpuCounterBuffer::Wgpu {
            query_set: Arc::new(query_set),
            resolve: Arc::new(resolve),
            readback: Arc::new(readback),
        })
    }

    fn resolve_counter_range(
        &self,
        buffer: &GpuCounterBuffer,
        range: Range<u32>,
    ) -> Result<Vec<u64>, GraphicsError> {
        let GpuCounterBuffer::Wgpu {
            query_set,
            resolve,
            readback,
        } = buffer
        else {
            return Err(GraphicsError::InvalidParameter(
                "dummy counter buffer passed to wgpu backend".to_string(),
            ));
        };
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.resolve_lock.lock();

        // Resolve destinations must be 256-byte aligned, so always resolve
        // from slot zero and slice afterwards.
        let bytes = u64::from(range.end) * TIMESTAMP_SIZE;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Counter Resolve Encoder"),
            });
        encoder.resolve_query_set(query_set, 0..range.end, resolve, 0);
        encoder.copy_buffer_to_buffer(resolve, 0, readback, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let data = self.map_readback(readback, 0..bytes)?;
        let samples = data
            .chunks_exact(TIMESTAMP_SIZE as usize)
            .skip(range.start as usize)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                u64::from_le_bytes(raw)
            })
            .collect();
        Ok(samples)
    }

    fn submit(&self, stream: CommandStream, on_complete: CompletionHandler) {
        let (encoder, pass_count) = self.encode(&stream);
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        *self.pending.count.lock() += 1;
        let in_flight = InFlight {
            index,
            label: stream.label().to_string(),
            command_count: stream.command_count(),
            pass_count,
            submitted_at: Instant::now(),
            on_complete,
        };

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(in_flight).is_ok(),
            None => false,
        };
        if !sent {
            crate::fatal!("wgpu completion thread is gone");
        }
    }

    fn wait_idle(&self) {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
    }
}

impl WgpuBackend {
    fn map_readback(
        &self,
        buffer: &wgpu::Buffer,
        range: Range<u64>,
    ) -> Result<Vec<u8>, GraphicsError> {
        let slice = buffer.slice(range);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());

        match rx.recv_timeout(READBACK_TIMEOUT) {
            Ok(Ok(())) => {
                let data = slice.get_mapped_range().to_vec();
                buffer.unmap();
                Ok(data)
            }
            Ok(Err(e)) => Err(GraphicsError::CounterResolveFailed(format!(
                "buffer map failed: {e}"
            ))),
            Err(_) => Err(GraphicsError::CounterResolveFailed(
                "buffer map timed out".to_string(),
            )),
        }
    }
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        result |= wgpu::BufferUsages::INDIRECT;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::MAP_READ) {
        result |= wgpu::BufferUsages::MAP_READ;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_transient_usage() {
        let usage = convert_buffer_usage(BufferUsage::TRANSIENT);
        assert!(usage.contains(wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_SRC));
        assert!(!usage.contains(wgpu::BufferUsages::MAP_READ));
    }

    #[test]
    fn test_padded_size_rounds_to_copy_alignment() {
        assert_eq!(padded_size(0), 0);
        assert_eq!(padded_size(1), 4);
        assert_eq!(padded_size(10), 12);
        assert_eq!(padded_size(24), 24);
    }

    #[test]
    #[should_panic(expected = "is not a multiple of 4 bytes")]
    fn test_misaligned_offset_is_fatal() {
        check_offset("write", 10);
    }
}

//! Dummy GPU backend for testing and headless runs.
//!
//! Buffers live in host memory, so arena writes and region copies can be
//! observed in tests. Submitted command streams are executed in order on a
//! dedicated "GPU queue" thread against a synthetic clock, which writes
//! deterministic timestamps and then runs the completion handler on that
//! thread, mirroring the callback thread of a real GPU runtime.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::command::{Command, CommandStream, CompletedStream, CompletionHandler, PassKind};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, CounterBufferDescriptor, CounterSamplingPoints};

use super::{GpuBackend, GpuBuffer, GpuCounterBuffer};

/// Default synthetic clock advance per executed command (0.025 ms).
const DEFAULT_TICKS_PER_COMMAND: u64 = 25_000;

struct Submission {
    stream: CommandStream,
    on_complete: CompletionHandler,
}

/// State shared between the backend handle and its queue thread.
struct DummyQueue {
    clock: AtomicU64,
    ticks_per_command: AtomicU64,
    completion_delay: Mutex<Duration>,
    fail_counter_resolve: AtomicBool,
    submitted: AtomicU64,
    pending: Mutex<u64>,
    idle: Condvar,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    queue: Arc<DummyQueue>,
    sender: Mutex<Option<mpsc::Sender<Submission>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    sampling: CounterSamplingPoints,
}

impl DummyBackend {
    /// Create a new dummy backend with every sampling boundary except tile
    /// dispatch supported.
    pub fn new() -> Self {
        Self::with_counter_support(
            CounterSamplingPoints::STAGE
                | CounterSamplingPoints::DRAW
                | CounterSamplingPoints::BLIT
                | CounterSamplingPoints::DISPATCH,
        )
    }

    /// Create a dummy backend that reports the given sampling support.
    ///
    /// With an empty set, counter buffer creation fails the way it does on
    /// devices without timestamp queries.
    pub fn with_counter_support(sampling: CounterSamplingPoints) -> Self {
        let queue = Arc::new(DummyQueue {
            clock: AtomicU64::new(0),
            ticks_per_command: AtomicU64::new(DEFAULT_TICKS_PER_COMMAND),
            completion_delay: Mutex::new(Duration::ZERO),
            fail_counter_resolve: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            pending: Mutex::new(0),
            idle: Condvar::new(),
        });

        let (sender, receiver) = mpsc::channel::<Submission>();
        let worker_queue = Arc::clone(&queue);
        let worker = thread::Builder::new()
            .name("dummy-gpu-queue".to_string())
            .spawn(move || {
                crate::set_thread_name!("dummy-gpu-queue");
                for submission in receiver {
                    worker_queue.execute(submission);
                }
            })
            .unwrap_or_else(|err| crate::fatal!("failed to spawn dummy GPU queue thread: {err}"));

        Self {
            queue,
            sender: Mutex::new(Some(sender)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            sampling,
        }
    }

    /// Make every subsequent counter resolve fail, or succeed again.
    pub fn set_fail_counter_resolve(&self, fail: bool) {
        self.queue.fail_counter_resolve.store(fail, Ordering::Release);
    }

    /// Delay the execution of every subsequent stream, simulating a busy GPU.
    pub fn set_completion_delay(&self, delay: Duration) {
        *self.queue.completion_delay.lock() = delay;
    }

    /// Set how many timestamp ticks (nanoseconds) each command takes.
    pub fn set_ticks_per_command(&self, ticks: u64) {
        self.queue.ticks_per_command.store(ticks, Ordering::Release);
    }

    /// Number of streams submitted so far.
    pub fn submitted_count(&self) -> u64 {
        self.queue.submitted.load(Ordering::Acquire)
    }

    /// Number of submitted streams whose completion has not run yet.
    pub fn pending_count(&self) -> u64 {
        *self.queue.pending.lock()
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DummyBackend {
    fn drop(&mut self) {
        // Closing the channel lets the queue thread drain and exit.
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            // The last handle can be dropped by a completion handler running
            // on the queue thread itself, which must not join itself.
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("submitted", &self.submitted_count())
            .field("pending", &self.pending_count())
            .field("sampling", &self.sampling)
            .finish()
    }
}

impl DummyQueue {
    #[cfg_attr(not(feature = "wgpu-backend"), allow(irrefutable_let_patterns))]
    fn execute(&self, submission: Submission) {
        let Submission {
            stream,
            on_complete,
        } = submission;

        let delay = *self.completion_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let ticks = self.ticks_per_command.load(Ordering::Acquire);
        let start = self.clock.load(Ordering::Acquire);
        let mut pass_count = 0;

        for command in stream.commands() {
            let now = self.clock.fetch_add(ticks, Ordering::AcqRel) + ticks;
            match command {
                Command::BeginPass {
                    kind,
                    label,
                    timestamps,
                } => {
                    pass_count += 1;
                    log::trace!("DummyBackend: executing {kind:?} pass '{label}'");
                    if let Some(writes) = timestamps
                        && let GpuCounterBuffer::Dummy(samples) = writes.buffer.gpu_handle()
                    {
                        let mut samples = samples.lock();
                        samples[writes.start as usize] = now;
                    }
                }
                Command::EndPass { kind, timestamps } => {
                    if let Some(writes) = timestamps
                        && let GpuCounterBuffer::Dummy(samples) = writes.buffer.gpu_handle()
                    {
                        let mut samples = samples.lock();
                        let base = writes.start as usize;
                        match kind {
                            PassKind::Render => {
                                // Vertex work takes the first half of the pass,
                                // fragment work the second half.
                                let begin = samples[base];
                                let mid = begin + (now - begin) / 2;
                                samples[base + 1] = mid;
                                samples[base + 2] = mid;
                                samples[base + 3] = now;
                            }
                            PassKind::Compute | PassKind::Blit => {
                                samples[base + 1] = now;
                            }
                        }
                    }
                }
                Command::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    if let (GpuBuffer::Dummy(src_mem), GpuBuffer::Dummy(dst_mem)) =
                        (src.gpu_handle(), dst.gpu_handle())
                    {
                        let (src_offset, dst_offset, size) =
                            (*src_offset as usize, *dst_offset as usize, *size as usize);
                        if Arc::ptr_eq(src_mem, dst_mem) {
                            src_mem
                                .lock()
                                .copy_within(src_offset..src_offset + size, dst_offset);
                        } else {
                            let src_mem = src_mem.lock();
                            dst_mem.lock()[dst_offset..dst_offset + size]
                                .copy_from_slice(&src_mem[src_offset..src_offset + size]);
                        }
                    }
                }
                Command::DebugMarker(marker) => {
                    log::trace!("DummyBackend: marker '{marker}'");
                }
            }
        }

        let elapsed = self.clock.load(Ordering::Acquire) - start;
        let completed = CompletedStream {
            label: stream.label().to_string(),
            command_count: stream.command_count(),
            pass_count,
            gpu_time_ms: elapsed as f64 / 1_000_000.0,
        };
        drop(stream);

        log::trace!(
            "DummyBackend: completed '{}' in {:.3} ms",
            completed.label,
            completed.gpu_time_ms
        );
        on_complete(completed);

        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let memory = vec![0u8; descriptor.size as usize];
        Ok(GpuBuffer::Dummy(Arc::new(Mutex::new(memory))))
    }

    #[cfg_attr(not(feature = "wgpu-backend"), allow(irrefutable_let_patterns))]
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        if let GpuBuffer::Dummy(memory) = buffer {
            let mut memory = memory.lock();
            let offset = offset as usize;
            match memory.get_mut(offset..offset + data.len()) {
                Some(target) => target.copy_from_slice(data),
                None => log::warn!(
                    "DummyBackend: write of {} bytes at {offset} outside buffer of {} bytes",
                    data.len(),
                    memory.len()
                ),
            }
        }
    }

    #[cfg_attr(not(feature = "wgpu-backend"), allow(irrefutable_let_patterns))]
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        if let GpuBuffer::Dummy(memory) = buffer {
            let memory = memory.lock();
            let offset = offset as usize;
            if let Some(bytes) = memory.get(offset..offset + size as usize) {
                return bytes.to_vec();
            }
        }
        vec![0u8; size as usize]
    }

    fn counter_sampling_support(&self) -> CounterSamplingPoints {
        self.sampling
    }

    fn timestamp_period_ns(&self) -> f64 {
        1.0
    }

    fn create_counter_buffer(
        &self,
        descriptor: &CounterBufferDescriptor,
    ) -> Result<GpuCounterBuffer, GraphicsError> {
        if self.sampling.is_empty() {
            return Err(GraphicsError::FeatureNotSupported(
                "timestamp counters".to_string(),
            ));
        }
        log::trace!(
            "DummyBackend: creating counter buffer {:?} ({} slots)",
            descriptor.label,
            descriptor.sample_count
        );
        let samples = vec![0u64; descriptor.sample_count as usize];
        Ok(GpuCounterBuffer::Dummy(Arc::new(Mutex::new(samples))))
    }

    fn resolve_counter_range(
        &self,
        buffer: &GpuCounterBuffer,
        range: Range<u32>,
    ) -> Result<Vec<u64>, GraphicsError> {
        if self.queue.fail_counter_resolve.load(Ordering::Acquire) {
            return Err(GraphicsError::CounterResolveFailed(
                "counter resolve disabled on dummy backend".to_string(),
            ));
        }
        match buffer {
            GpuCounterBuffer::Dummy(samples) => samples
                .lock()
                .get(range.start as usize..range.end as usize)
                .map(<[u64]>::to_vec)
                .ok_or_else(|| {
                    GraphicsError::InvalidParameter(format!("counter range {range:?} out of bounds"))
                }),
            #[cfg(feature = "wgpu-backend")]
            GpuCounterBuffer::Wgpu { .. } => Err(GraphicsError::InvalidParameter(
                "wgpu counter buffer passed to dummy backend".to_string(),
            )),
        }
    }

    fn submit(&self, stream: CommandStream, on_complete: CompletionHandler) {
        *self.queue.pending.lock() += 1;
        self.queue.submitted.fetch_add(1, Ordering::AcqRel);

        let submission = Submission {
            stream,
            on_complete,
        };
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(submission).is_ok(),
            None => false,
        };
        if !sent {
            crate::fatal!("dummy GPU queue thread is gone");
        }
    }

    fn wait_idle(&self) {
        let mut pending = self.queue.pending.lock();
        while *pending > 0 {
            self.queue.idle.wait(&mut pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::PassDescriptor;

    fn run(backend: &DummyBackend, stream: CommandStream) -> CompletedStream {
        let (tx, rx) = mpsc::channel();
        backend.submit(
            stream,
            Box::new(move |completed| {
                let _ = tx.send(completed);
            }),
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_completion_runs_on_queue_thread() {
        let backend = DummyBackend::new();
        let (tx, rx) = mpsc::channel();
        let mut stream = CommandStream::new("threaded");
        stream.finish();

        backend.submit(
            stream,
            Box::new(move |_| {
                let _ = tx.send(thread::current().name().map(str::to_string));
            }),
        );

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("dummy-gpu-queue"));
    }

    #[test]
    fn test_synthetic_gpu_time() {
        let backend = DummyBackend::new();
        backend.set_ticks_per_command(1_000_000);

        let mut stream = CommandStream::new("timed");
        stream.begin_pass(&PassDescriptor::new(PassKind::Compute, "work"));
        stream.insert_debug_marker("dispatch");
        stream.end_pass();
        stream.finish();

        let completed = run(&backend, stream);
        assert_eq!(completed.label, "timed");
        assert_eq!(completed.command_count, 3);
        assert_eq!(completed.pass_count, 1);
        assert!((completed.gpu_time_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_wait_idle_drains_queue() {
        let backend = DummyBackend::new();
        backend.set_completion_delay(Duration::from_millis(5));
        for i in 0..4 {
            let mut stream = CommandStream::new(format!("s{i}"));
            stream.finish();
            backend.submit(stream, Box::new(|_| {}));
        }
        backend.wait_idle();
        assert_eq!(backend.submitted_count(), 4);
        assert_eq!(backend.pending_count(), 0);
    }

    #[test]
    fn test_counter_resolve_failure_toggle() {
        let backend = DummyBackend::new();
        let counters = backend
            .create_counter_buffer(&CounterBufferDescriptor::new(4))
            .unwrap();

        assert_eq!(
            backend.resolve_counter_range(&counters, 0..4).unwrap(),
            vec![0; 4]
        );
        backend.set_fail_counter_resolve(true);
        assert!(matches!(
            backend.resolve_counter_range(&counters, 0..4),
            Err(GraphicsError::CounterResolveFailed(_))
        ));
    }

    #[test]
    fn test_counters_unsupported_without_sampling_points() {
        let backend = DummyBackend::with_counter_support(CounterSamplingPoints::empty());
        assert!(matches!(
            backend.create_counter_buffer(&CounterBufferDescriptor::new(4)),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }
}

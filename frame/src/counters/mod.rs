//! GPU timestamp counter sampling.
//!
//! [`CounterSampler`] owns one timestamp counter buffer and hands out slot
//! ranges to passes that want to be timed. Ranges are interned by pass
//! label, so a pass recorded every frame reuses the same slots instead of
//! growing the buffer.
//!
//! ```text
//! counter buffer   [ 0 1 2 3 | 4 5 | 6 7 | 8 ...          ]
//!                    "scene"   "cull" "copy"  free
//!                    render    compute blit
//! ```
//!
//! Once the GPU has finished a frame, [`CounterSampler::resolve`] reads the
//! used slots back in one transfer and appends one [`CounterSampleReport`]
//! per measured interval to the shared [`CounterReportStore`]. Resolving is
//! the caller's job and must only happen from the frame's completion
//! handler; earlier reads see whatever the slots held before.
//!
//! A failed readback never aborts the frame loop. Every summary gets a
//! [`CounterReportKind::Miss`] report for that frame instead.

mod report;

pub use report::{CounterReportKind, CounterReportStore, CounterSampleReport, CounterSampleSummary};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{PassKind, TimestampWrites};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::CounterBuffer;
use crate::types::{CounterBufferDescriptor, CounterSamplingPoints};

#[derive(Debug, Default)]
struct SummaryTable {
    summaries: Vec<CounterSampleSummary>,
    by_label: HashMap<String, usize>,
    used_slots: u32,
}

struct SamplerShared {
    device: Arc<GraphicsDevice>,
    buffer: Arc<CounterBuffer>,
    supported: CounterSamplingPoints,
    period_ns: f64,
    table: Mutex<SummaryTable>,
    reports: Arc<CounterReportStore>,
}

/// Allocates timestamp slots to passes and resolves them into reports.
///
/// Cheap to clone. Clones share the summary table and report store, so one
/// clone can attach passes on the producer thread while another resolves on
/// the completion thread.
#[derive(Clone)]
pub struct CounterSampler {
    shared: Arc<SamplerShared>,
}

impl CounterSampler {
    /// Allocate a counter buffer with `capacity` timestamp slots.
    ///
    /// Fails with [`GraphicsError::FeatureNotSupported`] when the device
    /// cannot sample timestamps.
    pub fn build(device: &Arc<GraphicsDevice>, capacity: u32) -> Result<Self, GraphicsError> {
        let supported = device.counter_sampling_support();
        log::info!(
            "CounterSampler: device supports sampling at {:?}",
            supported.names()
        );

        let buffer = device.create_counter_buffer(
            &CounterBufferDescriptor::new(capacity).with_label("frame_counters"),
        )?;

        Ok(Self {
            shared: Arc::new(SamplerShared {
                device: Arc::clone(device),
                buffer,
                supported,
                period_ns: device.timestamp_period_ns(),
                table: Mutex::new(SummaryTable::default()),
                reports: Arc::new(CounterReportStore::new()),
            }),
        })
    }

    /// Slots for a render pass: vertex start/end, fragment start/end.
    pub fn attach_to_render_pass(&self, label: &str) -> TimestampWrites {
        self.attach(label, PassKind::Render)
    }

    /// Slots for a compute pass: start/end.
    pub fn attach_to_compute_pass(&self, label: &str) -> TimestampWrites {
        self.attach(label, PassKind::Compute)
    }

    /// Slots for a blit pass: start/end.
    pub fn attach_to_blit_pass(&self, label: &str) -> TimestampWrites {
        self.attach(label, PassKind::Blit)
    }

    fn attach(&self, label: &str, kind: PassKind) -> TimestampWrites {
        let mut table = self.shared.table.lock();

        if let Some(&index) = table.by_label.get(label) {
            let summary = &table.summaries[index];
            if summary.kind != kind {
                crate::fatal!(
                    "counter sampler: '{label}' already attached as a {} pass, requested as {}",
                    summary.kind.as_str(),
                    kind.as_str()
                );
            }
            return self.writes_for(summary);
        }

        let slot_count = kind.timestamp_slots();
        let capacity = self.capacity();
        if table.used_slots + slot_count > capacity {
            crate::fatal!(
                "counter sampler: '{label}' needs {slot_count} {} slots at {}, capacity {capacity}",
                kind.as_str(),
                table.used_slots
            );
        }

        let summary = CounterSampleSummary {
            id: table.summaries.len() as u32,
            label: label.to_string(),
            kind,
            start_index: table.used_slots,
            slot_count,
        };
        log::debug!(
            "CounterSampler: '{label}' ({}) gets slots {:?}",
            kind.as_str(),
            summary.range()
        );

        let index = table.summaries.len();
        table.used_slots += slot_count;
        table.by_label.insert(label.to_string(), index);
        let writes = self.writes_for(&summary);
        table.summaries.push(summary);
        writes
    }

    fn writes_for(&self, summary: &CounterSampleSummary) -> TimestampWrites {
        TimestampWrites {
            buffer: Arc::clone(&self.shared.buffer),
            start: summary.start_index,
            count: summary.slot_count,
        }
    }

    /// Read back every used slot and append reports tagged with `frame_id`.
    ///
    /// Returns the number of reports appended.
    pub fn resolve(&self, frame_id: u64) -> usize {
        crate::profile_function!();

        let (summaries, used_slots) = {
            let table = self.shared.table.lock();
            (table.summaries.clone(), table.used_slots)
        };
        if summaries.is_empty() {
            return 0;
        }

        let samples = if self.shared.supported.contains(CounterSamplingPoints::STAGE) {
            self.shared
                .device
                .resolve_counters(&self.shared.buffer, 0..used_slots)
                .and_then(|samples| {
                    if samples.len() < used_slots as usize {
                        Err(GraphicsError::CounterResolveFailed(format!(
                            "expected {used_slots} samples, got {}",
                            samples.len()
                        )))
                    } else {
                        Ok(samples)
                    }
                })
        } else {
            Err(GraphicsError::CounterResolveFailed(
                "device cannot sample at stage boundaries".to_string(),
            ))
        };

        let reports: Vec<CounterSampleReport> = match samples {
            Ok(samples) => summaries
                .iter()
                .flat_map(|summary| self.intervals(summary, &samples, frame_id))
                .collect(),
            Err(err) => {
                log::warn!(
                    "CounterSampler: frame {frame_id}: {err}, reporting {} misses",
                    summaries.len()
                );
                summaries
                    .iter()
                    .map(|summary| report(summary, frame_id, CounterReportKind::Miss, 0.0))
                    .collect()
            }
        };

        let count = reports.len();
        self.shared.reports.append(reports);
        log::trace!("CounterSampler: frame {frame_id} resolved {count} reports");
        count
    }

    fn intervals(
        &self,
        summary: &CounterSampleSummary,
        samples: &[u64],
        frame_id: u64,
    ) -> Vec<CounterSampleReport> {
        let base = summary.start_index as usize;
        let elapsed = |start: usize, end: usize| {
            samples[base + end].saturating_sub(samples[base + start]) as f64
                * self.shared.period_ns
                / 1_000_000.0
        };

        match summary.kind {
            PassKind::Render => vec![
                report(summary, frame_id, CounterReportKind::VertexTime, elapsed(0, 1)),
                report(summary, frame_id, CounterReportKind::FragmentTime, elapsed(2, 3)),
            ],
            PassKind::Compute => vec![report(
                summary,
                frame_id,
                CounterReportKind::ComputeTime,
                elapsed(0, 1),
            )],
            PassKind::Blit => vec![report(
                summary,
                frame_id,
                CounterReportKind::BlitTime,
                elapsed(0, 1),
            )],
        }
    }

    /// Every summary created so far, in attach order.
    pub fn summaries(&self) -> Vec<CounterSampleSummary> {
        self.shared.table.lock().summaries.clone()
    }

    /// Summary interned under `label`.
    pub fn summary(&self, label: &str) -> Option<CounterSampleSummary> {
        let table = self.shared.table.lock();
        table
            .by_label
            .get(label)
            .map(|&index| table.summaries[index].clone())
    }

    /// Number of slots handed out.
    pub fn used_slots(&self) -> u32 {
        self.shared.table.lock().used_slots
    }

    /// Total number of slots in the counter buffer.
    pub fn capacity(&self) -> u32 {
        self.shared.buffer.sample_count()
    }

    /// Sampling boundaries the device supports.
    pub fn supported_sampling_points(&self) -> CounterSamplingPoints {
        self.shared.supported
    }

    /// The shared report store.
    pub fn reports(&self) -> &Arc<CounterReportStore> {
        &self.shared.reports
    }
}

fn report(
    summary: &CounterSampleSummary,
    frame_id: u64,
    kind: CounterReportKind,
    interval_ms: f64,
) -> CounterSampleReport {
    CounterSampleReport {
        summary_id: summary.id,
        label: summary.label.clone(),
        frame_id,
        kind,
        interval_ms,
    }
}

impl std::fmt::Debug for CounterSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterSampler")
            .field("capacity", &self.capacity())
            .field("used_slots", &self.used_slots())
            .field("reports", &self.shared.reports.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(CounterSampler: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::command::PassDescriptor;

    fn sampler(capacity: u32) -> (Arc<GraphicsDevice>, CounterSampler) {
        let device = GraphicsDevice::dummy();
        let sampler = CounterSampler::build(&device, capacity).unwrap();
        (device, sampler)
    }

    /// Record and execute one pass per `(kind, writes)` on the device.
    fn run_passes(device: &GraphicsDevice, passes: &[(PassKind, &str, TimestampWrites)]) {
        let mut stream = device.create_command_stream("counters");
        for (kind, label, writes) in passes {
            stream.begin_pass(
                &PassDescriptor::new(*kind, *label).with_timestamps(Some(writes.clone())),
            );
            stream.insert_debug_marker("work");
            stream.end_pass();
        }
        stream.finish();
        device.submit(stream, Box::new(|_| {}));
        device.wait_idle();
    }

    #[test]
    fn test_attach_is_idempotent_per_label() {
        let (_device, sampler) = sampler(32);

        let first = sampler.attach_to_render_pass("scene");
        let again = sampler.attach_to_render_pass("scene");
        assert_eq!(first, again);
        assert_eq!(first.range(), 0..4);

        let cull = sampler.attach_to_compute_pass("cull");
        let copy = sampler.attach_to_blit_pass("copy");
        assert_eq!(cull.range(), 4..6);
        assert_eq!(copy.range(), 6..8);
        assert_eq!(sampler.used_slots(), 8);
        assert_eq!(sampler.summaries().len(), 3);
        assert_eq!(sampler.summary("cull").map(|s| s.id), Some(1));
        assert!(sampler.summary("missing").is_none());
    }

    #[test]
    fn test_clones_share_the_table() {
        let (_device, sampler) = sampler(8);
        let clone = sampler.clone();
        let writes = clone.attach_to_blit_pass("upload");
        assert_eq!(sampler.attach_to_blit_pass("upload"), writes);
        assert!(Arc::ptr_eq(sampler.reports(), clone.reports()));
    }

    #[test]
    #[should_panic(expected = "'late' needs 4 render slots at 6, capacity 8")]
    fn test_capacity_exhaustion_is_fatal() {
        let (_device, sampler) = sampler(8);
        sampler.attach_to_render_pass("early");
        sampler.attach_to_compute_pass("cull");
        sampler.attach_to_render_pass("late");
    }

    #[test]
    #[should_panic(expected = "already attached as a render pass")]
    fn test_kind_mismatch_is_fatal() {
        let (_device, sampler) = sampler(8);
        sampler.attach_to_render_pass("scene");
        sampler.attach_to_compute_pass("scene");
    }

    #[test]
    fn test_resolve_reports_per_kind() {
        let (device, sampler) = sampler(16);
        let scene = sampler.attach_to_render_pass("scene");
        let cull = sampler.attach_to_compute_pass("cull");
        run_passes(
            &device,
            &[(PassKind::Compute, "cull", cull), (PassKind::Render, "scene", scene)],
        );

        assert_eq!(sampler.resolve(7), 3);
        let reports = sampler.reports().snapshot();
        assert!(reports.iter().all(|r| r.frame_id == 7 && !r.is_miss()));

        let kinds: Vec<CounterReportKind> = reports.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            [
                CounterReportKind::VertexTime,
                CounterReportKind::FragmentTime,
                CounterReportKind::ComputeTime
            ]
        );

        // Dummy clock: 25_000 ns per command, pass spans marker + end.
        let compute = &reports[2];
        assert!((compute.interval_ms - 0.05).abs() < 1e-9);
        let vertex = &reports[0];
        let fragment = &reports[1];
        assert!((vertex.interval_ms + fragment.interval_ms - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_failure_yields_misses() {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(backend.clone());
        let sampler = CounterSampler::build(&device, 8).unwrap();
        sampler.attach_to_render_pass("scene");
        sampler.attach_to_blit_pass("copy");

        backend.set_fail_counter_resolve(true);
        assert_eq!(sampler.resolve(3), 2);

        let reports = sampler.reports().for_frame(3);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.is_miss() && r.interval_ms == 0.0));
    }

    #[test]
    fn test_missing_stage_boundary_yields_misses() {
        let backend = Arc::new(DummyBackend::with_counter_support(
            CounterSamplingPoints::DRAW,
        ));
        let device = GraphicsDevice::new(backend);
        let sampler = CounterSampler::build(&device, 8).unwrap();
        sampler.attach_to_compute_pass("cull");

        assert_eq!(sampler.resolve(0), 1);
        assert!(sampler.reports().snapshot()[0].is_miss());
    }

    #[test]
    fn test_build_without_counter_support() {
        let backend = Arc::new(DummyBackend::with_counter_support(
            CounterSamplingPoints::empty(),
        ));
        let device = GraphicsDevice::new(backend);
        assert!(matches!(
            CounterSampler::build(&device, 8),
            Err(GraphicsError::FeatureNotSupported(_))
        ));
    }

    #[test]
    fn test_rebuild_starts_empty() {
        let (device, first) = sampler(8);
        first.attach_to_render_pass("scene");
        first.resolve(0);

        let second = CounterSampler::build(&device, 8).unwrap();
        assert_eq!(second.used_slots(), 0);
        assert!(second.summaries().is_empty());
        assert!(second.reports().is_empty());
        assert_eq!(second.attach_to_compute_pass("cull").range(), 0..2);
    }

    #[test]
    fn test_resolve_without_summaries() {
        let (_device, sampler) = sampler(4);
        assert_eq!(sampler.resolve(0), 0);
        assert!(sampler.reports().is_empty());
    }
}

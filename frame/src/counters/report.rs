//! Counter sample summaries and reports.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::command::PassKind;

/// A labelled slot range in the counter buffer.
///
/// Created the first time a pass label requests sampling and reused for
/// every later request with the same label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSampleSummary {
    /// Sequential id, unique within one sampler.
    pub id: u32,
    /// Pass label the range was interned under.
    pub label: String,
    /// Kind of pass sampled into the range.
    pub kind: PassKind,
    /// First slot of the range.
    pub start_index: u32,
    /// Number of slots, fixed per kind.
    pub slot_count: u32,
}

impl CounterSampleSummary {
    /// Slot range covered by this summary.
    pub fn range(&self) -> std::ops::Range<u32> {
        self.start_index..self.start_index + self.slot_count
    }
}

/// What a report measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterReportKind {
    /// Vertex stage of a render pass.
    VertexTime,
    /// Fragment stage of a render pass.
    FragmentTime,
    /// Whole compute pass.
    ComputeTime,
    /// Whole blit pass.
    BlitTime,
    /// Timestamps could not be read for this frame.
    Miss,
}

impl CounterReportKind {
    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VertexTime => "vertex",
            Self::FragmentTime => "fragment",
            Self::ComputeTime => "compute",
            Self::BlitTime => "blit",
            Self::Miss => "miss",
        }
    }
}

/// One resolved measurement, immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSampleReport {
    /// Id of the [`CounterSampleSummary`] this was resolved from.
    pub summary_id: u32,
    /// Pass label of that summary.
    pub label: String,
    /// Frame the measurement belongs to.
    pub frame_id: u64,
    pub kind: CounterReportKind,
    /// Elapsed GPU time. Zero for [`CounterReportKind::Miss`].
    pub interval_ms: f64,
}

impl CounterSampleReport {
    pub fn is_miss(&self) -> bool {
        self.kind == CounterReportKind::Miss
    }
}

/// Append-only store of reports, shared between the completion thread and
/// readers.
///
/// Reports stay in the store until a consumer drains or clears it.
#[derive(Debug, Default)]
pub struct CounterReportStore {
    reports: Mutex<Vec<CounterSampleReport>>,
}

impl CounterReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of reports under one lock.
    pub fn append(&self, reports: impl IntoIterator<Item = CounterSampleReport>) {
        self.reports.lock().extend(reports);
    }

    /// Take every report out of the store.
    pub fn drain(&self) -> Vec<CounterSampleReport> {
        std::mem::take(&mut *self.reports.lock())
    }

    /// Copy of every report currently stored.
    pub fn snapshot(&self) -> Vec<CounterSampleReport> {
        self.reports.lock().clone()
    }

    /// Reports tagged with `frame_id`.
    pub fn for_frame(&self, frame_id: u64) -> Vec<CounterSampleReport> {
        self.reports
            .lock()
            .iter()
            .filter(|report| report.frame_id == frame_id)
            .cloned()
            .collect()
    }

    /// Reports of one summary, grouped by kind, each group in append order.
    pub fn by_summary_grouped(
        &self,
        summary_id: u32,
    ) -> BTreeMap<CounterReportKind, Vec<CounterSampleReport>> {
        let mut grouped: BTreeMap<CounterReportKind, Vec<CounterSampleReport>> = BTreeMap::new();
        for report in self
            .reports
            .lock()
            .iter()
            .filter(|report| report.summary_id == summary_id)
        {
            grouped.entry(report.kind).or_default().push(report.clone());
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

static_assertions::assert_impl_all!(CounterReportStore: Send, Sync);

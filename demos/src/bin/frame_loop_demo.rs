//! # Frame Loop Demo
//!
//! Demonstrates:
//! - Backend selection with fallback to the dummy backend
//! - Frames in flight bounded by the frame pacer
//! - Per-frame shared/private arenas and a three-pass graph
//! - GPU timing reports resolved on the completion thread
//!
//! Runs headless for `--frames` frames, then prints per-pass timings and
//! arena usage.

use std::collections::BTreeMap;

use clap::Parser;
use lumen_demos::args::DemoArgs;
use lumen_demos::scene;
use lumen_frame::{CounterReportKind, FramePipeline, GraphicsDevice, GraphicsError};

const INSTANCE_COUNT: usize = 256;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    lumen_frame::init();
    lumen_frame::profiling::start();

    let args = DemoArgs::parse();
    if let Err(err) = run(&args) {
        log::error!("frame_loop_demo failed: {err}");
        std::process::exit(1);
    }
}

fn run(args: &DemoArgs) -> Result<(), GraphicsError> {
    let device = GraphicsDevice::create(args.backend.into())?;
    let mut pipeline = FramePipeline::new(device, args.frame_env())?;

    log::info!(
        "Running {} frames on {} ({} in flight)",
        args.frames,
        pipeline.device().name(),
        args.frames_in_flight
    );

    for _ in 0..args.frames {
        let mut frame = pipeline.begin_frame();
        scene::record(&mut frame, INSTANCE_COUNT);
        frame.submit();
    }
    pipeline.wait_idle();

    report(&pipeline);
    Ok(())
}

fn report(pipeline: &FramePipeline) {
    let stats = pipeline.stats();
    if let Some(average) = stats.average_gpu_time_ms() {
        log::info!(
            "GPU time over the last {} frames: {average:.3} ms average",
            stats.len()
        );
    }

    let context = pipeline.context();
    for index in 0..context.frames_in_flight() {
        if let Some(pair) = context.allocators(index) {
            log::info!(
                "Arena pair {index}: shared peak {} / {} B, private peak {} / {} B",
                pair.shared.high_water_mark(),
                pair.shared.capacity(),
                pair.private.high_water_mark(),
                pair.private.capacity()
            );
        }
    }

    let Some(sampler) = pipeline.sampler() else {
        log::info!("GPU timing unavailable on this device");
        return;
    };

    let reports = sampler.reports().drain();
    let misses = reports.iter().filter(|r| r.is_miss()).count();
    let mut totals: BTreeMap<(String, CounterReportKind), (f64, u32)> = BTreeMap::new();
    for report in reports.iter().filter(|r| !r.is_miss()) {
        let entry = totals
            .entry((report.label.clone(), report.kind))
            .or_insert((0.0, 0));
        entry.0 += report.interval_ms;
        entry.1 += 1;
    }

    for ((label, kind), (total, count)) in &totals {
        log::info!(
            "{label:>8} {:<8} {:.4} ms average over {count} frames",
            kind.as_str(),
            total / f64::from(*count)
        );
    }
    if misses > 0 {
        log::warn!("{misses} counter samples could not be resolved");
    }
}

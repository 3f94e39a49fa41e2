//! A small animated scene recorded into one frame.
//!
//! Every frame uploads instance data through the shared arena, copies it
//! into the private arena, culls it in a compute pass and draws it in a
//! render pass:
//!
//! ```text
//! upload (blit) ──► cull (compute) ──► scene (render)
//! ```

use bytemuck::{Pod, Zeroable};
use lumen_frame::{BlitPass, ComputePass, Frame, PassKind, RenderPass};

/// Per-instance data written by the CPU every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Instance {
    pub offset: [f32; 2],
    pub scale: f32,
    pub phase: f32,
}

/// Per-frame constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub time: f32,
    pub instance_count: u32,
    pub _pad: [u32; 2],
}

/// Instance layout for frame `frame_number`, animated over time.
pub fn instances(frame_number: u64, count: usize) -> Vec<Instance> {
    let time = frame_number as f32 / 60.0;
    (0..count)
        .map(|i| {
            let phase = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
            Instance {
                offset: [(time + phase).cos() * 0.5, (time + phase).sin() * 0.5],
                scale: 0.05 + 0.02 * (time * 2.0 + phase).sin(),
                phase,
            }
        })
        .collect()
}

/// Record the scene's passes into `frame`.
pub fn record(frame: &mut Frame<'_>, instance_count: usize) {
    let frame_number = frame.frame_number();
    let data = instances(frame_number, instance_count);

    let uniforms = frame.shared().allocate_with(&FrameUniforms {
        time: frame_number as f32 / 60.0,
        instance_count: instance_count as u32,
        _pad: [0; 2],
    });
    let staging = frame.shared().allocate_slice(&data);
    let resident = frame.private().allocate(staging.size());
    let visible = frame.private().allocate_typed::<u32>(instance_count);

    let sampler = frame.sampler().cloned();
    let timing = |kind: PassKind, label: &str| {
        sampler.as_ref().map(|sampler| match kind {
            PassKind::Render => sampler.attach_to_render_pass(label),
            PassKind::Compute => sampler.attach_to_compute_pass(label),
            PassKind::Blit => sampler.attach_to_blit_pass(label),
        })
    };

    let mut upload = BlitPass::new("upload", move |stream| {
        stream.copy_region(&staging, &resident);
    });
    let mut cull = ComputePass::new("cull", move |stream| {
        stream.insert_debug_marker(format!(
            "cull {} instances into [{}, {})",
            instance_count,
            visible.begin(),
            visible.end()
        ));
    });
    let mut scene = RenderPass::new("scene", move |stream| {
        let binding = uniforms.binding(0);
        stream.insert_debug_marker(format!("draw with uniforms at {}", binding.offset));
    });

    if let Some(writes) = timing(PassKind::Blit, "upload") {
        upload = upload.with_timestamps(writes);
    }
    if let Some(writes) = timing(PassKind::Compute, "cull") {
        cull = cull.with_timestamps(writes);
    }
    if let Some(writes) = timing(PassKind::Render, "scene") {
        scene = scene.with_timestamps(writes);
    }

    let graph = frame.graph();
    let upload = graph.register_node(upload, &[]);
    let cull = graph.register_node(cull, &[upload]);
    graph.register_node(scene, &[cull]);
}

//! Pipeline orchestration.
//!
//! `process_video` wires the stages end to end: probe, mask build, execution
//! planning, the overlapped decode/restore/composite/encode loop, and the
//! encoder-probe-and-remux post-pass. Telemetry flows through the event
//! dispatcher; all fatal errors propagate to the caller after scoped
//! resources are released.

use std::path::PathBuf;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventDispatcher};
use crate::external::{self, VideoDecoder, VideoEncoder};
use crate::hardware::Device;
use crate::mask::Mask;
use crate::models::{ModelProvider, ModelRegistry};
use crate::progress::ProgressTracker;
use crate::remux;
use crate::restore::build_restorer;
use crate::temp_files::{sibling_temp_path, TempArtifact};

pub mod batch;
pub mod composite;

use batch::{run_batches, BatchPlan};
use composite::composite_batch;

/// Removes the configured regions from every frame of the input and writes
/// the result, remuxed with the source audio when possible. Returns the
/// final output path.
pub fn process_video(config: &CoreConfig, events: &EventDispatcher) -> CoreResult<PathBuf> {
    config.validate()?;
    if !config.input_path.exists() {
        return Err(CoreError::InputNotFound(
            config.input_path.display().to_string(),
        ));
    }
    external::check_dependency("ffmpeg")?;
    external::check_dependency("ffprobe")?;
    if let Some(parent) = config.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let meta = external::probe_video(&config.input_path)?;
    let mask = Mask::build(&config.regions, meta.width, meta.height);
    if mask.is_blank() {
        log::warn!("Region list produces an empty mask; output will equal input");
    }

    let device = Device::detect();
    let plan = BatchPlan::new(device, config.batch_size);
    events.emit(Event::EngineStarted {
        device: device.as_str().to_string(),
        precision: plan.precision.as_str().to_string(),
        batch_size: plan.batch_size,
    });
    events.emit(Event::SourceOpened {
        total_frames: meta.declared_frames,
        fps: meta.fps,
        resolution: meta.resolution(),
        algorithm: config.algorithm.to_string(),
    });

    let provider = ModelProvider::new(
        ModelRegistry::builtin().clone(),
        config.model_cache_dir.clone(),
    );
    let restorer = build_restorer(config.algorithm, config.inpaint_radius, &provider, events)?;

    // The sink writes a video-only intermediate next to the final output;
    // the guard removes it on every failure path before this function
    // returns.
    let intermediate = TempArtifact::new(sibling_temp_path(&config.output_path, "video", "mp4"));

    let decoder = VideoDecoder::open(&config.input_path)?;
    let mut sink = VideoEncoder::open(intermediate.path(), meta.width, meta.height, meta.fps)?;
    let mut tracker = ProgressTracker::new(meta.declared_frames, plan.batch_size);

    let processed = run_batches(
        decoder,
        &plan,
        restorer.as_ref(),
        &mask,
        |frames, restored| {
            let composited = composite_batch(&frames, &restored, &mask);
            for frame in &composited {
                sink.write_frame(frame)?;
            }
            if let Some(event) = tracker.advance(frames.len() as u64) {
                events.emit(event);
            }
            Ok(())
        },
    )?;

    if processed == 0 {
        return Err(CoreError::Decode(
            "source contained no decodable frames".to_string(),
        ));
    }
    if meta.declared_frames != 0 && processed != meta.declared_frames {
        log::warn!(
            "Declared frame count {} differs from decoded {}",
            meta.declared_frames,
            processed
        );
    }

    events.emit(tracker.finish());

    // The sink must be fully closed before the remux stage reads the file.
    let video_only = sink.finish()?;

    let final_path = remux::run_remux_stage(
        &config.input_path,
        &video_only,
        &config.output_path,
        config.quality,
    )?;
    // The remux stage consumed or promoted the intermediate.
    let _ = intermediate.keep();

    events.emit(Event::Complete {
        output: final_path.clone(),
    });
    Ok(final_path)
}

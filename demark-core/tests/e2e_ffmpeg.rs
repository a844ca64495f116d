//! End-to-end run over a real ffmpeg-generated clip. All tests skip quietly
//! when ffmpeg/ffprobe are not installed.

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use demark_core::{
    process_video, Algorithm, CoreConfig, Event, EventDispatcher, EventHandler, Region,
};
use tempfile::tempdir;

fn tools_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

/// Generates a short synthetic test clip.
fn create_test_video(path: &Path, frames: u32) -> Result<(), Box<dyn std::error::Error>> {
    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={}:size=128x96:rate=10", frames as f32 / 10.0),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            path.to_str().unwrap(),
        ])
        .output()?;
    if !status.status.success() {
        return Err("failed to create test video".into());
    }
    Ok(())
}

/// Captures every event for later assertions.
#[derive(Default)]
struct CollectingHandler {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventHandler for CollectingHandler {
    fn handle(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[test]
fn test_process_video_end_to_end() {
    if !tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }

    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("cleaned.mp4");
    create_test_video(&input, 20).unwrap();

    let mut config = CoreConfig::new(input.clone(), output.clone());
    config.regions = vec![Region {
        x: 16,
        y: 16,
        width: 48,
        height: 24,
    }];
    config.algorithm = Algorithm::Telea;
    config.batch_size = Some(6);

    let collected = Arc::new(Mutex::new(Vec::new()));
    let mut events = EventDispatcher::new();
    events.add_handler(Arc::new(CollectingHandler {
        events: collected.clone(),
    }));

    let final_path = process_video(&config, &events).unwrap();
    assert_eq!(final_path, output);
    assert!(output.exists());
    assert!(std::fs::metadata(&output).unwrap().len() > 0);

    // No intermediate artifacts may survive next to the output.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".video_"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");

    let events = collected.lock().unwrap();

    // Startup info events come first: engine plan, then source description.
    assert!(matches!(events[0], Event::EngineStarted { .. }));
    assert!(matches!(events[1], Event::SourceOpened { .. }));

    // Progress is monotonic and ends at 100 with total == current.
    let progress: Vec<(u64, u64, u32)> = events
        .iter()
        .filter_map(|event| match event {
            Event::Progress {
                current_frame,
                total_frames,
                progress,
                ..
            } => Some((*current_frame, *total_frames, *progress)),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    for window in progress.windows(2) {
        assert!(window[1].2 >= window[0].2, "progress regressed: {progress:?}");
    }
    let (final_current, final_total, final_percent) = *progress.last().unwrap();
    assert_eq!(final_percent, 100);
    assert_eq!(final_current, final_total);

    // Exactly one completion event, carrying the final path.
    let completions: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, Event::Complete { .. }))
        .collect();
    assert_eq!(completions.len(), 1);
    match completions[0] {
        Event::Complete { output: path } => assert_eq!(path, &output),
        _ => unreachable!(),
    }
}

#[test]
fn test_missing_input_is_fatal_before_any_work() {
    let dir = tempdir().unwrap();
    let mut config = CoreConfig::new(
        dir.path().join("no-such-input.mp4"),
        dir.path().join("out.mp4"),
    );
    config.regions = vec![];

    let events = EventDispatcher::new();
    let err = process_video(&config, &events).unwrap_err();
    assert!(matches!(err, demark_core::CoreError::InputNotFound(_)));
    assert!(!dir.path().join("out.mp4").exists());
}

#[test]
fn test_empty_region_list_passes_frames_through() {
    if !tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }

    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("untouched.mp4");
    create_test_video(&input, 10).unwrap();

    let mut config = CoreConfig::new(input, output.clone());
    config.regions = vec![];

    let events = EventDispatcher::new();
    let final_path = process_video(&config, &events).unwrap();
    assert_eq!(final_path, output);
    assert!(output.exists());
}

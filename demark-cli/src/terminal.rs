// demark-cli/src/terminal.rs
//
// Interactive progress rendering for --pretty runs: a frame-count progress
// bar plus styled status lines, in place of the JSON telemetry stream.

use std::sync::Mutex;

use console::style;
use demark_core::{Event, EventHandler};
use indicatif::{ProgressBar, ProgressStyle};

pub struct TerminalEventHandler {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalEventHandler {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn frame_bar(total: u64) -> ProgressBar {
        let bar = if total > 0 {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {pos}/{len} frames [{elapsed_precise}, {msg}]",
                )
                .unwrap()
                .progress_chars("##-"),
            );
            bar
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {pos} frames [{elapsed_precise}, {msg}]")
                    .unwrap(),
            );
            bar
        };
        bar
    }
}

impl EventHandler for TerminalEventHandler {
    fn handle(&self, event: &Event) {
        match event {
            Event::EngineStarted {
                device,
                precision,
                batch_size,
            } => {
                eprintln!(
                    "{} device {}, precision {}, batch size {}",
                    style("Engine:").bold(),
                    style(device).cyan(),
                    precision,
                    batch_size
                );
            }

            Event::SourceOpened {
                total_frames,
                fps,
                resolution,
                algorithm,
            } => {
                eprintln!(
                    "{} {} @ {:.2} fps, {} declared frames, algorithm {}",
                    style("Source:").bold(),
                    resolution,
                    fps,
                    total_frames,
                    style(algorithm).cyan()
                );
                let mut guard = self.bar.lock().unwrap();
                *guard = Some(Self::frame_bar(*total_frames));
            }

            Event::Progress {
                current_frame,
                total_frames,
                fps_speed,
                ..
            } => {
                let guard = self.bar.lock().unwrap();
                if let Some(bar) = guard.as_ref() {
                    if bar.length().unwrap_or(0) != *total_frames && *total_frames > 0 {
                        bar.set_length(*total_frames);
                    }
                    bar.set_position(*current_frame);
                    bar.set_message(format!("{fps_speed:.1} fps"));
                }
            }

            Event::DownloadProgress {
                algorithm,
                progress,
                downloaded_mb,
                total_mb,
            } => {
                eprintln!(
                    "{} {} checkpoint {}% ({:.1}/{:.1} MB)",
                    style("Download:").bold(),
                    algorithm,
                    progress,
                    downloaded_mb,
                    total_mb
                );
            }

            Event::Error { message } => {
                let guard = self.bar.lock().unwrap();
                if let Some(bar) = guard.as_ref() {
                    bar.abandon();
                }
                eprintln!("{} {}", style("Error:").red().bold(), message);
            }

            Event::Complete { output } => {
                let mut guard = self.bar.lock().unwrap();
                if let Some(bar) = guard.take() {
                    bar.finish_and_clear();
                }
                eprintln!(
                    "{} wrote {}",
                    style("Done:").green().bold(),
                    output.display()
                );
            }
        }
    }
}

impl Default for TerminalEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

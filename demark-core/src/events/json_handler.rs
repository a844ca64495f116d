//! JSON telemetry handler for structured progress output
//!
//! This module provides a JSON-based event handler that writes one structured
//! record per line to stdout for consumption by a supervising process.

use super::{Event, EventHandler};
use serde_json::json;
use std::io::{self, Write};
use std::sync::Mutex;

/// Event handler that outputs pipeline events as line-delimited JSON
pub struct JsonEventHandler {
    output: Mutex<Box<dyn Write + Send>>,
}

impl JsonEventHandler {
    /// Create a new JSON event handler that writes to stdout
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Create a new JSON event handler with a custom writer
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Mutex::new(writer),
        }
    }

    /// Write a JSON record to the output, followed by a newline
    fn write_json(&self, value: serde_json::Value) {
        if let Ok(mut output) = self.output.lock() {
            if let Ok(json_str) = serde_json::to_string(&value) {
                let _ = writeln!(output, "{}", json_str);
                let _ = output.flush();
            }
        }
    }
}

impl EventHandler for JsonEventHandler {
    fn handle(&self, event: &Event) {
        match event {
            Event::EngineStarted {
                device,
                precision,
                batch_size,
            } => {
                self.write_json(json!({
                    "type": "info",
                    "message": format!(
                        "Engine started. Device: {}, Batch: {}, Precision: {}",
                        device, batch_size, precision
                    ),
                    "device": device,
                    "precision": precision,
                    "batch_size": batch_size,
                }));
            }

            Event::SourceOpened {
                total_frames,
                fps,
                resolution,
                algorithm,
            } => {
                self.write_json(json!({
                    "type": "info",
                    "total_frames": total_frames,
                    "fps": fps,
                    "resolution": resolution,
                    "algorithm": algorithm,
                }));
            }

            Event::Progress {
                current_frame,
                total_frames,
                progress,
                fps_speed,
            } => {
                self.write_json(json!({
                    "type": "progress",
                    "current_frame": current_frame,
                    "total_frames": total_frames,
                    "progress": progress,
                    "fps_speed": fps_speed,
                }));
            }

            Event::DownloadProgress {
                algorithm,
                progress,
                downloaded_mb,
                total_mb,
            } => {
                self.write_json(json!({
                    "type": "download_progress",
                    "algorithm": algorithm,
                    "progress": progress,
                    "downloaded_mb": downloaded_mb,
                    "total_mb": total_mb,
                }));
            }

            Event::Error { message } => {
                self.write_json(json!({
                    "type": "error",
                    "message": message,
                }));
            }

            Event::Complete { output } => {
                self.write_json(json!({
                    "type": "complete",
                    "output": output.display().to_string(),
                }));
            }
        }
    }
}

impl Default for JsonEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct MockWriter {
        content: Arc<Mutex<Vec<u8>>>,
    }

    impl MockWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let content = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    content: content.clone(),
                },
                content,
            )
        }
    }

    impl Write for MockWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.content.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn emit_and_parse(event: Event) -> serde_json::Value {
        let (writer, content) = MockWriter::new();
        let handler = JsonEventHandler::with_writer(Box::new(writer));
        handler.handle(&event);
        let output = String::from_utf8(content.lock().unwrap().clone()).unwrap();
        serde_json::from_str(output.trim()).unwrap()
    }

    #[test]
    fn test_progress_json() {
        let parsed = emit_and_parse(Event::Progress {
            current_frame: 240,
            total_frames: 960,
            progress: 25,
            fps_speed: 31.5,
        });

        assert_eq!(parsed["type"], "progress");
        assert_eq!(parsed["current_frame"], 240);
        assert_eq!(parsed["total_frames"], 960);
        assert_eq!(parsed["progress"], 25);
        assert_eq!(parsed["fps_speed"], 31.5);
    }

    #[test]
    fn test_info_records() {
        let engine = emit_and_parse(Event::EngineStarted {
            device: "cpu".to_string(),
            precision: "fp32".to_string(),
            batch_size: 4,
        });
        assert_eq!(engine["type"], "info");
        assert_eq!(engine["device"], "cpu");
        assert_eq!(engine["batch_size"], 4);

        let source = emit_and_parse(Event::SourceOpened {
            total_frames: 300,
            fps: 29.97,
            resolution: "1280x720".to_string(),
            algorithm: "telea".to_string(),
        });
        assert_eq!(source["type"], "info");
        assert_eq!(source["resolution"], "1280x720");
        assert_eq!(source["algorithm"], "telea");
    }

    #[test]
    fn test_terminal_records() {
        let error = emit_and_parse(Event::Error {
            message: "decode failed".to_string(),
        });
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "decode failed");

        let complete = emit_and_parse(Event::Complete {
            output: PathBuf::from("/tmp/out.mp4"),
        });
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["output"], "/tmp/out.mp4");
    }

    #[test]
    fn test_download_progress_json() {
        let parsed = emit_and_parse(Event::DownloadProgress {
            algorithm: "lama".to_string(),
            progress: 42,
            downloaded_mb: 84.0,
            total_mb: 200.0,
        });
        assert_eq!(parsed["type"], "download_progress");
        assert_eq!(parsed["algorithm"], "lama");
        assert_eq!(parsed["progress"], 42);
    }
}

//! Sequential rawvideo decoder.
//!
//! An ffmpeg child decodes the input to interleaved rgb24 on a pipe and this
//! module surfaces it as a lazy, non-restartable sequence of frames in
//! capture order. End-of-stream is distinct from failure to open: a spawn or
//! probe error is fatal, while a mid-stream decode error stops the sequence
//! cleanly after the frames that did arrive (container frame counts lie).

use std::path::Path;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::processing::batch::FrameSource;

/// Streaming decoder over an ffmpeg child process.
pub struct VideoDecoder {
    child: FfmpegChild,
    events: FfmpegIterator,
    next_index: u64,
    produced: u64,
    last_error: Option<String>,
}

impl VideoDecoder {
    /// Spawns the decode leg for the given input.
    pub fn open(input_path: &Path) -> CoreResult<Self> {
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner()
            .input(input_path.to_string_lossy().as_ref())
            .rawvideo();

        log::debug!("Spawning decoder: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| {
            CoreError::CommandStart("ffmpeg (decode)".to_string(), e.to_string())
        })?;
        let events = child
            .iter()
            .map_err(|e| CoreError::Decode(format!("failed to attach to decoder output: {e}")))?;

        Ok(Self {
            child,
            events,
            next_index: 0,
            produced: 0,
            last_error: None,
        })
    }
}

impl FrameSource for VideoDecoder {
    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        for event in self.events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(frame) => {
                    let expected = Frame::byte_len(frame.width, frame.height);
                    if frame.data.len() != expected {
                        return Err(CoreError::Decode(format!(
                            "frame {} has {} bytes, expected {} for {}x{} rgb24",
                            self.next_index,
                            frame.data.len(),
                            expected,
                            frame.width,
                            frame.height
                        )));
                    }
                    let index = self.next_index;
                    self.next_index += 1;
                    self.produced += 1;
                    return Ok(Some(Frame {
                        index,
                        width: frame.width,
                        height: frame.height,
                        data: frame.data,
                    }));
                }
                FfmpegEvent::Error(message)
                | FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, message) => {
                    log::warn!("Decoder reported: {}", message);
                    self.last_error = Some(message);
                }
                _ => {}
            }
        }

        if self.produced == 0 {
            // Nothing ever decoded: the input is unreadable, not short.
            let detail = self
                .last_error
                .take()
                .unwrap_or_else(|| "decoder produced no frames".to_string());
            return Err(CoreError::Decode(detail));
        }
        Ok(None)
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        // Stop and reap the child on every exit path, including early
        // abandonment when a downstream stage fails.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

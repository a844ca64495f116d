//! Sequential rawvideo encoder for the video-only intermediate.
//!
//! Composited frames are streamed in order into an ffmpeg child's stdin and
//! encoded at the source resolution and frame rate. The sink is single-writer
//! and must be closed through [`VideoEncoder::finish`] before the remux stage
//! may touch the file; a sink that is dropped without finishing kills its
//! child so no open writer handle survives an error path.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ChildStdin;

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;

/// Encode settings for the intermediate: near-lossless so the remux stage's
/// re-encode is the only generation loss that can matter.
const INTERMEDIATE_ARGS: [&str; 6] = ["-preset", "veryfast", "-crf", "15", "-pix_fmt", "yuv420p"];

/// Streaming encoder over an ffmpeg child process.
pub struct VideoEncoder {
    child: FfmpegChild,
    stdin: Option<BufWriter<ChildStdin>>,
    output_path: PathBuf,
    frame_len: usize,
    frames_written: u64,
}

impl VideoEncoder {
    /// Spawns the encode leg writing a video-only container.
    pub fn open(output_path: &Path, width: u32, height: u32, fps: f64) -> CoreResult<Self> {
        let mut cmd = FfmpegCommand::new();
        cmd.hide_banner()
            .overwrite()
            .format("rawvideo")
            .pix_fmt("rgb24")
            .size(width, height)
            .rate(fps as f32)
            .input("-")
            .codec_video("libx264")
            .args(INTERMEDIATE_ARGS)
            .output(output_path.to_string_lossy().as_ref());

        log::debug!("Spawning encoder: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| {
            CoreError::CommandStart("ffmpeg (encode)".to_string(), e.to_string())
        })?;
        let stdin = child
            .take_stdin()
            .ok_or_else(|| CoreError::Encode("encoder stdin unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            output_path: output_path.to_path_buf(),
            frame_len: Frame::byte_len(width, height),
            frames_written: 0,
        })
    }

    /// Appends one composited frame. Frames must arrive in output order.
    pub fn write_frame(&mut self, frame: &Frame) -> CoreResult<()> {
        if frame.data.len() != self.frame_len {
            return Err(CoreError::Encode(format!(
                "frame {} has {} bytes, sink expects {}",
                frame.index,
                frame.data.len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CoreError::Encode("sink already closed".to_string()))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| CoreError::Encode(format!("writing frame {}: {}", frame.index, e)))?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flushes, closes stdin, and waits for the encoder to exit. Consumes the
    /// sink so nothing can write after the container is finalized.
    pub fn finish(mut self) -> CoreResult<PathBuf> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| CoreError::Encode("sink already closed".to_string()))?;
        stdin
            .flush()
            .map_err(|e| CoreError::Encode(format!("flushing sink: {e}")))?;
        // Dropping stdin signals end-of-stream to the encoder.
        drop(stdin);

        let status = self
            .child
            .wait()
            .map_err(|e| CoreError::Encode(format!("waiting for encoder: {e}")))?;
        if !status.success() {
            return Err(CoreError::Encode(format!(
                "encoder exited with {} after {} frames",
                status, self.frames_written
            )));
        }
        log::debug!(
            "Encoder finalized {} ({} frames)",
            self.output_path.display(),
            self.frames_written
        );
        Ok(self.output_path.clone())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        // A sink dropped before finish() is an aborted run: kill the child so
        // the half-written file is not held open, and reap it either way.
        if self.stdin.is_some() {
            self.stdin = None;
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

// ============================================================================
// demark-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with ffmpeg and ffprobe
//
// This module encapsulates every interaction with the external media tools:
// stream metadata probing, the rawvideo decode leg, and the rawvideo encode
// leg. The default implementations use the ffmpeg-sidecar and ffprobe crates;
// the pipeline seams (FrameSource, frame sink) stay trait-shaped so tests can
// substitute synthetic implementations.

use std::io;
use std::process::{Command, Stdio};

use crate::error::{CoreError, CoreResult};

/// Contains the sequential rawvideo decoder (FrameSource implementation)
pub mod decoder;

/// Contains the sequential rawvideo encoder writing the video-only output
pub mod encoder;

/// Contains stream metadata probing via ffprobe
pub mod probe;

pub use decoder::VideoDecoder;
pub use encoder::VideoEncoder;
pub use probe::{probe_video, VideoMeta};

/// Checks if a required external command is available and executable.
///
/// Runs the command with `-version` and discards all output; only the fact
/// that the process could start matters.
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{}' not found.", cmd_name);
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check '{}': {}", cmd_name, e);
            Err(CoreError::CommandStart(cmd_name.to_string(), e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dependency_missing_tool() {
        let err = check_dependency("demark-no-such-binary").unwrap_err();
        assert!(matches!(err, CoreError::DependencyNotFound(_)));
    }
}

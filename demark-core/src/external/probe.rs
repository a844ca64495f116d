//! Stream metadata probing via the ffprobe crate.
//!
//! The declared frame count is metadata and may disagree with what the
//! decoder actually produces; callers treat it as a hint. A container that
//! reports neither `nb_frames` nor a duration yields a declared count of
//! zero (unknown).

use std::path::Path;

use ffprobe::ffprobe;

use crate::error::{CoreError, CoreResult};

/// Properties of the input video stream, as declared by its container.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Declared frame count; 0 when the container does not say.
    pub declared_frames: u64,
}

impl VideoMeta {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Probes the first video stream of the input.
pub fn probe_video(input_path: &Path) -> CoreResult<VideoMeta> {
    log::debug!(
        "Running ffprobe (via crate) for video properties on: {}",
        input_path.display()
    );
    let metadata = ffprobe(input_path)
        .map_err(|err| CoreError::Probe(format!("{}: {:?}", input_path.display(), err)))?;

    let video_stream = metadata
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            CoreError::Probe(format!(
                "No video stream found in {}",
                input_path.display()
            ))
        })?;

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(CoreError::Probe(format!(
            "Invalid dimensions {}x{} in {}",
            width,
            height,
            input_path.display()
        )));
    }

    let fps = parse_frame_rate(&video_stream.avg_frame_rate)
        .or_else(|| parse_frame_rate(&video_stream.r_frame_rate))
        .ok_or_else(|| {
            CoreError::Probe(format!(
                "Could not determine frame rate of {}",
                input_path.display()
            ))
        })?;

    let declared_frames = video_stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| {
            // Fall back to duration * fps when the container omits nb_frames.
            metadata
                .format
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
                .map(|secs| (secs * fps).round() as u64)
        })
        .unwrap_or(0);

    Ok(VideoMeta {
        width: width as u32,
        height: height as u32,
        fps,
        declared_frames,
    })
}

/// Checks whether the input carries at least one audio stream.
pub fn has_audio_stream(input_path: &Path) -> bool {
    match ffprobe(input_path) {
        Ok(metadata) => metadata
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
        Err(err) => {
            log::warn!(
                "ffprobe failed while checking audio streams of {}: {:?}",
                input_path.display(),
                err
            );
            false
        }
    }
}

/// Parses an ffprobe rational frame rate such as "30000/1001" or "25".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value = if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        raw.parse().ok()?
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate_rational() {
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("24"), Some(24.0));
    }

    #[test]
    fn test_parse_frame_rate_rejects_degenerate() {
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("0"), None);
        assert_eq!(parse_frame_rate(""), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_probe_missing_file_is_an_error() {
        let err = probe_video(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(matches!(err, CoreError::Probe(_)));
    }
}

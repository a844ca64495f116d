// ============================================================================
// demark-core/src/remux/mod.rs
// ============================================================================
//
// ENCODER PROBE & REMUX: Final-pass hardware encode with audio recovery
//
// After the frame sink closes, this stage re-encodes the video-only
// intermediate with the best available encoder and muxes the original audio
// track back in. Hardware encoders are probed in priority order with a tiny
// smoke encode under a strict timeout; the software profile is always viable
// and never probed. The whole pass is a small explicit state machine:
//
//   Probing -> Selected -> Remuxing -> { Finalized | DegradedVideoOnly }
//
// Both terminal states are success from the caller's perspective: a failed
// remux merely promotes the video-only intermediate, losing audio but never
// frames. The probe and exec seams are traits so the degradation path is
// testable without real hardware.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::Quality;
use crate::error::{CoreError, CoreResult};

/// Probe timeout; hardware encoders that wedge count as absent.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting on a probe child.
const PROBE_POLL: Duration = Duration::from_millis(50);

/// The hardware encoders worth trying, most preferred first.
pub const HARDWARE_PROFILES: [EncoderProfile; 4] = [
    EncoderProfile {
        name: "h264_videotoolbox",
        kind: EncoderKind::VideoToolbox,
    },
    EncoderProfile {
        name: "h264_nvenc",
        kind: EncoderKind::Nvenc,
    },
    EncoderProfile {
        name: "h264_amf",
        kind: EncoderKind::Amf,
    },
    EncoderProfile {
        name: "h264_qsv",
        kind: EncoderKind::Qsv,
    },
];

/// The always-available fallback.
pub const SOFTWARE_PROFILE: EncoderProfile = EncoderProfile {
    name: "libx264",
    kind: EncoderKind::Software,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    VideoToolbox,
    Nvenc,
    Amf,
    Qsv,
    Software,
}

/// An encoder the remux stage can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    pub name: &'static str,
    pub kind: EncoderKind,
}

impl EncoderProfile {
    /// Encode arguments for the final pass, tuned per encoder family.
    pub fn encode_args(&self, quality: Quality) -> Vec<String> {
        let q = quality.crf().to_string();
        match self.kind {
            EncoderKind::VideoToolbox => vec![
                "-c:v".into(),
                "h264_videotoolbox".into(),
                "-b:v".into(),
                quality.bitrate().into(),
                "-allow_sw".into(),
                "1".into(),
                "-realtime".into(),
                "0".into(),
            ],
            EncoderKind::Nvenc => vec![
                "-c:v".into(),
                "h264_nvenc".into(),
                "-preset".into(),
                "p4".into(),
                "-cq".into(),
                q,
            ],
            EncoderKind::Amf => vec![
                "-c:v".into(),
                "h264_amf".into(),
                "-quality".into(),
                "quality".into(),
                "-rc".into(),
                "cqp".into(),
                "-qp_i".into(),
                q.clone(),
                "-qp_p".into(),
                q,
            ],
            EncoderKind::Qsv => vec![
                "-c:v".into(),
                "h264_qsv".into(),
                "-preset".into(),
                "faster".into(),
                "-global_quality".into(),
                q,
            ],
            EncoderKind::Software => vec![
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "fast".into(),
                "-crf".into(),
                q,
            ],
        }
    }

    /// ffmpeg arguments for the smoke encode: a tiny synthetic clip pushed
    /// through the encoder and discarded.
    pub fn probe_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-y".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            "color=black:s=64x64:d=0.1".into(),
            "-c:v".into(),
            self.name.into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ]
    }
}

/// Seam for the probe step.
pub trait ProbeRunner {
    /// Returns true when the profile's smoke encode exits successfully
    /// within the timeout.
    fn smoke_encode(&self, profile: &EncoderProfile) -> bool;
}

/// Seam for the remux invocation.
pub trait RemuxExec {
    /// Runs the remux command; `Ok(true)` on success, `Ok(false)` on a
    /// non-zero exit (degraded path). Failure to start counts as `Ok(false)`
    /// too: a missing encoder must not kill a run whose frames are already
    /// on disk.
    fn remux(&self, args: &[String]) -> CoreResult<bool>;
}

/// Probe implementation driving the real ffmpeg under a poll-and-kill
/// timeout.
pub struct FfmpegProbeRunner {
    timeout: Duration,
}

impl FfmpegProbeRunner {
    pub fn new() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl Default for FfmpegProbeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRunner for FfmpegProbeRunner {
    fn smoke_encode(&self, profile: &EncoderProfile) -> bool {
        let mut child = match Command::new("ffmpeg")
            .args(profile.probe_args())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                log::warn!("Could not spawn probe for {}: {}", profile.name, err);
                return false;
            }
        };

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return status.success(),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        log::warn!("Probe for {} timed out; killing", profile.name);
                        let _ = child.kill();
                        let _ = child.wait();
                        return false;
                    }
                    std::thread::sleep(PROBE_POLL);
                }
                Err(err) => {
                    log::warn!("Probe wait for {} failed: {}", profile.name, err);
                    let _ = child.kill();
                    let _ = child.wait();
                    return false;
                }
            }
        }
    }
}

/// Remux implementation shelling out to ffmpeg.
pub struct FfmpegRemuxExec;

impl RemuxExec for FfmpegRemuxExec {
    fn remux(&self, args: &[String]) -> CoreResult<bool> {
        log::debug!("Running remux: ffmpeg {}", args.join(" "));
        let output = match Command::new("ffmpeg").args(args).output() {
            Ok(output) => output,
            Err(err) => {
                log::warn!("Could not spawn remux ffmpeg: {}", err);
                return Ok(false);
            }
        };
        if !output.status.success() {
            log::warn!(
                "Remux failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }
}

/// State of the probe-and-remux pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemuxState {
    Probing,
    Selected(EncoderProfile),
    Remuxing(EncoderProfile),
    Finalized(PathBuf),
    DegradedVideoOnly(PathBuf),
}

impl RemuxState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemuxState::Finalized(_) | RemuxState::DegradedVideoOnly(_)
        )
    }
}

/// One probe-and-remux pass over a finished video-only intermediate.
pub struct RemuxJob<'a> {
    /// Original input, the audio source.
    input: &'a Path,
    /// Video-only intermediate written by the frame sink.
    video_only: &'a Path,
    /// Final output path.
    output: &'a Path,
    quality: Quality,
    state: RemuxState,
}

impl<'a> RemuxJob<'a> {
    pub fn new(input: &'a Path, video_only: &'a Path, output: &'a Path, quality: Quality) -> Self {
        Self {
            input,
            video_only,
            output,
            quality,
            state: RemuxState::Probing,
        }
    }

    pub fn state(&self) -> &RemuxState {
        &self.state
    }

    /// Advances the state machine by one transition.
    pub fn step(&mut self, probe: &dyn ProbeRunner, exec: &dyn RemuxExec) -> CoreResult<()> {
        self.state = match std::mem::replace(&mut self.state, RemuxState::Probing) {
            RemuxState::Probing => {
                let profile = HARDWARE_PROFILES
                    .iter()
                    .find(|profile| {
                        log::debug!("Probing encoder {}", profile.name);
                        probe.smoke_encode(profile)
                    })
                    .copied()
                    .unwrap_or(SOFTWARE_PROFILE);
                log::info!("Selected encoder: {}", profile.name);
                RemuxState::Selected(profile)
            }

            RemuxState::Selected(profile) => {
                if !self.video_only.exists() {
                    return Err(CoreError::Encode(format!(
                        "video-only intermediate missing: {}",
                        self.video_only.display()
                    )));
                }
                RemuxState::Remuxing(profile)
            }

            RemuxState::Remuxing(profile) => {
                let args = self.remux_args(&profile);
                if exec.remux(&args)? {
                    if let Err(err) = std::fs::remove_file(self.video_only) {
                        log::warn!(
                            "Could not remove intermediate {}: {}",
                            self.video_only.display(),
                            err
                        );
                    }
                    RemuxState::Finalized(self.output.to_path_buf())
                } else {
                    // Promote the intermediate verbatim: audio is lost,
                    // frames are not.
                    promote(self.video_only, self.output)?;
                    RemuxState::DegradedVideoOnly(self.output.to_path_buf())
                }
            }

            terminal => terminal,
        };
        Ok(())
    }

    /// Drives the machine to a terminal state and returns the final path.
    pub fn run(mut self, probe: &dyn ProbeRunner, exec: &dyn RemuxExec) -> CoreResult<PathBuf> {
        while !self.state.is_terminal() {
            self.step(probe, exec)?;
        }
        match self.state {
            RemuxState::Finalized(path) | RemuxState::DegradedVideoOnly(path) => Ok(path),
            _ => unreachable!("loop exits only on terminal states"),
        }
    }

    /// The full remux argument list: processed video from input 0, optional
    /// audio from input 1, streaming-friendly container flags.
    fn remux_args(&self, profile: &EncoderProfile) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-y".into(),
            "-i".into(),
            self.video_only.to_string_lossy().into_owned(),
            "-i".into(),
            self.input.to_string_lossy().into_owned(),
        ];
        args.extend(profile.encode_args(self.quality));
        args.extend(
            [
                "-c:a",
                "copy",
                "-map",
                "0:v:0",
                "-map",
                "1:a:0?",
                "-movflags",
                "+faststart",
                "-pix_fmt",
                "yuv420p",
            ]
            .map(String::from),
        );
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Moves the intermediate into the output position, copying across
/// filesystems when a plain rename is not possible.
fn promote(from: &Path, to: &Path) -> CoreResult<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)?;
    Ok(())
}

/// Runs the full post-pass with the real ffmpeg seams.
pub fn run_remux_stage(
    input: &Path,
    video_only: &Path,
    output: &Path,
    quality: Quality,
) -> CoreResult<PathBuf> {
    RemuxJob::new(input, video_only, output, quality)
        .run(&FfmpegProbeRunner::new(), &FfmpegRemuxExec)
}

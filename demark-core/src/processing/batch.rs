//! Batch assembly and the decode/compute overlap.
//!
//! A dedicated reader thread pulls frames from the source and assembles
//! fixed-capacity batches, handing each over a rendezvous channel. While the
//! compute side holds batch N, the reader is free to assemble batch N+1 and
//! then blocks: double buffering, never an unbounded queue. Whichever stage
//! is slower governs throughput. The oracle runs on the compute side only,
//! one batch at a time, strictly in source order.

use std::sync::mpsc;
use std::thread;

use crate::error::{CoreError, CoreResult};
use crate::frame::{Frame, FrameTensor, Precision};
use crate::hardware::Device;
use crate::mask::Mask;
use crate::restore::Restorer;

/// Source of decoded frames consumed by the scheduler: a finite,
/// non-restartable sequence in capture order. `Ok(None)` is end-of-stream;
/// `Err` is a fatal decode failure.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> CoreResult<Option<Frame>>;
}

/// Execution plan fixed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub device: Device,
    pub precision: Precision,
    pub batch_size: usize,
}

impl BatchPlan {
    /// Derives the plan from the detected device; an explicit caller
    /// override takes precedence over the device default.
    pub fn new(device: Device, batch_size_override: Option<usize>) -> Self {
        let batch_size = match batch_size_override {
            Some(size) if size > 0 => size,
            _ => device.default_batch_size(),
        };
        Self {
            device,
            precision: device.preferred_precision(),
            batch_size,
        }
    }
}

/// Runs the batched restore loop: decode (reader thread) overlapped with the
/// oracle and the caller's composite/encode stage (this thread).
///
/// `on_batch` receives each batch's original frames together with the
/// restored tensors, already re-normalized to `[0, 1]`, in source order.
/// Returns the number of frames processed.
pub fn run_batches<S, F>(
    source: S,
    plan: &BatchPlan,
    restorer: &dyn Restorer,
    mask: &Mask,
    mut on_batch: F,
) -> CoreResult<u64>
where
    S: FrameSource + 'static,
    F: FnMut(Vec<Frame>, Vec<FrameTensor>) -> CoreResult<()>,
{
    // Rendezvous channel: the send blocks until the compute side takes the
    // batch, capping the lookahead at the one batch the reader assembles
    // while compute is busy.
    let (sender, receiver) = mpsc::sync_channel::<CoreResult<Vec<Frame>>>(0);
    let batch_size = plan.batch_size;

    let reader = thread::spawn(move || {
        let mut source = source;
        loop {
            let mut batch = Vec::with_capacity(batch_size);
            loop {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        batch.push(frame);
                        if batch.len() == batch_size {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        // A dropped receiver means compute already failed;
                        // either way the reader is done.
                        let _ = sender.send(Err(err));
                        return;
                    }
                }
            }
            let exhausted = batch.len() < batch_size;
            if !batch.is_empty() && sender.send(Ok(batch)).is_err() {
                return;
            }
            if exhausted {
                return;
            }
        }
    });

    let oracle_mask = mask.at_precision(plan.precision);
    let mut processed = 0u64;
    let mut result = Ok(());

    for message in receiver {
        let frames = match message {
            Ok(frames) => frames,
            Err(err) => {
                result = Err(err);
                break;
            }
        };

        let mut tensors: Vec<FrameTensor> = frames.iter().map(FrameTensor::from_frame).collect();
        for tensor in &mut tensors {
            tensor.quantize(plan.precision);
        }

        let restored = restorer.restore(&tensors, &oracle_mask)?;
        if restored.len() != frames.len() {
            return Err(CoreError::Restoration(format!(
                "oracle returned {} frames for a batch of {}",
                restored.len(),
                frames.len()
            )));
        }
        let restored: Vec<FrameTensor> = restored
            .into_iter()
            .map(FrameTensor::into_unit_range)
            .collect();

        processed += frames.len() as u64;
        on_batch(frames, restored)?;
    }

    // The channel has drained, so the reader has already returned (or will
    // as soon as its blocked send fails); surface a panic as a decode error.
    if reader.join().is_err() {
        return Err(CoreError::Decode("frame reader thread panicked".to_string()));
    }
    result.map(|_| processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Region;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Synthetic source yielding deterministic frames.
    struct StubSource {
        frames: Vec<Frame>,
        cursor: usize,
        fail_at: Option<usize>,
    }

    impl StubSource {
        fn new(count: usize, width: u32, height: u32) -> Self {
            let frames = (0..count)
                .map(|i| Frame {
                    index: i as u64,
                    width,
                    height,
                    data: (0..Frame::byte_len(width, height))
                        .map(|j| ((i * 31 + j) % 251) as u8)
                        .collect(),
                })
                .collect();
            Self {
                frames,
                cursor: 0,
                fail_at: None,
            }
        }
    }

    impl FrameSource for StubSource {
        fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
            if Some(self.cursor) == self.fail_at {
                return Err(CoreError::Decode("stub decode failure".to_string()));
            }
            let frame = self.frames.get(self.cursor).cloned();
            self.cursor += 1;
            Ok(frame)
        }
    }

    /// Oracle that returns its input and counts invocations.
    struct IdentityRestorer {
        calls: AtomicUsize,
        batch_sizes: std::sync::Mutex<Vec<usize>>,
    }

    impl IdentityRestorer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                batch_sizes: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl Restorer for IdentityRestorer {
        fn restore(&self, batch: &[FrameTensor], _mask: &Mask) -> CoreResult<Vec<FrameTensor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(batch.len());
            Ok(batch.to_vec())
        }
    }

    struct FailingRestorer;

    impl Restorer for FailingRestorer {
        fn restore(&self, _batch: &[FrameTensor], _mask: &Mask) -> CoreResult<Vec<FrameTensor>> {
            Err(CoreError::Restoration("oracle exploded".to_string()))
        }
    }

    fn cpu_plan(batch_size: usize) -> BatchPlan {
        BatchPlan {
            device: Device::Cpu,
            precision: Precision::Full,
            batch_size,
        }
    }

    fn small_mask() -> Mask {
        Mask::build(
            &[Region {
                x: 2,
                y: 2,
                width: 4,
                height: 4,
            }],
            16,
            12,
        )
    }

    #[test]
    fn test_plan_override_beats_device_default() {
        assert_eq!(BatchPlan::new(Device::Cpu, None).batch_size, 4);
        assert_eq!(BatchPlan::new(Device::Cpu, Some(0)).batch_size, 4);
        assert_eq!(BatchPlan::new(Device::Cpu, Some(9)).batch_size, 9);
        assert_eq!(BatchPlan::new(Device::Cuda, None).batch_size, 12);
    }

    #[test]
    fn test_order_preserved_and_final_batch_partial() {
        let restorer = IdentityRestorer::new();
        let mask = small_mask();
        let mut seen = Vec::new();
        let processed = run_batches(
            StubSource::new(10, 16, 12),
            &cpu_plan(4),
            &restorer,
            &mask,
            |frames, restored| {
                assert_eq!(frames.len(), restored.len());
                seen.extend(frames.iter().map(|f| f.index));
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(processed, 10);
        assert_eq!(seen, (0..10).collect::<Vec<u64>>());
        // 4 + 4 + 2: exactly one oracle call per batch, last one partial.
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(*restorer.batch_sizes.lock().unwrap(), vec![4, 4, 2]);
    }

    #[test]
    fn test_source_error_propagates() {
        let mut source = StubSource::new(10, 16, 12);
        source.fail_at = Some(6);
        let restorer = IdentityRestorer::new();
        let mask = small_mask();
        let err = run_batches(source, &cpu_plan(4), &restorer, &mask, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    #[test]
    fn test_oracle_error_is_fatal() {
        let mask = small_mask();
        let err = run_batches(
            StubSource::new(8, 16, 12),
            &cpu_plan(4),
            &FailingRestorer,
            &mask,
            |_, _| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Restoration(_)));
    }

    #[test]
    fn test_sink_error_stops_the_run() {
        let restorer = IdentityRestorer::new();
        let mask = small_mask();
        let err = run_batches(
            StubSource::new(32, 16, 12),
            &cpu_plan(4),
            &restorer,
            &mask,
            |_, _| Err(CoreError::Encode("disk full".to_string())),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Encode(_)));
    }

    #[test]
    fn test_empty_source_yields_zero_frames() {
        let restorer = IdentityRestorer::new();
        let mask = small_mask();
        let processed = run_batches(
            StubSource::new(0, 16, 12),
            &cpu_plan(4),
            &restorer,
            &mask,
            |_, _| Ok(()),
        )
        .unwrap();
        assert_eq!(processed, 0);
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 0);
    }
}

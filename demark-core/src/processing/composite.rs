//! Mask-guided compositing.
//!
//! Pure function of (original frame, restored tensor, mask): the restored
//! values replace the original only to the extent of the mask's blend
//! weight, so batching and precision choices upstream can never change
//! unmasked pixels. Restored tensors arrive already normalized to `[0, 1]`.

use rayon::prelude::*;

use crate::frame::{Frame, FrameTensor};
use crate::mask::Mask;

/// Blends one restored tensor back into its original frame:
/// `output = original * (1 - mask) + restored * mask`, clamped and rounded
/// to the integer pixel range.
pub fn composite_frame(original: &Frame, restored: &FrameTensor, mask: &Mask) -> Frame {
    let weights = mask.data();
    let mut data = vec![0u8; original.data.len()];
    for (p, &weight) in weights.iter().enumerate() {
        for c in 0..3 {
            let i = p * 3 + c;
            let source = original.data[i] as f32;
            let replacement = restored.data[i] * 255.0;
            let blended = source * (1.0 - weight) + replacement * weight;
            data[i] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Frame {
        index: original.index,
        width: original.width,
        height: original.height,
        data,
    }
}

/// Composites a whole batch, preserving order.
pub fn composite_batch(originals: &[Frame], restored: &[FrameTensor], mask: &Mask) -> Vec<Frame> {
    originals
        .par_iter()
        .zip(restored.par_iter())
        .map(|(original, tensor)| composite_frame(original, tensor, mask))
        .collect()
}

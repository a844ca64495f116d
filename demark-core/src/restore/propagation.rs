//! Multi-scale propagation restorer backing the checkpoint-based algorithms.
//!
//! Construction validates the resolved checkpoint on disk; restoration runs a
//! coarse-to-fine fill: the frame and mask are downsampled into a pyramid,
//! the coarsest level is diffused to convergence cheaply, and each finer
//! level is initialized from the level below before a short smoothing pass.
//! Large regions converge far faster than single-scale diffusion.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{CoreError, CoreResult};
use crate::frame::FrameTensor;
use crate::mask::Mask;
use crate::models::MIN_CHECKPOINT_BYTES;

use super::{
    boundary_mean, check_batch_shape, diffusion_passes, support_from_weights, Restorer, Support,
};

/// Stop building pyramid levels once the short side falls to this size.
const MIN_LEVEL_DIM: usize = 16;

/// Smoothing passes at the coarsest level and per finer level.
const COARSE_ITERATIONS: usize = 48;
const REFINE_ITERATIONS: usize = 8;

pub struct PropagationRestorer {
    checkpoint: PathBuf,
}

impl PropagationRestorer {
    /// Validates the checkpoint and builds the restorer.
    pub fn new(checkpoint: &Path) -> CoreResult<Self> {
        let metadata = std::fs::metadata(checkpoint).map_err(|e| {
            CoreError::ModelIntegrity(format!("{}: {}", checkpoint.display(), e))
        })?;
        if metadata.len() < MIN_CHECKPOINT_BYTES {
            return Err(CoreError::ModelIntegrity(format!(
                "{} is {} bytes, below the {} byte floor",
                checkpoint.display(),
                metadata.len(),
                MIN_CHECKPOINT_BYTES
            )));
        }
        Ok(Self {
            checkpoint: checkpoint.to_path_buf(),
        })
    }

    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }
}

impl Restorer for PropagationRestorer {
    fn restore(&self, batch: &[FrameTensor], mask: &Mask) -> CoreResult<Vec<FrameTensor>> {
        check_batch_shape(batch, mask)?;
        let pyramid = MaskPyramid::build(mask);
        Ok(batch
            .par_iter()
            .map(|tensor| fill_frame(tensor, &pyramid))
            .collect())
    }
}

/// One pyramid level's mask geometry.
struct MaskLevel {
    width: usize,
    height: usize,
    weights: Vec<f32>,
    support: Support,
}

/// Mask downsampled level by level, finest first.
struct MaskPyramid {
    levels: Vec<MaskLevel>,
}

impl MaskPyramid {
    fn build(mask: &Mask) -> Self {
        let mut levels = Vec::new();
        let mut width = mask.width() as usize;
        let mut height = mask.height() as usize;
        let mut weights = mask.data().to_vec();

        loop {
            let support = support_from_weights(&weights);
            let descend = width / 2 >= MIN_LEVEL_DIM && height / 2 >= MIN_LEVEL_DIM;
            let (next, nw, nh) = if descend {
                downsample(&weights, width, height, 1)
            } else {
                (Vec::new(), 0, 0)
            };
            levels.push(MaskLevel {
                width,
                height,
                weights,
                support,
            });
            if !descend {
                break;
            }
            weights = next;
            width = nw;
            height = nh;
        }
        Self { levels }
    }
}

fn fill_frame(tensor: &FrameTensor, pyramid: &MaskPyramid) -> FrameTensor {
    let finest = &pyramid.levels[0];
    if finest.support.indices.is_empty() {
        return tensor.clone();
    }

    // Downsample the frame alongside the mask pyramid. Masked pixels are
    // excluded from the averages so watermark values never leak into the
    // coarse levels' known pixels.
    let mut images: Vec<(Vec<f32>, usize, usize)> =
        vec![(tensor.data.clone(), finest.width, finest.height)];
    for i in 1..pyramid.levels.len() {
        let fine = &pyramid.levels[i - 1];
        let (data, w, h) = {
            let (prev, pw, ph) = images.last().unwrap();
            downsample_confident(prev, *pw, *ph, &fine.weights)
        };
        images.push((data, w, h));
    }

    // Coarsest level: seed with the boundary mean and diffuse hard.
    let coarsest = pyramid.levels.len() - 1;
    {
        let level = &pyramid.levels[coarsest];
        let (data, w, h) = &mut images[coarsest];
        let seed = boundary_mean(data, *w, *h, &level.support);
        for &p in &level.support.indices {
            for c in 0..3 {
                data[p * 3 + c] = seed[c];
            }
        }
        diffusion_passes(data, *w, *h, &level.support, COARSE_ITERATIONS);
    }

    // Walk up the pyramid: initialize each finer level's masked pixels from
    // the filled level below, then smooth briefly.
    for i in (0..coarsest).rev() {
        let (coarse, cw, ch) = images[i + 1].clone();
        let level = &pyramid.levels[i];
        let (data, w, h) = &mut images[i];
        for &p in &level.support.indices {
            let x = (p % *w) / 2;
            let y = (p / *w) / 2;
            let q = y.min(ch - 1) * cw + x.min(cw - 1);
            for c in 0..3 {
                data[p * 3 + c] = coarse[q * 3 + c];
            }
        }
        diffusion_passes(data, *w, *h, &level.support, REFINE_ITERATIONS);
    }

    let (data, _, _) = images.swap_remove(0);
    FrameTensor {
        width: tensor.width,
        height: tensor.height,
        data,
    }
}

/// 2x box downsample of an interleaved raster with `channels` values per
/// pixel. Odd trailing rows and columns fold into the last output cell.
fn downsample(data: &[f32], width: usize, height: usize, channels: usize) -> (Vec<f32>, usize, usize) {
    let out_w = (width / 2).max(1);
    let out_h = (height / 2).max(1);
    let mut out = vec![0.0f32; out_w * out_h * channels];
    for oy in 0..out_h {
        for ox in 0..out_w {
            for c in 0..channels {
                let mut sum = 0.0f32;
                let mut count = 0.0f32;
                for dy in 0..2 {
                    for dx in 0..2 {
                        let x = (ox * 2 + dx).min(width - 1);
                        let y = (oy * 2 + dy).min(height - 1);
                        sum += data[(y * width + x) * channels + c];
                        count += 1.0;
                    }
                }
                out[(oy * out_w + ox) * channels + c] = sum / count;
            }
        }
    }
    (out, out_w, out_h)
}

/// 2x downsample of an RGB raster that weighs each contributing pixel by its
/// confidence `1 - mask_weight`: a cell surrounded by watermark keeps only
/// its trustworthy neighbors' values. Falls back to a plain average when the
/// whole window is masked, which only feeds cells the coarser mask marks for
/// filling anyway.
fn downsample_confident(
    data: &[f32],
    width: usize,
    height: usize,
    mask_weights: &[f32],
) -> (Vec<f32>, usize, usize) {
    let out_w = (width / 2).max(1);
    let out_h = (height / 2).max(1);
    let mut out = vec![0.0f32; out_w * out_h * 3];
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut acc = [0.0f32; 3];
            let mut plain = [0.0f32; 3];
            let mut confidence_sum = 0.0f32;
            for dy in 0..2 {
                for dx in 0..2 {
                    let x = (ox * 2 + dx).min(width - 1);
                    let y = (oy * 2 + dy).min(height - 1);
                    let p = y * width + x;
                    let confidence = (1.0 - mask_weights[p]).clamp(0.0, 1.0);
                    for c in 0..3 {
                        acc[c] += confidence * data[p * 3 + c];
                        plain[c] += 0.25 * data[p * 3 + c];
                    }
                    confidence_sum += confidence;
                }
            }
            let q = (oy * out_w + ox) * 3;
            if confidence_sum > 1e-3 {
                for c in 0..3 {
                    out[q + c] = acc[c] / confidence_sum;
                }
            } else {
                for c in 0..3 {
                    out[q + c] = plain[c];
                }
            }
        }
    }
    (out, out_w, out_h)
}

//! Restoration oracle boundary.
//!
//! The pipeline is agnostic about how masked pixels are replaced: it hands a
//! batch of frame tensors and the mask to a [`Restorer`] and expects the same
//! number of frames back in the same order, with no state carried between
//! calls. Every shipped restorer is per-frame pure, which makes the
//! composited output independent of the batch size the scheduler picks.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::events::EventDispatcher;
use crate::frame::FrameTensor;
use crate::mask::Mask;
use crate::models::ModelProvider;

pub mod diffusion;
pub mod propagation;
pub mod telea;

pub use diffusion::DiffusionRestorer;
pub use propagation::PropagationRestorer;
pub use telea::TeleaRestorer;

/// Mask weights above this threshold mark pixels the oracle must replace;
/// anything below keeps enough of the original through blending that the
/// original value is an acceptable seed.
pub(crate) const SUPPORT_THRESHOLD: f32 = 0.05;

/// A batch-in/batch-out pixel restoration strategy.
///
/// Implementations must return one result per input frame, in input order,
/// and must not depend on previous invocations.
pub trait Restorer: Send + Sync {
    fn restore(&self, batch: &[FrameTensor], mask: &Mask) -> CoreResult<Vec<FrameTensor>>;
}

/// The restoration algorithms selectable from the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Distance-ordered neighborhood propagation (fast).
    Telea,
    /// Diffusion-based interpolation (smoother).
    Ns,
    /// Checkpoint-backed spatio-temporal inpainting.
    Sttn,
    /// Checkpoint-backed large-mask inpainting.
    Lama,
    /// Checkpoint-backed propagation inpainting.
    Propainter,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Telea,
        Algorithm::Ns,
        Algorithm::Sttn,
        Algorithm::Lama,
        Algorithm::Propainter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Telea => "telea",
            Algorithm::Ns => "ns",
            Algorithm::Sttn => "sttn",
            Algorithm::Lama => "lama",
            Algorithm::Propainter => "propainter",
        }
    }

    /// Whether the algorithm needs weights resolved by the model provider.
    pub fn requires_checkpoint(&self) -> bool {
        matches!(
            self,
            Algorithm::Sttn | Algorithm::Lama | Algorithm::Propainter
        )
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "telea" => Ok(Algorithm::Telea),
            "ns" => Ok(Algorithm::Ns),
            "sttn" => Ok(Algorithm::Sttn),
            "lama" => Ok(Algorithm::Lama),
            "propainter" => Ok(Algorithm::Propainter),
            other => Err(CoreError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Builds the restorer for the selected algorithm, resolving checkpoint
/// weights through the model provider when the algorithm needs them.
pub fn build_restorer(
    algorithm: Algorithm,
    inpaint_radius: u32,
    provider: &ModelProvider,
    events: &EventDispatcher,
) -> CoreResult<Box<dyn Restorer>> {
    match algorithm {
        Algorithm::Telea => Ok(Box::new(TeleaRestorer::new(inpaint_radius))),
        Algorithm::Ns => Ok(Box::new(DiffusionRestorer::default())),
        Algorithm::Sttn | Algorithm::Lama | Algorithm::Propainter => {
            let checkpoint = provider.resolve(algorithm, events)?;
            Ok(Box::new(PropagationRestorer::new(&checkpoint)?))
        }
    }
}

/// Pixels the oracle must fill, derived once per batch from the mask.
pub(crate) struct Support {
    /// Per-pixel flag, `width * height` long.
    pub masked: Vec<bool>,
    /// Indices of masked pixels in row-major order.
    pub indices: Vec<usize>,
}

pub(crate) fn support_of(mask: &Mask) -> Support {
    support_from_weights(mask.data())
}

pub(crate) fn support_from_weights(weights: &[f32]) -> Support {
    let masked: Vec<bool> = weights.iter().map(|&v| v > SUPPORT_THRESHOLD).collect();
    let indices = masked
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect();
    Support { masked, indices }
}

/// Verifies that every frame in the batch matches the mask's geometry.
pub(crate) fn check_batch_shape(batch: &[FrameTensor], mask: &Mask) -> CoreResult<()> {
    for tensor in batch {
        tensor.check_shape(mask.width(), mask.height())?;
    }
    Ok(())
}

/// Jacobi smoothing passes over the masked support: each masked pixel moves
/// to the average of its 4-neighborhood. Out-of-frame neighbors are skipped.
pub(crate) fn diffusion_passes(
    data: &mut Vec<f32>,
    width: usize,
    height: usize,
    support: &Support,
    iterations: usize,
) {
    let mut next = data.clone();
    for _ in 0..iterations {
        for &p in &support.indices {
            let x = p % width;
            let y = p / width;
            for c in 0..3 {
                let mut sum = 0.0f32;
                let mut count = 0.0f32;
                if x > 0 {
                    sum += data[(p - 1) * 3 + c];
                    count += 1.0;
                }
                if x + 1 < width {
                    sum += data[(p + 1) * 3 + c];
                    count += 1.0;
                }
                if y > 0 {
                    sum += data[(p - width) * 3 + c];
                    count += 1.0;
                }
                if y + 1 < height {
                    sum += data[(p + width) * 3 + c];
                    count += 1.0;
                }
                if count > 0.0 {
                    next[p * 3 + c] = sum / count;
                }
            }
        }
        std::mem::swap(data, &mut next);
        // Keep the scratch buffer aligned with the latest values outside the
        // support, which never change.
        next.copy_from_slice(data);
    }
}

/// Mean color of the unmasked pixels bordering the support. Falls back to the
/// mean of all unmasked pixels, and to mid-grey when the mask covers the
/// whole frame.
pub(crate) fn boundary_mean(
    data: &[f32],
    width: usize,
    height: usize,
    support: &Support,
) -> [f32; 3] {
    let mut sum = [0.0f64; 3];
    let mut count = 0u64;
    for &p in &support.indices {
        let x = p % width;
        let y = p / width;
        let mut visit = |q: usize| {
            if !support.masked[q] {
                for c in 0..3 {
                    sum[c] += data[q * 3 + c] as f64;
                }
                count += 1;
            }
        };
        if x > 0 {
            visit(p - 1);
        }
        if x + 1 < width {
            visit(p + 1);
        }
        if y > 0 {
            visit(p - width);
        }
        if y + 1 < height {
            visit(p + width);
        }
    }

    if count == 0 {
        let total = width * height;
        for p in 0..total {
            if !support.masked[p] {
                for c in 0..3 {
                    sum[c] += data[p * 3 + c] as f64;
                }
                count += 1;
            }
        }
    }

    if count == 0 {
        return [0.5, 0.5, 0.5];
    }
    [
        (sum[0] / count as f64) as f32,
        (sum[1] / count as f64) as f32,
        (sum[2] / count as f64) as f32,
    ]
}

//! Distance-ordered neighborhood propagation.
//!
//! Masked pixels are filled in increasing distance from the region boundary,
//! each taking an inverse-distance-weighted average of the already-known
//! pixels inside a bounded window. Fast and local; the default choice.

use rayon::prelude::*;

use crate::error::CoreResult;
use crate::frame::FrameTensor;
use crate::mask::Mask;

use super::{check_batch_shape, support_of, Restorer, Support};

/// Default propagation window radius in pixels.
pub const DEFAULT_RADIUS: u32 = 3;

pub struct TeleaRestorer {
    radius: u32,
}

impl TeleaRestorer {
    pub fn new(radius: u32) -> Self {
        Self {
            radius: radius.max(1),
        }
    }
}

impl Default for TeleaRestorer {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS)
    }
}

impl Restorer for TeleaRestorer {
    fn restore(&self, batch: &[FrameTensor], mask: &Mask) -> CoreResult<Vec<FrameTensor>> {
        check_batch_shape(batch, mask)?;
        let support = support_of(mask);
        let order = fill_order(&support, mask.width() as usize, mask.height() as usize);
        Ok(batch
            .par_iter()
            .map(|tensor| fill_frame(tensor, &support, &order, self.radius as i64))
            .collect())
    }
}

/// Breadth-first distance of every masked pixel from the unmasked boundary.
/// The returned list is sorted by distance, which is exactly the order the
/// fill must process pixels in.
fn fill_order(support: &Support, width: usize, height: usize) -> Vec<(usize, u32)> {
    let mut dist = vec![u32::MAX; width * height];
    let mut queue = std::collections::VecDeque::new();

    for &p in &support.indices {
        let x = p % width;
        let y = p / width;
        let touches_known = (x > 0 && !support.masked[p - 1])
            || (x + 1 < width && !support.masked[p + 1])
            || (y > 0 && !support.masked[p - width])
            || (y + 1 < height && !support.masked[p + width]);
        if touches_known {
            dist[p] = 1;
            queue.push_back(p);
        }
    }

    let mut order = Vec::with_capacity(support.indices.len());
    while let Some(p) = queue.pop_front() {
        order.push((p, dist[p]));
        let x = p % width;
        let y = p / width;
        let mut relax = |q: usize| {
            if support.masked[q] && dist[q] == u32::MAX {
                dist[q] = dist[p] + 1;
                queue.push_back(q);
            }
        };
        if x > 0 {
            relax(p - 1);
        }
        if x + 1 < width {
            relax(p + 1);
        }
        if y > 0 {
            relax(p - width);
        }
        if y + 1 < height {
            relax(p + width);
        }
    }
    order
}

fn fill_frame(
    tensor: &FrameTensor,
    support: &Support,
    order: &[(usize, u32)],
    radius: i64,
) -> FrameTensor {
    let width = tensor.width as usize;
    let height = tensor.height as usize;
    let mut out = tensor.data.clone();

    // Tracks which pixels hold trustworthy values: everything unmasked up
    // front, then each filled pixel as the sweep reaches it.
    let mut known: Vec<bool> = support.masked.iter().map(|&m| !m).collect();

    for &(p, _) in order {
        let px = (p % width) as i64;
        let py = (p / width) as i64;
        let mut acc = [0.0f32; 3];
        let mut weight_sum = 0.0f32;

        for dy in -radius..=radius {
            let y = py + dy;
            if y < 0 || y >= height as i64 {
                continue;
            }
            for dx in -radius..=radius {
                let x = px + dx;
                if x < 0 || x >= width as i64 {
                    continue;
                }
                let q = y as usize * width + x as usize;
                if !known[q] {
                    continue;
                }
                let weight = 1.0 / (1.0 + (dx * dx + dy * dy) as f32);
                for c in 0..3 {
                    acc[c] += weight * out[q * 3 + c];
                }
                weight_sum += weight;
            }
        }

        if weight_sum > 0.0 {
            for c in 0..3 {
                out[p * 3 + c] = acc[c] / weight_sum;
            }
        }
        // A pixel with no known window neighbors keeps its original value;
        // BFS order makes that possible only for the very first ring of an
        // isolated region, where the original is the best seed available.
        known[p] = true;
    }

    FrameTensor {
        width: tensor.width,
        height: tensor.height,
        data: out,
    }
}

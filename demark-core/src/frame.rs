//! Frame buffers and the numeric boundary handed to the restoration oracle.
//!
//! Decoded frames are interleaved RGB24 byte buffers in capture order. Before
//! a batch reaches the oracle it is converted to `FrameTensor` values in
//! `[0, 1]`; results coming back are re-normalized at the same boundary, so
//! an oracle may answer in either `[0, 1]` or `[0, 255]`.

use crate::error::{CoreError, CoreResult};

/// Bytes per pixel for the RGB24 frames moving through the pipeline.
pub const CHANNELS: usize = 3;

/// A decoded video frame in capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Ordinal position in the source stream, starting at zero.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB24 bytes, row-major, `width * height * 3` long.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }
}

/// Floating-point view of a frame, values nominally in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl FrameTensor {
    /// Converts a frame to the oracle's numeric domain.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: frame.data.iter().map(|&b| b as f32 / 255.0).collect(),
        }
    }

    /// Brings an oracle result into `[0, 1]` regardless of whether it was
    /// produced in `[0, 1]` or `[0, 255]`.
    pub fn into_unit_range(mut self) -> Self {
        let max = self.data.iter().cloned().fold(0.0f32, f32::max);
        if max > 1.5 {
            for value in &mut self.data {
                *value /= 255.0;
            }
        }
        for value in &mut self.data {
            *value = value.clamp(0.0, 1.0);
        }
        self
    }

    /// Quantizes every value through the requested precision in place.
    pub fn quantize(&mut self, precision: Precision) {
        if precision == Precision::Half {
            for value in &mut self.data {
                *value = Precision::half_round_trip(*value);
            }
        }
    }

    /// Checks that an oracle result has the shape of its input.
    pub fn check_shape(&self, width: u32, height: u32) -> CoreResult<()> {
        if self.width != width
            || self.height != height
            || self.data.len() != Frame::byte_len(width, height)
        {
            return Err(CoreError::Restoration(format!(
                "restored frame shape {}x{} ({} values) does not match source {}x{}",
                self.width,
                self.height,
                self.data.len(),
                width,
                height
            )));
        }
        Ok(())
    }
}

/// Numeric precision used for the oracle invocation.
///
/// `Half` mirrors accelerator execution: values are squeezed through IEEE
/// binary16 before the oracle runs and widen back to f32 afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Full,
    Half,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Full => "fp32",
            Precision::Half => "fp16",
        }
    }

    /// Rounds a value through binary16 and back.
    pub fn half_round_trip(value: f32) -> f32 {
        f16_bits_to_f32(f32_to_f16_bits(value))
    }
}

/// Converts f32 to IEEE binary16 bits with round-to-nearest.
fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32 - 127;
    let frac = bits & 0x007f_ffff;

    if exp == 128 {
        // Infinity or NaN
        let nan = if frac != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    if exp > 15 {
        // Overflow to infinity
        return sign | 0x7c00;
    }
    if exp >= -14 {
        // Normal range; rounding may carry into the exponent, which the
        // add handles because the fields are adjacent.
        let mantissa = (frac >> 13) as u16;
        let round = ((frac >> 12) & 1) as u16;
        return (sign | (((exp + 15) as u16) << 10) | mantissa).wrapping_add(round);
    }
    if exp >= -24 {
        // Subnormal range
        let full = frac | 0x0080_0000;
        let shift = (-14 - exp) as u32 + 13;
        let mantissa = (full >> shift) as u16;
        let round = ((full >> (shift - 1)) & 1) as u16;
        return (sign | mantissa).wrapping_add(round);
    }
    // Underflow to signed zero
    sign
}

/// Converts IEEE binary16 bits back to f32.
fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let frac = (bits & 0x03ff) as u32;

    if exp == 0x1f {
        return f32::from_bits(sign | 0x7f80_0000 | (frac << 13));
    }
    if exp == 0 {
        if frac == 0 {
            return f32::from_bits(sign);
        }
        let magnitude = frac as f32 * (-24f32).exp2();
        return if sign != 0 { -magnitude } else { magnitude };
    }
    f32::from_bits(sign | ((exp + 112) << 23) | (frac << 13))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let data = (0..Frame::byte_len(width, height))
            .map(|i| (i % 256) as u8)
            .collect();
        Frame {
            index: 0,
            width,
            height,
            data,
        }
    }

    #[test]
    fn test_tensor_normalizes_to_unit_range() {
        let frame = gradient_frame(8, 4);
        let tensor = FrameTensor::from_frame(&frame);
        assert_eq!(tensor.data.len(), frame.data.len());
        assert!(tensor.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(tensor.data[255], 1.0);
    }

    #[test]
    fn test_into_unit_range_detects_byte_scale() {
        let byte_scale = FrameTensor {
            width: 2,
            height: 1,
            data: vec![0.0, 127.5, 255.0, 12.0, 80.0, 200.0],
        };
        let unit = byte_scale.into_unit_range();
        assert!((unit.data[1] - 0.5).abs() < 1e-6);
        assert_eq!(unit.data[2], 1.0);

        // Already-normalized data passes through untouched apart from clamping.
        let unit_scale = FrameTensor {
            width: 1,
            height: 1,
            data: vec![0.25, 1.2, -0.1],
        };
        let unit = unit_scale.into_unit_range();
        assert_eq!(unit.data, vec![0.25, 1.0, 0.0]);
    }

    #[test]
    fn test_half_round_trip_is_lossy_but_close() {
        for i in 0..=255u32 {
            let v = i as f32 / 255.0;
            let q = Precision::half_round_trip(v);
            assert!((v - q).abs() < 1e-3, "value {v} quantized to {q}");
        }
        // Exactly representable values survive untouched.
        assert_eq!(Precision::half_round_trip(0.0), 0.0);
        assert_eq!(Precision::half_round_trip(1.0), 1.0);
        assert_eq!(Precision::half_round_trip(0.5), 0.5);
        assert_eq!(Precision::half_round_trip(-2.0), -2.0);
    }

    #[test]
    fn test_half_round_trip_extremes() {
        assert_eq!(Precision::half_round_trip(65504.0), 65504.0);
        assert!(Precision::half_round_trip(1e6).is_infinite());
        assert_eq!(Precision::half_round_trip(1e-10), 0.0);
    }

    #[test]
    fn test_check_shape_rejects_mismatch() {
        let tensor = FrameTensor {
            width: 4,
            height: 4,
            data: vec![0.0; Frame::byte_len(4, 4)],
        };
        assert!(tensor.check_shape(4, 4).is_ok());
        assert!(tensor.check_shape(4, 5).is_err());
    }
}

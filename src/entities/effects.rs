//! Gain effect: multiplies RGB of its first input by `A_GAIN`.
//!
//! Output is always F32 (HDR-safe, no clamping). Alpha is untouched.
//! A gain of 1.0 passes the input through without copying pixels.

use rayon::prelude::*;

use super::attrs::Attrs;
use super::frame::Frame;
use super::keys::A_GAIN;
use super::node::{EvalContext, Processor};

/// Rows per rayon task
const ROWS_PER_CHUNK: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct GainNode;

/// Apply gain to a frame.
pub fn apply_gain(frame: &Frame, gain: f32) -> Option<Frame> {
    if (gain - 1.0).abs() < 1e-6 {
        return Some(frame.clone());
    }

    let (width, height) = frame.resolution();
    let mut data = frame.to_f32();
    data.par_chunks_mut(width * 4 * ROWS_PER_CHUNK).for_each(|rows| {
        for px in rows.chunks_exact_mut(4) {
            px[0] *= gain;
            px[1] *= gain;
            px[2] *= gain;
        }
    });

    Frame::from_f32(width, height, data).ok()
}

impl Processor for GainNode {
    fn node_type(&self) -> &str {
        "Gain"
    }

    fn process(&mut self, _ctx: &EvalContext, attrs: &Attrs, inputs: &[Option<Frame>]) -> Option<Frame> {
        let input = inputs.first()?.as_ref()?;
        apply_gain(input, attrs.get_float_or(A_GAIN, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::AttrValue;

    #[test]
    fn test_gain_scales_rgb_only() {
        let src = Frame::solid(3, 40, [0.5, 0.25, 1.0, 0.5]);
        let mut attrs = Attrs::new();
        attrs.set(A_GAIN, AttrValue::Float(2.0));

        let out = GainNode.process(&EvalContext::new(0), &attrs, &[Some(src)]).unwrap();
        assert_eq!(out.resolution(), (3, 40));
        assert_eq!(out.pixel(2, 39), Some([1.0, 0.5, 2.0, 0.5]));
    }

    #[test]
    fn test_unity_gain_shares_buffer() {
        let src = Frame::new(2, 2);
        let out = GainNode.process(&EvalContext::new(0), &Attrs::new(), &[Some(src.clone())]).unwrap();
        assert!(out.shares_buffer(&src));
    }

    #[test]
    fn test_missing_input_gives_nothing() {
        assert!(GainNode.process(&EvalContext::new(0), &Attrs::new(), &[]).is_none());
        assert!(GainNode.process(&EvalContext::new(0), &Attrs::new(), &[None]).is_none());
    }
}

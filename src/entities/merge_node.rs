//! Merge: input 1 (foreground) over input 0 (background).
//!
//! Output has the background's size; the foreground is anchored top-left and
//! clipped. With one side absent the other passes through unchanged.

use rayon::prelude::*;

use super::attrs::Attrs;
use super::frame::Frame;
use super::keys::A_OPACITY;
use super::node::{EvalContext, Processor};

#[derive(Debug, Clone, Default)]
pub struct MergeNode;

/// Alpha-composite `top` over `bottom` with extra `opacity`.
pub fn over(bottom: &Frame, top: &Frame, opacity: f32) -> Option<Frame> {
    let opacity = opacity.clamp(0.0, 1.0);
    let (width, height) = bottom.resolution();
    let (top_w, top_h) = top.resolution();
    let overlap_w = width.min(top_w);

    let mut out = bottom.to_f32();
    let top_px = top.to_f32();

    out.par_chunks_mut(width * 4)
        .enumerate()
        .take(height.min(top_h))
        .for_each(|(y, row)| {
            let top_row = &top_px[y * top_w * 4..(y * top_w + overlap_w) * 4];
            for (dst, src) in row[..overlap_w * 4].chunks_exact_mut(4).zip(top_row.chunks_exact(4)) {
                let alpha = src[3] * opacity;
                let inv = 1.0 - alpha;
                dst[0] = src[0] * alpha + dst[0] * inv;
                dst[1] = src[1] * alpha + dst[1] * inv;
                dst[2] = src[2] * alpha + dst[2] * inv;
                dst[3] = alpha + dst[3] * inv;
            }
        });

    Frame::from_f32(width, height, out).ok()
}

impl Processor for MergeNode {
    fn node_type(&self) -> &str {
        "Merge"
    }

    fn process(&mut self, _ctx: &EvalContext, attrs: &Attrs, inputs: &[Option<Frame>]) -> Option<Frame> {
        let bottom = inputs.first().and_then(|f| f.as_ref());
        let top = inputs.get(1).and_then(|f| f.as_ref());
        match (bottom, top) {
            (Some(b), Some(t)) => over(b, t, attrs.get_float_or(A_OPACITY, 1.0)),
            (Some(b), None) => Some(b.clone()),
            (None, Some(t)) => Some(t.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::AttrValue;

    #[test]
    fn test_opaque_over_replaces() {
        let bg = Frame::solid(4, 4, [0.0, 0.0, 1.0, 1.0]);
        let fg = Frame::solid(4, 4, [1.0, 0.0, 0.0, 1.0]);
        let out = MergeNode
            .process(&EvalContext::new(0), &Attrs::new(), &[Some(bg), Some(fg)])
            .unwrap();
        assert_eq!(out.pixel(2, 2), Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_opacity_blends() {
        let bg = Frame::solid(2, 2, [0.0, 0.0, 0.0, 1.0]);
        let fg = Frame::solid(2, 2, [1.0, 1.0, 1.0, 1.0]);
        let mut attrs = Attrs::new();
        attrs.set(A_OPACITY, AttrValue::Float(0.5));

        let out = MergeNode.process(&EvalContext::new(0), &attrs, &[Some(bg), Some(fg)]).unwrap();
        assert_eq!(out.pixel(0, 0), Some([0.5, 0.5, 0.5, 1.0]));
    }

    #[test]
    fn test_smaller_foreground_is_clipped() {
        let bg = Frame::solid(4, 4, [0.0, 0.0, 0.0, 1.0]);
        let fg = Frame::solid(2, 2, [1.0, 1.0, 1.0, 1.0]);
        let out = over(&bg, &fg, 1.0).unwrap();
        assert_eq!(out.resolution(), (4, 4));
        assert_eq!(out.pixel(1, 1), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(out.pixel(3, 3), Some([0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_absent_side_passes_through() {
        let bg = Frame::new(2, 2);
        let out = MergeNode
            .process(&EvalContext::new(0), &Attrs::new(), &[Some(bg.clone()), None])
            .unwrap();
        assert!(out.shares_buffer(&bg));
        assert!(MergeNode.process(&EvalContext::new(0), &Attrs::new(), &[None, None]).is_none());
    }
}

//! Solid color generator. No inputs; fills the context size with `A_COLOR`.

use super::attrs::Attrs;
use super::frame::Frame;
use super::keys::A_COLOR;
use super::node::{EvalContext, Processor};

const DEFAULT_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Default)]
pub struct SolidNode;

impl Processor for SolidNode {
    fn node_type(&self) -> &str {
        "Solid"
    }

    fn process(&mut self, ctx: &EvalContext, attrs: &Attrs, _inputs: &[Option<Frame>]) -> Option<Frame> {
        let color = attrs.get_vec4(A_COLOR).unwrap_or(DEFAULT_COLOR);
        let (w, h) = ctx.output_size();
        Some(Frame::solid(w, h, color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::AttrValue;
    use crate::entities::node::Quality;

    #[test]
    fn test_solid_fills_context_size() {
        let mut attrs = Attrs::new();
        attrs.set(A_COLOR, AttrValue::Vec4([0.2, 0.4, 0.6, 1.0]));
        let ctx = EvalContext::new(0).with_size(8, 6);

        let frame = SolidNode.process(&ctx, &attrs, &[]).unwrap();
        assert_eq!(frame.resolution(), (8, 6));
        assert_eq!(frame.pixel(7, 5), Some([0.2, 0.4, 0.6, 1.0]));

        let draft = SolidNode.process(&ctx.with_quality(Quality::Draft), &attrs, &[]).unwrap();
        assert_eq!(draft.resolution(), (4, 3));
    }

    #[test]
    fn test_default_color_is_opaque_black() {
        let frame = SolidNode
            .process(&EvalContext::new(0).with_size(1, 1), &Attrs::new(), &[])
            .unwrap();
        assert_eq!(frame.pixel(0, 0), Some(DEFAULT_COLOR));
    }
}

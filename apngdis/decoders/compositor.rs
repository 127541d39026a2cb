use crate::decoders::png::{BlendOp, DisposeOp, FrameControl};
use crate::utils::error::{DisassemblerError, DisassemblerResult};
use crate::utils::image::{CompositedFrame, RawFrame};
use log::debug;

/// Canvas state carried from one frame to the next.
///
/// `apply` consumes the compositor and hands it back together with the
/// frame it produced, so every step gets its incoming canvas explicitly.
#[derive(Debug, Clone)]
pub struct Compositor {
    width: u32,
    height: u32,
    canvas: Vec<u8>,
    // Canvas contents before the last frame drawn with DisposeOp::Previous.
    snapshot: Option<Vec<u8>>,
    previous: Option<FrameControl>,
}

impl Compositor {
    /// A compositor over a fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Compositor {
        Compositor {
            width,
            height,
            canvas: vec![0; width as usize * height as usize * 4],
            snapshot: None,
            previous: None,
        }
    }

    /// A compositor whose canvas starts out as `pixels`.
    pub fn with_canvas(width: u32, height: u32, pixels: Vec<u8>) -> DisassemblerResult<Compositor> {
        let expected = width as usize * height as usize * 4;

        if pixels.len() != expected {
            return Err(DisassemblerError::dimension(format!(
                "Seed canvas has {} bytes, expected {}",
                pixels.len(),
                expected
            )));
        }

        Ok(Compositor {
            width,
            height,
            canvas: pixels,
            snapshot: None,
            previous: None,
        })
    }

    pub fn canvas(&self) -> &[u8] {
        &self.canvas
    }

    pub fn apply(mut self, fctl: &FrameControl, frame: &RawFrame) -> DisassemblerResult<(Compositor, CompositedFrame)> {
        if !fctl.fits_within(self.width, self.height) {
            return Err(DisassemblerError::dimension(format!(
                "Frame {}x{} at ({}, {}) does not fit a {}x{} canvas",
                fctl.width, fctl.height, fctl.x_offset, fctl.y_offset, self.width, self.height
            )));
        }

        if frame.width != fctl.width
            || frame.height != fctl.height
            || frame.pixels.len() != fctl.width as usize * fctl.height as usize * 4
        {
            return Err(DisassemblerError::dimension(format!(
                "Frame data is {}x{} ({} bytes), frame control declares {}x{}",
                frame.width,
                frame.height,
                frame.pixels.len(),
                fctl.width,
                fctl.height
            )));
        }

        if let Some(previous) = self.previous.take() {
            match previous.dispose_op {
                DisposeOp::None => {}
                DisposeOp::Background => self.clear_region(&previous),
                DisposeOp::Previous => {
                    if let Some(snapshot) = self.snapshot.take() {
                        self.canvas = snapshot;
                    }
                }
            }
        }

        if fctl.dispose_op == DisposeOp::Previous {
            self.snapshot = Some(self.canvas.clone());
        }

        match fctl.blend_op {
            BlendOp::Source => self.draw_source(fctl, &frame.pixels),
            BlendOp::Over => self.draw_over(fctl, &frame.pixels),
        }

        debug!(
            "Composited frame {} ({:?}/{:?}) at ({}, {}) {}x{}",
            fctl.sequence_number, fctl.dispose_op, fctl.blend_op, fctl.x_offset, fctl.y_offset, fctl.width, fctl.height
        );

        let output = CompositedFrame::new(self.width, self.height, self.canvas.clone(), fctl.delay);
        self.previous = Some(*fctl);

        Ok((self, output))
    }

    fn row_range(&self, fctl: &FrameControl, y: u32) -> std::ops::Range<usize> {
        let start = ((fctl.y_offset + y) as usize * self.width as usize + fctl.x_offset as usize) * 4;
        start..start + fctl.width as usize * 4
    }

    fn clear_region(&mut self, fctl: &FrameControl) {
        for y in 0..fctl.height {
            let range = self.row_range(fctl, y);
            self.canvas[range].fill(0);
        }
    }

    fn draw_source(&mut self, fctl: &FrameControl, pixels: &[u8]) {
        let src_stride = fctl.width as usize * 4;

        for y in 0..fctl.height {
            let range = self.row_range(fctl, y);
            let src = &pixels[y as usize * src_stride..(y as usize + 1) * src_stride];
            self.canvas[range].copy_from_slice(src);
        }
    }

    fn draw_over(&mut self, fctl: &FrameControl, pixels: &[u8]) {
        let src_stride = fctl.width as usize * 4;

        for y in 0..fctl.height {
            let range = self.row_range(fctl, y);
            let src_row = &pixels[y as usize * src_stride..(y as usize + 1) * src_stride];
            let dst_row = &mut self.canvas[range];

            for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                blend_over(dst, src);
            }
        }
    }
}

/// Source-over on straight-alpha RGBA8, computed in premultiplied space:
/// `out = src + dst * (1 - src.alpha)`.
fn blend_over(dst: &mut [u8], src: &[u8]) {
    let sa = src[3] as u32;

    match sa {
        0 => return,
        255 => {
            dst.copy_from_slice(src);
            return;
        }
        _ => {}
    }

    let da = dst[3] as u32;
    // Both scaled by 255 * 255.
    let alpha = sa * 255 + da * (255 - sa);

    if alpha == 0 {
        dst.fill(0);
        return;
    }

    for c in 0..3 {
        let premultiplied = src[c] as u32 * sa * 255 + dst[c] as u32 * da * (255 - sa);
        dst[c] = ((premultiplied + alpha / 2) / alpha) as u8;
    }

    dst[3] = ((alpha + 127) / 255) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::png::Delay;

    fn fctl(x: u32, y: u32, width: u32, height: u32, dispose_op: DisposeOp, blend_op: BlendOp) -> FrameControl {
        FrameControl {
            sequence_number: 0,
            width,
            height,
            x_offset: x,
            y_offset: y,
            delay: Delay::new(1, 2),
            dispose_op,
            blend_op,
        }
    }

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RawFrame {
        RawFrame::new(width, height, rgba.repeat((width * height) as usize))
    }

    #[test]
    fn full_canvas_source_is_identity() {
        let raw = RawFrame::new(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let (compositor, out) = Compositor::new(2, 1)
            .apply(&fctl(0, 0, 2, 1, DisposeOp::None, BlendOp::Source), &raw)
            .unwrap();

        assert_eq!(out.pixels(), raw.pixels.as_slice());
        assert_eq!(compositor.canvas(), raw.pixels.as_slice());
        assert_eq!(out.seconds(), 0.5);
        assert_eq!(out.delay(), Delay::new(1, 2));
    }

    #[test]
    fn background_dispose_clears_previous_region() {
        let red = [255, 0, 0, 255];
        let green = [0, 255, 0, 255];

        let (compositor, first) = Compositor::new(2, 2)
            .apply(&fctl(0, 0, 2, 2, DisposeOp::Background, BlendOp::Source), &solid(2, 2, red))
            .unwrap();
        assert!(first.pixels().chunks(4).all(|px| px == red));

        let (_, second) = compositor
            .apply(&fctl(1, 1, 1, 1, DisposeOp::None, BlendOp::Source), &solid(1, 1, green))
            .unwrap();

        assert_eq!(second.pixel(1, 1), Some(green));
        assert_eq!(second.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(second.pixel(1, 0), Some([0, 0, 0, 0]));
        assert_eq!(second.pixel(0, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn none_dispose_keeps_residual_pixels() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];

        let (compositor, _) = Compositor::new(2, 1)
            .apply(&fctl(0, 0, 2, 1, DisposeOp::None, BlendOp::Source), &solid(2, 1, red))
            .unwrap();
        let (_, out) = compositor
            .apply(&fctl(1, 0, 1, 1, DisposeOp::None, BlendOp::Source), &solid(1, 1, blue))
            .unwrap();

        assert_eq!(out.pixel(0, 0), Some(red));
        assert_eq!(out.pixel(1, 0), Some(blue));
    }

    #[test]
    fn previous_dispose_restores_pre_draw_canvas() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        let green = [0, 255, 0, 255];

        let (compositor, _) = Compositor::new(2, 1)
            .apply(&fctl(0, 0, 2, 1, DisposeOp::None, BlendOp::Source), &solid(2, 1, red))
            .unwrap();
        let (compositor, shown) = compositor
            .apply(&fctl(0, 0, 2, 1, DisposeOp::Previous, BlendOp::Source), &solid(2, 1, blue))
            .unwrap();
        // the emitted frame reflects the canvas right after drawing
        assert_eq!(shown.pixel(0, 0), Some(blue));

        let (_, out) = compositor
            .apply(&fctl(1, 0, 1, 1, DisposeOp::None, BlendOp::Source), &solid(1, 1, green))
            .unwrap();

        assert_eq!(out.pixel(0, 0), Some(red));
        assert_eq!(out.pixel(1, 0), Some(green));
    }

    #[test]
    fn seeded_canvas_shows_through() {
        let seed = [9, 9, 9, 255].repeat(2);
        let compositor = Compositor::with_canvas(2, 1, seed).unwrap();

        let (_, out) = compositor
            .apply(&fctl(1, 0, 1, 1, DisposeOp::None, BlendOp::Over), &solid(1, 1, [0, 0, 0, 0]))
            .unwrap();

        assert_eq!(out.pixels(), &[9, 9, 9, 255, 9, 9, 9, 255]);
        assert!(Compositor::with_canvas(2, 1, vec![0; 3]).is_err());
    }

    #[test]
    fn over_blends_half_alpha() {
        let (compositor, _) = Compositor::new(1, 1)
            .apply(&fctl(0, 0, 1, 1, DisposeOp::None, BlendOp::Source), &solid(1, 1, [0, 0, 255, 255]))
            .unwrap();
        let (_, out) = compositor
            .apply(&fctl(0, 0, 1, 1, DisposeOp::None, BlendOp::Over), &solid(1, 1, [255, 0, 0, 128]))
            .unwrap();

        assert_eq!(out.pixel(0, 0), Some([128, 0, 127, 255]));
    }

    #[test]
    fn over_on_transparent_keeps_source_color() {
        let (_, out) = Compositor::new(1, 1)
            .apply(&fctl(0, 0, 1, 1, DisposeOp::None, BlendOp::Over), &solid(1, 1, [200, 100, 50, 64]))
            .unwrap();

        assert_eq!(out.pixel(0, 0), Some([200, 100, 50, 64]));
    }

    #[test]
    fn source_overwrites_alpha() {
        let (compositor, _) = Compositor::new(1, 1)
            .apply(&fctl(0, 0, 1, 1, DisposeOp::None, BlendOp::Source), &solid(1, 1, [1, 2, 3, 255]))
            .unwrap();
        let (_, out) = compositor
            .apply(&fctl(0, 0, 1, 1, DisposeOp::None, BlendOp::Source), &solid(1, 1, [4, 5, 6, 0]))
            .unwrap();

        assert_eq!(out.pixel(0, 0), Some([4, 5, 6, 0]));
    }

    #[test]
    fn rejects_out_of_bounds_frames() {
        let result = Compositor::new(2, 2).apply(&fctl(1, 1, 2, 1, DisposeOp::None, BlendOp::Source), &solid(2, 1, [0; 4]));
        assert!(matches!(result, Err(DisassemblerError::DimensionMismatch(_))));

        let result = Compositor::new(2, 2).apply(&fctl(0, 0, 2, 2, DisposeOp::None, BlendOp::Source), &solid(1, 1, [0; 4]));
        assert!(matches!(result, Err(DisassemblerError::DimensionMismatch(_))));
    }
}

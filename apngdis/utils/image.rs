use crate::decoders::png::Delay;
use std::time::Duration;

/// Reconstructed RGBA8 pixels of a single frame region, before compositing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> RawFrame {
        RawFrame { width, height, pixels }
    }
}

/// A full-canvas RGBA8 frame as it should be shown to the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    delay: Delay,
}

impl CompositedFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, delay: Delay) -> CompositedFrame {
        CompositedFrame {
            width,
            height,
            pixels,
            delay,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn delay(&self) -> Delay {
        self.delay
    }

    /// How long the frame stays on screen, in seconds.
    pub fn seconds(&self) -> f64 {
        self.delay.seconds()
    }

    pub fn duration(&self) -> Duration {
        self.delay.duration()
    }

    /// RGBA value of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let at = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(at..at + 4)?;

        Some([px[0], px[1], px[2], px[3]])
    }
}

/// The decoded animation: every visible frame plus playback metadata.
#[derive(Debug, Clone)]
pub struct AnimatedImage {
    width: u32,
    height: u32,
    scale: f64,
    num_plays: u32,
    frames: Vec<CompositedFrame>,
    first_frame_hidden: bool,
}

impl AnimatedImage {
    pub fn new(
        width: u32,
        height: u32,
        scale: f64,
        num_plays: u32,
        frames: Vec<CompositedFrame>,
        first_frame_hidden: bool,
    ) -> AnimatedImage {
        AnimatedImage {
            width,
            height,
            scale,
            num_plays,
            frames,
            first_frame_hidden,
        }
    }

    /// Canvas width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Logical size in points: the pixel size divided by the display scale.
    pub fn size(&self) -> (f64, f64) {
        (self.width as f64 / self.scale, self.height as f64 / self.scale)
    }

    /// Number of times to play the animation; zero means forever.
    pub fn num_plays(&self) -> u32 {
        self.num_plays
    }

    pub fn loops_forever(&self) -> bool {
        self.num_plays == 0
    }

    pub fn frames(&self) -> &[CompositedFrame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<CompositedFrame> {
        self.frames
    }

    pub fn first_frame_hidden(&self) -> bool {
        self.first_frame_hidden
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Sum of all frame durations, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(|frame| frame.seconds()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(delay: Delay) -> CompositedFrame {
        CompositedFrame::new(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8], delay)
    }

    #[test]
    fn totals_frame_durations() {
        let image = AnimatedImage::new(2, 1, 1.0, 0, vec![frame(Delay::new(1, 2)), frame(Delay::new(25, 0))], false);

        assert_eq!(image.total_duration(), 0.75);
        assert!(image.loops_forever());
        assert!(image.is_animated());
    }

    #[test]
    fn size_is_in_points() {
        let image = AnimatedImage::new(480, 400, 2.0, 1, vec![frame(Delay::default())], true);

        assert_eq!(image.size(), (240.0, 200.0));
        assert!(image.first_frame_hidden());
        assert!(!image.is_animated());
    }

    #[test]
    fn pixel_lookup() {
        let f = frame(Delay::default());

        assert_eq!(f.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(f.pixel(2, 0), None);
        assert_eq!(f.into_pixels(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn into_frames_keeps_order() {
        let image = AnimatedImage::new(2, 1, 1.0, 0, vec![frame(Delay::new(1, 4)), frame(Delay::new(3, 4))], false);
        let frames = image.into_frames();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].delay(), Delay::new(1, 4));
        assert_eq!(frames[1].duration(), std::time::Duration::from_millis(750));
    }
}

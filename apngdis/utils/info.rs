use crate::decoders::png::{AnimationControl, ColorType, FrameControl};
use serde::Serialize;

/// Structure of an APNG stream, gathered without decompressing any image data.
#[derive(Debug, Clone, Serialize)]
pub struct ApngInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub interlace: bool,
    pub palette_entries: usize,
    pub transparency: Option<&'static str>,
    pub animation: Option<AnimationControl>,
    pub first_frame_hidden: bool,
    pub default_image_bytes: usize,
    pub frames: Vec<FrameInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameInfo {
    #[serde(flatten)]
    pub control: FrameControl,
    pub data_chunks: usize,
    pub compressed_bytes: usize,
    pub seconds: f64,
}

impl ApngInfo {
    pub fn is_animated(&self) -> bool {
        self.animation.is_some()
    }

    /// Sum of the declared frame delays, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(|frame| frame.seconds).sum()
    }
}

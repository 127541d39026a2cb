mod decoders;
mod utils;

pub use decoders::chunk::{Chunk, ChunkReader, ChunkType, PNG_SIGNATURE};
pub use decoders::compositor::Compositor;
pub use decoders::disassembler::Disassembler;
pub use decoders::inflate::inflate;
pub use decoders::png::{
    AnimationControl, BlendOp, ColorType, Delay, DisposeOp, FrameControl, ImageHeader, Transparency,
};
pub use decoders::scanline::{expand_to_rgba, filter, unfilter, FilterType};
pub use utils::error::{DisassemblerError, DisassemblerResult};
pub use utils::image::{AnimatedImage, CompositedFrame, RawFrame};
pub use utils::info::{ApngInfo, FrameInfo};
pub use utils::options::DecodeOptions;

use log::debug;
use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Decodes an APNG or PNG byte stream with default options.
pub fn decode(data: &[u8]) -> DisassemblerResult<AnimatedImage> {
    Disassembler::new(data).decode()
}

/// Checks that `data` starts with a PNG signature and a well-formed IHDR.
pub fn check_format(data: &[u8]) -> DisassemblerResult<ImageHeader> {
    Disassembler::new(data).check_format()
}

pub fn decode_file<P: AsRef<Path>>(path: P) -> DisassemblerResult<AnimatedImage> {
    decode_file_with_options(path, DecodeOptions::default())
}

pub fn decode_file_with_options<P: AsRef<Path>>(path: P, options: DecodeOptions) -> DisassemblerResult<AnimatedImage> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;

    debug!("Read {} bytes from {}", data.len(), path.display());

    Disassembler::with_options(&data, options).decode()
}

/// Decodes independent buffers, in parallel when the `rayon` feature is enabled.
/// Results keep the order of `inputs`.
pub fn decode_all(inputs: &[&[u8]]) -> Vec<DisassemblerResult<AnimatedImage>> {
    #[cfg(feature = "rayon")]
    {
        inputs.par_iter().map(|data| decode(data)).collect()
    }

    #[cfg(not(feature = "rayon"))]
    {
        inputs.iter().map(|data| decode(data)).collect()
    }
}

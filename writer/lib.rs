use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{Error, ErrorKind, Write};
use std::path::{Path, PathBuf};
use webp::{AnimEncoder, AnimFrame, WebPConfig};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub struct Writer {}

/// A full-canvas RGBA8 frame ready to be written out.
pub struct WriterImageFrame {
    pub width: u32,
    pub height: u32,
    pub delay_ms: u32,
    pub pixels: Vec<u8>,
}

pub struct WriterImage {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<WriterImageFrame>,
}

impl Writer {
    pub fn write_webp(output_path: &PathBuf, image: &WriterImage) -> Result<(), Error> {
        Writer::validate_pixel_count(image)?;

        let width = image.width;
        let height = image.height;

        let mut timestamp_ms = 0i32;
        let anim_frames = image
            .frames
            .iter()
            .map(|frame| {
                let start = timestamp_ms;
                timestamp_ms += frame.delay_ms.max(1) as i32;

                AnimFrame::from_rgba(frame.pixels.as_slice(), width, height, start)
            })
            .collect::<Vec<AnimFrame>>();

        let mut config =
            WebPConfig::new().map_err(|_| Error::new(ErrorKind::Other, "Failed to create WebP config"))?;
        config.lossless = 1i32;

        let mut encoder = AnimEncoder::new(width, height, &config);

        for frame in anim_frames {
            encoder.add_frame(frame);
        }

        let data = encoder.encode();

        let mut file = File::create(output_path)?;
        file.write_all(&data)?;

        Ok(())
    }

    /// Writes each frame as `<stem>_frame_<n>.png` next to `output_path`.
    pub fn write_png_frames(output_path: &Path, image: &WriterImage) -> Result<Vec<PathBuf>, Error> {
        Writer::validate_pixel_count(image)?;

        let output_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let stem = output_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "Invalid output file name"))?;

        let mut written = Vec::with_capacity(image.frames.len());

        for (i, frame) in image.frames.iter().enumerate() {
            let path = output_dir.join(format!("{}_frame_{}.png", stem, i));

            image::save_buffer(&path, &frame.pixels, frame.width, frame.height, image::ColorType::Rgba8)
                .map_err(|e| Error::new(ErrorKind::Other, e))?;

            written.push(path);
        }

        Ok(written)
    }

    pub fn write_pam(output_path: &PathBuf, width: u32, height: u32, pixels: &[u8]) -> Result<(), Error> {
        let expected_size = width as usize * height as usize * 4;

        if pixels.len() != expected_size {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Expected {} RGBA bytes for {}x{}, got {}", expected_size, width, height, pixels.len()),
            ));
        }

        let mut file = File::create(output_path)?;

        file.write_all(b"P7\n")?;
        file.write_all(format!("WIDTH {}\n", width).as_bytes())?;
        file.write_all(format!("HEIGHT {}\n", height).as_bytes())?;
        file.write_all(b"DEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n")?;
        file.write_all(pixels)?;

        Ok(())
    }

    fn validate_pixel_count(image: &WriterImage) -> Result<(), Error> {
        let expected_size = image.width as usize * image.height as usize * 4;

        for (i, frame) in image.frames.iter().enumerate() {
            if frame.width != image.width || frame.height != image.height || frame.pixels.len() != expected_size {
                let msg = format!(
                    "Invalid pixel data for frame {} of {}x{} RGBA image: expected {} bytes, got {}",
                    i,
                    image.width,
                    image.height,
                    expected_size,
                    frame.pixels.len()
                );

                return Err(Error::new(ErrorKind::InvalidData, msg));
            }
        }

        Ok(())
    }
}

/// Position, timing and operators of one animation frame, as stored in fcTL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
    pub delay_num: u16,
    pub delay_den: u16,
    pub dispose_op: u8,
    pub blend_op: u8,
}

impl FrameSpec {
    pub fn full(width: u32, height: u32, delay_num: u16, delay_den: u16) -> FrameSpec {
        FrameSpec {
            x_offset: 0,
            y_offset: 0,
            width,
            height,
            delay_num,
            delay_den,
            dispose_op: 0,
            blend_op: 0,
        }
    }

    pub fn at(mut self, x_offset: u32, y_offset: u32) -> FrameSpec {
        self.x_offset = x_offset;
        self.y_offset = y_offset;
        self
    }

    pub fn dispose(mut self, dispose_op: u8) -> FrameSpec {
        self.dispose_op = dispose_op;
        self
    }

    pub fn blend(mut self, blend_op: u8) -> FrameSpec {
        self.blend_op = blend_op;
        self
    }
}

/// Low-level PNG chunk stream. Every chunk gets its length and CRC filled in,
/// the payload is written as given so broken streams can be produced on purpose.
pub struct PngStream {
    bytes: Vec<u8>,
}

impl PngStream {
    pub fn new() -> PngStream {
        PngStream { bytes: PNG_SIGNATURE.to_vec() }
    }

    /// A stream without the PNG signature.
    pub fn unsigned() -> PngStream {
        PngStream { bytes: Vec::new() }
    }

    pub fn chunk(mut self, tag: &[u8; 4], data: &[u8]) -> PngStream {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(tag);
        hasher.update(data);

        self.bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
        self.bytes.extend_from_slice(tag);
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(&hasher.finalize().to_be_bytes());
        self
    }

    pub fn ihdr(self, width: u32, height: u32, bit_depth: u8, color_type: u8, interlace: u8) -> PngStream {
        let mut data = Vec::with_capacity(13);
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[bit_depth, color_type, 0, 0, interlace]);

        self.chunk(b"IHDR", &data)
    }

    pub fn plte(self, palette: &[[u8; 3]]) -> PngStream {
        let data = palette.iter().flatten().copied().collect::<Vec<u8>>();
        self.chunk(b"PLTE", &data)
    }

    pub fn trns(self, data: &[u8]) -> PngStream {
        self.chunk(b"tRNS", data)
    }

    pub fn actl(self, num_frames: u32, num_plays: u32) -> PngStream {
        let mut data = Vec::with_capacity(8);
        data.extend_from_slice(&num_frames.to_be_bytes());
        data.extend_from_slice(&num_plays.to_be_bytes());

        self.chunk(b"acTL", &data)
    }

    pub fn fctl(self, sequence_number: u32, spec: &FrameSpec) -> PngStream {
        let mut data = Vec::with_capacity(26);
        data.extend_from_slice(&sequence_number.to_be_bytes());
        data.extend_from_slice(&spec.width.to_be_bytes());
        data.extend_from_slice(&spec.height.to_be_bytes());
        data.extend_from_slice(&spec.x_offset.to_be_bytes());
        data.extend_from_slice(&spec.y_offset.to_be_bytes());
        data.extend_from_slice(&spec.delay_num.to_be_bytes());
        data.extend_from_slice(&spec.delay_den.to_be_bytes());
        data.extend_from_slice(&[spec.dispose_op, spec.blend_op]);

        self.chunk(b"fcTL", &data)
    }

    pub fn idat(self, compressed: &[u8]) -> PngStream {
        self.chunk(b"IDAT", compressed)
    }

    pub fn fdat(self, sequence_number: u32, compressed: &[u8]) -> PngStream {
        let mut data = Vec::with_capacity(compressed.len() + 4);
        data.extend_from_slice(&sequence_number.to_be_bytes());
        data.extend_from_slice(compressed);

        self.chunk(b"fdAT", &data)
    }

    pub fn iend(self) -> PngStream {
        self.chunk(b"IEND", &[])
    }

    /// Appends bytes verbatim.
    pub fn raw(mut self, bytes: &[u8]) -> PngStream {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for PngStream {
    fn default() -> PngStream {
        PngStream::new()
    }
}

/// Prefixes every `row_bytes` row with filter type 0 and zlib-compresses the result.
pub fn compress_scanlines(samples: &[u8], row_bytes: usize) -> Vec<u8> {
    let mut filtered = Vec::with_capacity(samples.len() + samples.len() / row_bytes.max(1) + 1);
    for row in samples.chunks(row_bytes.max(1)) {
        filtered.push(0);
        filtered.extend_from_slice(row);
    }

    compress(&filtered)
}

/// zlib-compresses already filtered scanlines.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());

    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Builds RGBA8 APNG streams frame by frame, numbering fcTL and fdAT chunks.
pub struct ApngBuilder {
    width: u32,
    height: u32,
    num_plays: u32,
    hidden_default: Option<Vec<u8>>,
    frames: Vec<(FrameSpec, Vec<u8>)>,
}

impl ApngBuilder {
    pub fn new(width: u32, height: u32) -> ApngBuilder {
        ApngBuilder {
            width,
            height,
            num_plays: 0,
            hidden_default: None,
            frames: Vec::new(),
        }
    }

    pub fn num_plays(mut self, num_plays: u32) -> ApngBuilder {
        self.num_plays = num_plays;
        self
    }

    /// Stores `pixels` as a default image that is not part of the animation.
    pub fn hidden_default(mut self, pixels: Vec<u8>) -> ApngBuilder {
        self.hidden_default = Some(pixels);
        self
    }

    /// Adds a frame. Without a hidden default image, the first frame becomes
    /// the IDAT image and must cover the whole canvas.
    pub fn frame(mut self, spec: FrameSpec, pixels: Vec<u8>) -> ApngBuilder {
        self.frames.push((spec, pixels));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut stream = PngStream::new()
            .ihdr(self.width, self.height, 8, 6, 0)
            .actl(self.frames.len() as u32, self.num_plays);

        let mut sequence_number = 0;
        let mut frames = self.frames.iter();

        match &self.hidden_default {
            Some(pixels) => {
                stream = stream.idat(&compress_scanlines(pixels, self.width as usize * 4));
            }
            None => {
                if let Some((spec, pixels)) = frames.next() {
                    stream = stream
                        .fctl(sequence_number, spec)
                        .idat(&compress_scanlines(pixels, spec.width as usize * 4));
                    sequence_number += 1;
                }
            }
        }

        for (spec, pixels) in frames {
            stream = stream.fctl(sequence_number, spec).fdat(
                sequence_number + 1,
                &compress_scanlines(pixels, spec.width as usize * 4),
            );
            sequence_number += 2;
        }

        stream.iend().finish()
    }
}

/// A non-animated RGBA8 PNG.
pub fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    PngStream::new()
        .ihdr(width, height, 8, 6, 0)
        .idat(&compress_scanlines(pixels, width as usize * 4))
        .iend()
        .finish()
}

use crate::utils::error::{DisassemblerError, DisassemblerResult};
use crate::utils::traits::SafeAccess;
use log::warn;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorType {
    Grayscale = 0,
    Rgb = 2,
    Indexed = 3,
    GrayscaleAlpha = 4,
    Rgba = 6,
}

impl ColorType {
    fn from_u8(value: u8) -> Option<ColorType> {
        match value {
            0 => Some(ColorType::Grayscale),
            2 => Some(ColorType::Rgb),
            3 => Some(ColorType::Indexed),
            4 => Some(ColorType::GrayscaleAlpha),
            6 => Some(ColorType::Rgba),
            _ => None,
        }
    }

    pub fn channels(&self) -> u32 {
        match self {
            ColorType::Grayscale | ColorType::Indexed => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }

    fn allows_bit_depth(&self, bit_depth: u8) -> bool {
        match self {
            ColorType::Grayscale => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
            ColorType::Indexed => matches!(bit_depth, 1 | 2 | 4 | 8),
            ColorType::Rgb | ColorType::GrayscaleAlpha | ColorType::Rgba => matches!(bit_depth, 8 | 16),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub interlace: bool,
}

impl ImageHeader {
    pub fn parse(data: &[u8]) -> DisassemblerResult<ImageHeader> {
        if data.len() != 13 {
            return Err(DisassemblerError::invalid_format(format!("IHDR length {}, expected 13", data.len())));
        }

        let width = data.read_u32_at(0)?;
        let height = data.read_u32_at(4)?;
        let bit_depth = data.read_u8_at(8)?;
        let color_type = data.read_u8_at(9)?;
        let compression_method = data.read_u8_at(10)?;
        let filter_method = data.read_u8_at(11)?;
        let interlace_method = data.read_u8_at(12)?;

        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(DisassemblerError::invalid_format(format!(
                "Invalid image dimensions: {}x{}",
                width, height
            )));
        }

        let color_type = ColorType::from_u8(color_type)
            .ok_or_else(|| DisassemblerError::invalid_format(format!("Invalid color type: {}", color_type)))?;

        if !color_type.allows_bit_depth(bit_depth) {
            return Err(DisassemblerError::invalid_format(format!(
                "Bit depth {} not allowed for color type {:?}",
                bit_depth, color_type
            )));
        }

        if compression_method != 0 {
            return Err(DisassemblerError::invalid_format(format!(
                "Invalid compression method: {}",
                compression_method
            )));
        }

        if filter_method != 0 {
            return Err(DisassemblerError::invalid_format(format!("Invalid filter method: {}", filter_method)));
        }

        let interlace = match interlace_method {
            0 => false,
            1 => true,
            _ => {
                return Err(DisassemblerError::invalid_format(format!(
                    "Invalid interlace method: {}",
                    interlace_method
                )))
            }
        };

        Ok(ImageHeader {
            width,
            height,
            bit_depth,
            color_type,
            interlace,
        })
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.color_type.channels() * self.bit_depth as u32
    }

    /// Filter stride in bytes, never less than one.
    pub fn bytes_per_pixel(&self) -> usize {
        ((self.bits_per_pixel() as usize) / 8).max(1)
    }

    /// Bytes in one scanline of a `width`-pixel row, excluding the filter byte.
    pub fn row_bytes(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel() as usize).div_ceil(8)
    }
}

pub fn parse_palette(data: &[u8]) -> DisassemblerResult<Vec<[u8; 3]>> {
    if data.is_empty() || data.len() % 3 != 0 || data.len() / 3 > 256 {
        return Err(DisassemblerError::invalid_format(format!("Invalid PLTE length: {}", data.len())));
    }

    Ok(data.chunks_exact(3).map(|rgb| [rgb[0], rgb[1], rgb[2]]).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transparency {
    Gray(u16),
    Rgb(u16, u16, u16),
    Palette(Vec<u8>),
}

impl Transparency {
    /// Parses a tRNS payload. Returns `None` for color types that carry
    /// their own alpha channel; such chunks are ignored.
    pub fn parse(
        data: &[u8],
        color_type: ColorType,
        palette: Option<&[[u8; 3]]>,
    ) -> DisassemblerResult<Option<Transparency>> {
        let trns = match color_type {
            ColorType::Grayscale => {
                if data.len() != 2 {
                    return Err(DisassemblerError::invalid_format("Invalid tRNS length for grayscale"));
                }

                Transparency::Gray(data.read_u16_at(0)?)
            }
            ColorType::Rgb => {
                if data.len() != 6 {
                    return Err(DisassemblerError::invalid_format("Invalid tRNS length for RGB"));
                }

                Transparency::Rgb(data.read_u16_at(0)?, data.read_u16_at(2)?, data.read_u16_at(4)?)
            }
            ColorType::Indexed => {
                let palette = palette.ok_or_else(|| DisassemblerError::invalid_format("tRNS chunk before PLTE chunk"))?;

                if data.len() > palette.len() {
                    return Err(DisassemblerError::invalid_format(format!(
                        "tRNS has {} entries for a palette of {}",
                        data.len(),
                        palette.len()
                    )));
                }

                Transparency::Palette(data.to_vec())
            }
            ColorType::GrayscaleAlpha | ColorType::Rgba => {
                warn!("tRNS chunk not allowed for color type {:?}, ignoring", color_type);
                return Ok(None);
            }
        };

        Ok(Some(trns))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Transparency::Gray(_) => "gray",
            Transparency::Rgb(..) => "rgb",
            Transparency::Palette(_) => "palette",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnimationControl {
    pub num_frames: u32,
    /// Zero means loop forever.
    pub num_plays: u32,
}

impl AnimationControl {
    pub fn parse(data: &[u8]) -> DisassemblerResult<AnimationControl> {
        if data.len() != 8 {
            return Err(DisassemblerError::invalid_format(format!("acTL length {}, expected 8", data.len())));
        }

        let num_frames = data.read_u32_at(0)?;
        let num_plays = data.read_u32_at(4)?;

        if num_frames == 0 {
            return Err(DisassemblerError::invalid_format("acTL chunk with zero frames"));
        }

        Ok(AnimationControl { num_frames, num_plays })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisposeOp {
    None = 0,
    Background = 1,
    Previous = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlendOp {
    Source = 0,
    Over = 1,
}

/// Frame delay as a fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delay {
    pub numerator: u16,
    pub denominator: u16,
}

impl Delay {
    /// A zero denominator means hundredths of a second.
    pub fn new(numerator: u16, denominator: u16) -> Delay {
        Delay {
            numerator,
            denominator: if denominator == 0 { 100 } else { denominator },
        }
    }

    pub fn seconds(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds())
    }
}

impl Default for Delay {
    fn default() -> Delay {
        Delay::new(1, 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameControl {
    pub sequence_number: u32,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub delay: Delay,
    pub dispose_op: DisposeOp,
    pub blend_op: BlendOp,
}

impl FrameControl {
    pub fn parse(data: &[u8]) -> DisassemblerResult<FrameControl> {
        if data.len() != 26 {
            return Err(DisassemblerError::invalid_format(format!("fcTL length {}, expected 26", data.len())));
        }

        let dispose_op = match data.read_u8_at(24)? {
            0 => DisposeOp::None,
            1 => DisposeOp::Background,
            2 => DisposeOp::Previous,
            n => return Err(DisassemblerError::invalid_format(format!("Invalid fcTL dispose_op: {}", n))),
        };

        let blend_op = match data.read_u8_at(25)? {
            0 => BlendOp::Source,
            1 => BlendOp::Over,
            n => return Err(DisassemblerError::invalid_format(format!("Invalid fcTL blend_op: {}", n))),
        };

        Ok(FrameControl {
            sequence_number: data.read_u32_at(0)?,
            width: data.read_u32_at(4)?,
            height: data.read_u32_at(8)?,
            x_offset: data.read_u32_at(12)?,
            y_offset: data.read_u32_at(16)?,
            delay: Delay::new(data.read_u16_at(20)?, data.read_u16_at(22)?),
            dispose_op,
            blend_op,
        })
    }

    /// A frame control spanning the whole canvas, used for a default image
    /// that is shown without any animation metadata.
    pub fn full_canvas(width: u32, height: u32, delay: Delay) -> FrameControl {
        FrameControl {
            sequence_number: 0,
            width,
            height,
            x_offset: 0,
            y_offset: 0,
            delay,
            dispose_op: DisposeOp::None,
            blend_op: BlendOp::Source,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && (self.x_offset as u64 + self.width as u64) <= width as u64
            && (self.y_offset as u64 + self.height as u64) <= height as u64
    }
}

/// Splits an fdAT payload into its sequence number and compressed data.
pub fn split_fdat(data: &[u8]) -> DisassemblerResult<(u32, &[u8])> {
    let sequence_number = data
        .read_u32_at(0)
        .map_err(|_| DisassemblerError::invalid_format("fdAT chunk shorter than its sequence number"))?;

    Ok((sequence_number, &data[4..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ihdr(width: u32, height: u32, bit_depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[bit_depth, color_type, 0, 0, interlace]);
        data
    }

    #[test]
    fn parses_header() {
        let header = ImageHeader::parse(&ihdr(100, 50, 8, 6, 0)).unwrap();

        assert_eq!(header.width, 100);
        assert_eq!(header.height, 50);
        assert_eq!(header.color_type, ColorType::Rgba);
        assert_eq!(header.bytes_per_pixel(), 4);
        assert_eq!(header.row_bytes(100), 400);
        assert!(!header.interlace);
    }

    #[test]
    fn sub_byte_rows_round_up() {
        let header = ImageHeader::parse(&ihdr(5, 1, 2, 3, 0)).unwrap();

        assert_eq!(header.bytes_per_pixel(), 1);
        assert_eq!(header.row_bytes(5), 2);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(ImageHeader::parse(&ihdr(0, 1, 8, 6, 0)).is_err());
        assert!(ImageHeader::parse(&ihdr(1, 1, 4, 2, 0)).is_err());
        assert!(ImageHeader::parse(&ihdr(1, 1, 8, 5, 0)).is_err());
        assert!(ImageHeader::parse(&ihdr(1, 1, 8, 6, 2)).is_err());
        assert!(ImageHeader::parse(&[0; 12]).is_err());
    }

    #[test]
    fn zero_denominator_means_hundredths() {
        let delay = Delay::new(50, 0);

        assert_eq!(delay.denominator, 100);
        assert_eq!(delay.seconds(), 0.5);
        assert_eq!(delay.duration(), Duration::from_millis(500));
    }

    #[test]
    fn parses_frame_control() {
        let mut data = Vec::new();
        for value in [3u32, 10, 20, 1, 2] {
            data.extend_from_slice(&value.to_be_bytes());
        }
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&[2, 1]);

        let fctl = FrameControl::parse(&data).unwrap();
        assert_eq!(fctl.sequence_number, 3);
        assert_eq!((fctl.width, fctl.height, fctl.x_offset, fctl.y_offset), (10, 20, 1, 2));
        assert_eq!(fctl.delay.seconds(), 0.25);
        assert_eq!(fctl.dispose_op, DisposeOp::Previous);
        assert_eq!(fctl.blend_op, BlendOp::Over);
        assert!(fctl.fits_within(11, 22));
        assert!(!fctl.fits_within(10, 22));

        data[24] = 3;
        assert!(matches!(FrameControl::parse(&data), Err(DisassemblerError::InvalidFormat(_))));
    }

    #[test]
    fn palette_transparency_cannot_exceed_palette() {
        let palette = parse_palette(&[1, 2, 3, 4, 5, 6]).unwrap();

        let trns = Transparency::parse(&[0, 128], ColorType::Indexed, Some(palette.as_slice())).unwrap();
        assert_eq!(trns, Some(Transparency::Palette(vec![0, 128])));

        assert!(Transparency::parse(&[0, 0, 0], ColorType::Indexed, Some(palette.as_slice())).is_err());
        assert!(Transparency::parse(&[0], ColorType::Indexed, None).is_err());
        assert_eq!(Transparency::parse(&[0, 0], ColorType::Rgba, None).unwrap(), None);
    }

    #[test]
    fn splits_frame_data_sequence() {
        let (seq, rest) = split_fdat(&[0, 0, 0, 7, 0xAA, 0xBB]).unwrap();
        assert_eq!(seq, 7);
        assert_eq!(rest, &[0xAA, 0xBB]);
        assert!(split_fdat(&[0, 1]).is_err());
    }
}

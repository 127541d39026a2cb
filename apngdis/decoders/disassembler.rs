use crate::decoders::chunk::{Chunk, ChunkReader, ChunkType};
use crate::decoders::compositor::Compositor;
use crate::decoders::inflate::inflate;
use crate::decoders::png::{
    parse_palette, split_fdat, AnimationControl, ColorType, FrameControl, ImageHeader, Transparency,
};
use crate::decoders::scanline::{expand_to_rgba, unfilter};
use crate::utils::error::{DisassemblerError, DisassemblerResult};
use crate::utils::image::{AnimatedImage, RawFrame};
use crate::utils::info::{ApngInfo, FrameInfo};
use crate::utils::options::DecodeOptions;
use log::{debug, warn};

/// An fcTL chunk and the fdAT payloads that follow it.
#[derive(Debug)]
struct FrameGroup<'a> {
    fctl: FrameControl,
    data: Vec<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum IdatState {
    NotSeen,
    Reading,
    Done,
}

/// Everything gathered from one pass over the chunks.
#[derive(Debug)]
struct ChunkLayout<'a> {
    header: ImageHeader,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<Transparency>,
    actl: Option<AnimationControl>,
    default_fctl: Option<FrameControl>,
    idat: Vec<&'a [u8]>,
    groups: Vec<FrameGroup<'a>>,
}

impl<'a> ChunkLayout<'a> {
    fn fctl_count(&self) -> usize {
        self.default_fctl.iter().count() + self.groups.len()
    }
}

/// Turns an APNG (or plain PNG) byte stream into composited frames.
pub struct Disassembler<'a> {
    data: &'a [u8],
    options: DecodeOptions,
}

impl<'a> Disassembler<'a> {
    pub fn new(data: &'a [u8]) -> Disassembler<'a> {
        Disassembler::with_options(data, DecodeOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: DecodeOptions) -> Disassembler<'a> {
        Disassembler { data, options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Validates the signature and header chunk without touching image data.
    pub fn check_format(&self) -> DisassemblerResult<ImageHeader> {
        let mut chunks = ChunkReader::new(self.data)?;
        let first = chunks
            .next()
            .ok_or_else(|| DisassemblerError::invalid_format("No IHDR chunk present"))??;

        self.read_header(&first)
    }

    pub fn decode(&self) -> DisassemblerResult<AnimatedImage> {
        let layout = self.read_layout()?;
        let header = layout.header;
        let (width, height) = (header.width, header.height);

        let actl = match layout.actl {
            Some(actl) => actl,
            None => {
                let raw = self.decode_frame(&layout, &layout.idat, width, height)?;
                let fctl = FrameControl::full_canvas(width, height, self.options.default_delay);
                let (_, frame) = Compositor::new(width, height).apply(&fctl, &raw)?;

                debug!("Decoded static PNG {}x{}", width, height);

                return Ok(AnimatedImage::new(width, height, self.options.scale, 0, vec![frame], false));
            }
        };

        let mut frames = Vec::with_capacity(layout.fctl_count());
        let default_image = self.decode_frame(&layout, &layout.idat, width, height)?;

        let (mut compositor, first_frame_hidden) = match &layout.default_fctl {
            Some(fctl) => {
                if fctl.x_offset != 0 || fctl.y_offset != 0 || fctl.width != width || fctl.height != height {
                    return Err(DisassemblerError::dimension(format!(
                        "Default image frame is {}x{} at ({}, {}), must cover the {}x{} canvas",
                        fctl.width, fctl.height, fctl.x_offset, fctl.y_offset, width, height
                    )));
                }

                let (compositor, frame) = Compositor::new(width, height).apply(fctl, &default_image)?;
                frames.push(frame);

                (compositor, false)
            }
            None => {
                debug!("Default image has no fcTL, hiding it and seeding the canvas");
                (Compositor::with_canvas(width, height, default_image.pixels)?, true)
            }
        };

        for group in &layout.groups {
            let fctl = &group.fctl;

            if !fctl.fits_within(width, height) {
                return Err(DisassemblerError::dimension(format!(
                    "Frame {} is {}x{} at ({}, {}), outside the {}x{} canvas",
                    fctl.sequence_number, fctl.width, fctl.height, fctl.x_offset, fctl.y_offset, width, height
                )));
            }

            let raw = self.decode_frame(&layout, &group.data, fctl.width, fctl.height)?;
            let (next, frame) = compositor.apply(fctl, &raw)?;

            compositor = next;
            frames.push(frame);
        }

        if frames.is_empty() {
            return Err(DisassemblerError::missing_fctl("Animation has no visible frames"));
        }

        debug!(
            "Decoded APNG {}x{}: {} frames, {} plays, first frame hidden: {}",
            width,
            height,
            frames.len(),
            actl.num_plays,
            first_frame_hidden
        );

        Ok(AnimatedImage::new(
            width,
            height,
            self.options.scale,
            actl.num_plays,
            frames,
            first_frame_hidden,
        ))
    }

    /// Describes the stream's structure without decompressing anything.
    pub fn get_info(&self) -> DisassemblerResult<ApngInfo> {
        let layout = self.read_layout()?;
        let header = layout.header;

        let frame_info = |control: &FrameControl, data: &[&[u8]]| FrameInfo {
            control: *control,
            data_chunks: data.len(),
            compressed_bytes: data.iter().map(|part| part.len()).sum(),
            seconds: control.delay.seconds(),
        };

        let mut frames = Vec::with_capacity(layout.fctl_count());
        if layout.actl.is_some() {
            if let Some(fctl) = &layout.default_fctl {
                frames.push(frame_info(fctl, layout.idat.as_slice()));
            }

            for group in &layout.groups {
                frames.push(frame_info(&group.fctl, group.data.as_slice()));
            }
        }

        Ok(ApngInfo {
            width: header.width,
            height: header.height,
            bit_depth: header.bit_depth,
            color_type: header.color_type,
            interlace: header.interlace,
            palette_entries: layout.palette.as_ref().map_or(0, |palette| palette.len()),
            transparency: layout.transparency.as_ref().map(|trns| trns.kind()),
            animation: layout.actl,
            first_frame_hidden: layout.actl.is_some() && layout.default_fctl.is_none(),
            default_image_bytes: layout.idat.iter().map(|part| part.len()).sum(),
            frames,
        })
    }

    fn verify(&self, chunk: &Chunk) -> DisassemblerResult<()> {
        if self.options.verify_crc {
            chunk.verify_crc()?;
        }

        Ok(())
    }

    fn read_header(&self, chunk: &Chunk) -> DisassemblerResult<ImageHeader> {
        self.verify(chunk)?;

        let header = ImageHeader::parse(chunk.data)?;

        if header.interlace {
            return Err(DisassemblerError::Unsupported("Interlaced PNG images".into()));
        }

        let area = header.width as u64 * header.height as u64;
        if area > self.options.max_pixels {
            return Err(DisassemblerError::dimension(format!(
                "Canvas {}x{} exceeds the {} pixel limit",
                header.width, header.height, self.options.max_pixels
            )));
        }

        Ok(header)
    }

    fn read_layout(&self) -> DisassemblerResult<ChunkLayout<'a>> {
        let mut chunks = ChunkReader::new(self.data)?;
        let first = chunks
            .next()
            .ok_or_else(|| DisassemblerError::invalid_format("No IHDR chunk present"))??;

        let mut layout = ChunkLayout {
            header: self.read_header(&first)?,
            palette: None,
            transparency: None,
            actl: None,
            default_fctl: None,
            idat: Vec::new(),
            groups: Vec::new(),
        };

        let mut idat_state = IdatState::NotSeen;
        let mut next_sequence = 0u32;
        let mut seen_trns = false;
        let mut seen_end = false;
        let mut stray_animation_chunks = 0usize;
        let mut early_frame_data = false;

        for chunk in chunks {
            let chunk = chunk?;
            self.verify(&chunk)?;

            let kind = chunk.kind();
            if idat_state == IdatState::Reading && kind != ChunkType::IDAT {
                idat_state = IdatState::Done;
            }

            // fcTL and fdAT only count once acTL has announced an animation.
            if matches!(kind, ChunkType::FCTL | ChunkType::FDAT) && layout.actl.is_none() {
                stray_animation_chunks += 1;
                continue;
            }

            match kind {
                ChunkType::IHDR => return Err(DisassemblerError::invalid_format("Duplicate IHDR chunk")),
                ChunkType::PLTE => {
                    if layout.palette.is_some() || idat_state != IdatState::NotSeen {
                        return Err(DisassemblerError::invalid_format("Misplaced PLTE chunk"));
                    }

                    layout.palette = Some(parse_palette(chunk.data)?);
                }
                ChunkType::TRNS => {
                    if seen_trns {
                        return Err(DisassemblerError::invalid_format("Multiple tRNS chunks"));
                    }

                    if idat_state != IdatState::NotSeen {
                        return Err(DisassemblerError::invalid_format("tRNS chunk after image data"));
                    }

                    seen_trns = true;
                    layout.transparency =
                        Transparency::parse(chunk.data, layout.header.color_type, layout.palette.as_deref())?;
                }
                ChunkType::ACTL => {
                    if layout.actl.is_some() {
                        return Err(DisassemblerError::invalid_format("Multiple acTL chunks"));
                    }

                    if idat_state != IdatState::NotSeen {
                        return Err(DisassemblerError::invalid_format("acTL chunk after image data"));
                    }

                    layout.actl = Some(AnimationControl::parse(chunk.data)?);
                }
                ChunkType::FCTL => {
                    let fctl = FrameControl::parse(chunk.data)?;
                    check_sequence(&mut next_sequence, fctl.sequence_number, "fcTL")?;

                    if idat_state == IdatState::NotSeen {
                        if layout.default_fctl.is_some() {
                            return Err(DisassemblerError::invalid_format(
                                "Second fcTL chunk before any image data",
                            ));
                        }

                        layout.default_fctl = Some(fctl);
                    } else {
                        layout.groups.push(FrameGroup { fctl, data: Vec::new() });
                    }
                }
                ChunkType::FDAT => {
                    let (sequence_number, payload) = split_fdat(chunk.data)?;
                    check_sequence(&mut next_sequence, sequence_number, "fdAT")?;

                    // Resolved once the scan knows whether a default image follows.
                    if idat_state == IdatState::NotSeen {
                        early_frame_data = true;
                        continue;
                    }

                    match layout.groups.last_mut() {
                        Some(group) => group.data.push(payload),
                        None => {
                            return Err(DisassemblerError::missing_fctl(format!(
                                "fdAT chunk {} without preceding fcTL chunk",
                                sequence_number
                            )))
                        }
                    }
                }
                ChunkType::IDAT => {
                    if idat_state == IdatState::Done {
                        return Err(DisassemblerError::invalid_format("IDAT chunks are not contiguous"));
                    }

                    if early_frame_data {
                        return Err(DisassemblerError::invalid_format("IDAT chunk after fdAT frame data"));
                    }

                    idat_state = IdatState::Reading;
                    layout.idat.push(chunk.data);
                }
                ChunkType::IEND => {
                    seen_end = true;
                }
                ChunkType::Unknown(_) => {
                    if kind.is_critical() {
                        warn!("Skipping unknown critical chunk {}", chunk.name());
                    } else {
                        debug!("Skipping ancillary chunk {}", chunk.name());
                    }
                }
            }
        }

        if !seen_end {
            warn!("Stream ended without an IEND chunk");
        }

        if layout.header.color_type == ColorType::Indexed && layout.palette.is_none() {
            return Err(DisassemblerError::invalid_format("Indexed image without PLTE chunk"));
        }

        if layout.idat.is_empty() {
            return Err(DisassemblerError::FirstFrameNotFound);
        }

        if stray_animation_chunks > 0 {
            warn!("Ignoring {} fcTL/fdAT chunks not preceded by acTL", stray_animation_chunks);
        }

        let actl = match layout.actl {
            Some(actl) => actl,
            None => return Ok(layout),
        };

        if layout.fctl_count() != actl.num_frames as usize {
            return Err(DisassemblerError::missing_fctl(format!(
                "acTL declares {} frames, found {} fcTL chunks",
                actl.num_frames,
                layout.fctl_count()
            )));
        }

        if let Some(group) = layout.groups.iter().find(|group| group.data.is_empty()) {
            return Err(DisassemblerError::decompression(format!(
                "fcTL {} is not followed by any fdAT chunk",
                group.fctl.sequence_number
            )));
        }

        Ok(layout)
    }

    fn decode_frame(&self, layout: &ChunkLayout, parts: &[&[u8]], width: u32, height: u32) -> DisassemblerResult<RawFrame> {
        let header = &layout.header;

        if width as u64 * height as u64 > self.options.max_pixels {
            return Err(DisassemblerError::dimension(format!(
                "Frame {}x{} exceeds the {} pixel limit",
                width, height, self.options.max_pixels
            )));
        }

        let expected_len = (header.row_bytes(width) + 1) * height as usize;
        let inflated = inflate(parts, expected_len)?;
        let samples = unfilter(&inflated, header, width, height)?;
        let pixels = expand_to_rgba(
            &samples,
            header,
            layout.palette.as_deref(),
            layout.transparency.as_ref(),
            width,
            height,
        )?;

        Ok(RawFrame::new(width, height, pixels))
    }
}

fn check_sequence(next: &mut u32, found: u32, chunk: &str) -> DisassemblerResult<()> {
    if found != *next {
        return Err(DisassemblerError::missing_fctl(format!(
            "{} sequence number {}, expected {}",
            chunk, found, next
        )));
    }

    *next += 1;

    Ok(())
}

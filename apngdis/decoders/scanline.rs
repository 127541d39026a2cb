use crate::decoders::png::{ColorType, ImageHeader, Transparency};
use crate::utils::error::{DisassemblerError, DisassemblerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl FilterType {
    pub fn from_u8(value: u8) -> Option<FilterType> {
        match value {
            0 => Some(FilterType::None),
            1 => Some(FilterType::Sub),
            2 => Some(FilterType::Up),
            3 => Some(FilterType::Average),
            4 => Some(FilterType::Paeth),
            _ => None,
        }
    }
}

fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    // a = left, b = above, c = upper left
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Predictor for byte `i` given the already reconstructed current row and
/// the previous row.
fn predict(filter: FilterType, row: &[u8], prior: &[u8], i: usize, bpp: usize) -> u8 {
    let left = if i >= bpp { row[i - bpp] } else { 0 };
    let above = prior[i];
    let upper_left = if i >= bpp { prior[i - bpp] } else { 0 };

    match filter {
        FilterType::None => 0,
        FilterType::Sub => left,
        FilterType::Up => above,
        FilterType::Average => ((left as u16 + above as u16) >> 1) as u8,
        FilterType::Paeth => paeth_predictor(left, above, upper_left),
    }
}

/// Reverses PNG filtering for `height` scanlines of a `width`-pixel image.
///
/// Returns the packed samples without filter bytes, `row_bytes * height` long.
pub fn unfilter(data: &[u8], header: &ImageHeader, width: u32, height: u32) -> DisassemblerResult<Vec<u8>> {
    let bpp = header.bytes_per_pixel();
    let row_bytes = header.row_bytes(width);
    let stride = row_bytes + 1;
    if data.len() != stride * height as usize {
        return Err(DisassemblerError::decompression(format!(
            "Expected {} scanlines of {} bytes, found {} bytes",
            height,
            stride,
            data.len()
        )));
    }

    let mut output = vec![0u8; row_bytes * height as usize];
    let mut prior = vec![0u8; row_bytes];

    for (y, scanline) in data.chunks_exact(stride).take(height as usize).enumerate() {
        let filter = FilterType::from_u8(scanline[0]).ok_or_else(|| {
            DisassemblerError::decompression(format!("Invalid filter type {} on scanline {}", scanline[0], y))
        })?;

        let row = &mut output[y * row_bytes..(y + 1) * row_bytes];
        for i in 0..row_bytes {
            row[i] = scanline[i + 1].wrapping_add(predict(filter, row, &prior, i, bpp));
        }

        prior.copy_from_slice(row);
    }

    Ok(output)
}

/// Applies `filter` to every row of packed samples, producing the filtered
/// byte stream (with filter bytes) that `unfilter` reverses.
pub fn filter(samples: &[u8], header: &ImageHeader, width: u32, filter: FilterType) -> Vec<u8> {
    let bpp = header.bytes_per_pixel();
    let row_bytes = header.row_bytes(width);
    let mut output = Vec::with_capacity(samples.len() + samples.len() / row_bytes.max(1));
    let mut prior = vec![0u8; row_bytes];

    for row in samples.chunks_exact(row_bytes) {
        output.push(filter as u8);
        for i in 0..row_bytes {
            output.push(row[i].wrapping_sub(predict(filter, row, &prior, i, bpp)));
        }
        prior.copy_from_slice(row);
    }

    output
}

/// Unpacks one row of 1/2/4/8-bit samples into one byte per sample.
fn unpack_row(row: &[u8], bit_depth: u8, count: usize) -> impl Iterator<Item = u8> + '_ {
    let per_byte = 8 / bit_depth as usize;
    let mask = ((1u16 << bit_depth) - 1) as u8;

    (0..count).map(move |n| {
        let byte = row[n / per_byte];
        let shift = (per_byte - 1 - n % per_byte) * bit_depth as usize;
        (byte >> shift) & mask
    })
}

fn scale_to_u8(value: u8, bit_depth: u8) -> u8 {
    match bit_depth {
        1 => value * 0xFF,
        2 => value * 0x55,
        4 => value * 0x11,
        _ => value,
    }
}

/// Expands unfiltered samples into RGBA8.
pub fn expand_to_rgba(
    samples: &[u8],
    header: &ImageHeader,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&Transparency>,
    width: u32,
    height: u32,
) -> DisassemblerResult<Vec<u8>> {
    let row_bytes = header.row_bytes(width);
    let pixel_count = width as usize * height as usize;
    let depth = header.bit_depth;
    let mut output = Vec::with_capacity(pixel_count * 4);

    if samples.len() < row_bytes * height as usize {
        return Err(DisassemblerError::decompression("Not enough samples for frame"));
    }

    let rows = samples.chunks_exact(row_bytes.max(1)).take(height as usize);

    match header.color_type {
        ColorType::Indexed => {
            let palette = palette.ok_or_else(|| DisassemblerError::invalid_format("Indexed image without PLTE"))?;
            let alphas: &[u8] = match transparency {
                Some(Transparency::Palette(alphas)) => alphas.as_slice(),
                _ => &[],
            };

            for row in rows {
                for index in unpack_row(row, depth, width as usize) {
                    let index = index as usize;
                    let rgb = palette.get(index).ok_or_else(|| {
                        DisassemblerError::invalid_format(format!(
                            "Palette index {} out of range ({} entries)",
                            index,
                            palette.len()
                        ))
                    })?;
                    let alpha = alphas.get(index).copied().unwrap_or(0xFF);

                    output.extend_from_slice(&[rgb[0], rgb[1], rgb[2], alpha]);
                }
            }
        }
        ColorType::Grayscale if depth < 16 => {
            let key = match transparency {
                Some(Transparency::Gray(key)) => Some(*key),
                _ => None,
            };

            for row in rows {
                for value in unpack_row(row, depth, width as usize) {
                    let gray = scale_to_u8(value, depth);
                    let alpha = if key == Some(value as u16) { 0 } else { 0xFF };

                    output.extend_from_slice(&[gray, gray, gray, alpha]);
                }
            }
        }
        ColorType::Grayscale => {
            let key = match transparency {
                Some(Transparency::Gray(key)) => Some(*key),
                _ => None,
            };

            for sample in samples[..row_bytes * height as usize].chunks_exact(2) {
                let value = u16::from_be_bytes([sample[0], sample[1]]);
                let alpha = if key == Some(value) { 0 } else { 0xFF };

                output.extend_from_slice(&[sample[0], sample[0], sample[0], alpha]);
            }
        }
        ColorType::Rgb => {
            let key = match transparency {
                Some(Transparency::Rgb(r, g, b)) => Some([*r, *g, *b]),
                _ => None,
            };
            let sample_bytes = depth as usize / 8;

            for pixel in samples[..row_bytes * height as usize].chunks_exact(sample_bytes * 3) {
                let channel = |c: usize| -> (u8, u16) {
                    let at = c * sample_bytes;
                    if sample_bytes == 2 {
                        (pixel[at], u16::from_be_bytes([pixel[at], pixel[at + 1]]))
                    } else {
                        (pixel[at], pixel[at] as u16)
                    }
                };

                let (r, r16) = channel(0);
                let (g, g16) = channel(1);
                let (b, b16) = channel(2);
                let alpha = if key == Some([r16, g16, b16]) { 0 } else { 0xFF };

                output.extend_from_slice(&[r, g, b, alpha]);
            }
        }
        ColorType::GrayscaleAlpha => {
            let sample_bytes = depth as usize / 8;

            for pixel in samples[..row_bytes * height as usize].chunks_exact(sample_bytes * 2) {
                let gray = pixel[0];
                let alpha = pixel[sample_bytes];

                output.extend_from_slice(&[gray, gray, gray, alpha]);
            }
        }
        ColorType::Rgba => {
            if depth == 8 {
                output.extend_from_slice(&samples[..pixel_count * 4]);
            } else {
                for pixel in samples[..row_bytes * height as usize].chunks_exact(8) {
                    output.extend_from_slice(&[pixel[0], pixel[2], pixel[4], pixel[6]]);
                }
            }
        }
    }

    Ok(output)
}

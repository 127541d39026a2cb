use crate::utils::error::{DisassemblerError, DisassemblerResult};
use flate2::read::ZlibDecoder;
use log::debug;
use std::io::Read;

/// Decompresses the concatenation of `parts` as a single zlib stream.
///
/// The stream must not inflate to more than `expected_len` bytes; any excess
/// is `DecompressionFailed`.
pub fn inflate(parts: &[&[u8]], expected_len: usize) -> DisassemblerResult<Vec<u8>> {
    let compressed_len: usize = parts.iter().map(|part| part.len()).sum();

    if compressed_len == 0 {
        return Err(DisassemblerError::decompression("No compressed image data"));
    }

    let mut compressed = Vec::with_capacity(compressed_len);
    for part in parts {
        compressed.extend_from_slice(part);
    }

    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut decompressed = Vec::with_capacity(expected_len);
    (&mut decoder)
        .take(expected_len as u64)
        .read_to_end(&mut decompressed)
        .map_err(|e| DisassemblerError::decompression(e.to_string()))?;

    let mut extra = [0u8; 1];
    let trailing = decoder
        .read(&mut extra)
        .map_err(|e| DisassemblerError::decompression(e.to_string()))?;

    if trailing != 0 {
        return Err(DisassemblerError::decompression(format!(
            "Image data inflates to more than the expected {} bytes",
            expected_len
        )));
    }

    debug!(
        "Inflated {} parts, {} -> {} bytes (expected {})",
        parts.len(),
        compressed_len,
        decompressed.len(),
        expected_len
    );

    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn inflates_split_stream() {
        let raw: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let compressed = compress(&raw);
        let (a, b) = compressed.split_at(compressed.len() / 3);

        assert_eq!(inflate(&[a, b], raw.len()).unwrap(), raw);
    }

    #[test]
    fn rejects_excess_output() {
        let compressed = compress(&[7; 64]);

        assert_eq!(inflate(&[&compressed], 64).unwrap(), vec![7; 64]);
        assert!(matches!(inflate(&[&compressed], 10), Err(DisassemblerError::DecompressionFailed(_))));
    }

    #[test]
    fn short_output_is_returned_as_is() {
        let compressed = compress(&[7; 8]);
        assert_eq!(inflate(&[&compressed], 16).unwrap(), vec![7; 8]);
    }

    #[test]
    fn garbage_fails() {
        let result = inflate(&[&[0xFF, 0x00, 0x12, 0x34]], 16);
        assert!(matches!(result, Err(DisassemblerError::DecompressionFailed(_))));
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(inflate(&[], 16), Err(DisassemblerError::DecompressionFailed(_))));
    }
}

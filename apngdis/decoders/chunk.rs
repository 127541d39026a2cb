use crate::utils::error::{DisassemblerError, DisassemblerResult};
use crate::utils::traits::SafeAccess;
use log::debug;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    // Critical chunks
    IHDR, // Image header
    PLTE, // Palette
    IDAT, // Image data
    IEND, // End of image

    // Ancillary chunks
    TRNS, // Transparency

    // Animation chunks
    ACTL, // Animation control
    FCTL, // Frame control
    FDAT, // Frame data

    Unknown([u8; 4]),
}

impl ChunkType {
    pub fn from_tag(tag: [u8; 4]) -> ChunkType {
        match &tag {
            b"IHDR" => ChunkType::IHDR,
            b"PLTE" => ChunkType::PLTE,
            b"IDAT" => ChunkType::IDAT,
            b"IEND" => ChunkType::IEND,
            b"tRNS" => ChunkType::TRNS,
            b"acTL" => ChunkType::ACTL,
            b"fcTL" => ChunkType::FCTL,
            b"fdAT" => ChunkType::FDAT,
            _ => ChunkType::Unknown(tag),
        }
    }

    /// Critical chunks have an uppercase first letter.
    pub fn is_critical(&self) -> bool {
        match self {
            ChunkType::Unknown(tag) => tag[0].is_ascii_uppercase(),
            ChunkType::IHDR | ChunkType::PLTE | ChunkType::IDAT | ChunkType::IEND => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub tag: [u8; 4],
    pub data: &'a [u8],
    pub crc: u32,
}

impl<'a> Chunk<'a> {
    pub fn kind(&self) -> ChunkType {
        ChunkType::from_tag(self.tag)
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.tag).to_string()
    }

    pub fn declared_length(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn verify_crc(&self) -> DisassemblerResult<()> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.tag);
        hasher.update(self.data);
        let actual = hasher.finalize();

        if actual != self.crc {
            return Err(DisassemblerError::IntegrityCheckFailed {
                chunk: self.name(),
                expected: self.crc,
                actual,
            });
        }

        Ok(())
    }
}

pub fn check_signature(data: &[u8]) -> DisassemblerResult<()> {
    if data.len() < PNG_SIGNATURE.len() || data[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(DisassemblerError::invalid_format("Missing PNG signature"));
    }

    Ok(())
}

/// Walks the chunks of a PNG stream held entirely in memory.
///
/// The reader stops after `IEND` or at the end of the buffer, and yields
/// nothing further once an error has been returned.
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    seen_header: bool,
    done: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> DisassemblerResult<ChunkReader<'a>> {
        check_signature(data)?;

        Ok(ChunkReader {
            data,
            pos: PNG_SIGNATURE.len(),
            seen_header: false,
            done: false,
        })
    }

    fn read_chunk(&mut self) -> DisassemblerResult<Chunk<'a>> {
        let length = self.data.read_u32_at(self.pos).map_err(|_| {
            DisassemblerError::invalid_format(format!("Truncated chunk header at offset {}", self.pos))
        })? as usize;

        if length > i32::MAX as usize {
            return Err(DisassemblerError::invalid_format(format!("Chunk length {} exceeds 2^31-1", length)));
        }

        let tag_start = self.pos + 4;
        let data_start = tag_start + 4;
        let data_end = data_start + length;

        if data_end + 4 > self.data.len() {
            return Err(DisassemblerError::invalid_format(format!(
                "Chunk at offset {} declares {} bytes, only {} available",
                self.pos,
                length,
                self.data.len().saturating_sub(data_start + 4)
            )));
        }

        let tag_bytes = self.data.get_range_safe(tag_start..data_start)?;
        let tag = [tag_bytes[0], tag_bytes[1], tag_bytes[2], tag_bytes[3]];

        if !tag.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(DisassemblerError::invalid_format(format!("Invalid chunk type {:?}", tag)));
        }

        let chunk = Chunk {
            tag,
            data: self.data.get_range_safe(data_start..data_end)?,
            crc: self.data.read_u32_at(data_end)?,
        };

        self.pos = data_end + 4;

        Ok(chunk)
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = DisassemblerResult<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.pos >= self.data.len() {
            self.done = true;

            if !self.seen_header {
                return Some(Err(DisassemblerError::invalid_format("No IHDR chunk present")));
            }

            return None;
        }

        let chunk = match self.read_chunk() {
            Ok(chunk) => chunk,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if !self.seen_header {
            if chunk.kind() != ChunkType::IHDR {
                self.done = true;
                return Some(Err(DisassemblerError::invalid_format(format!(
                    "First chunk is {}, expected IHDR",
                    chunk.name()
                ))));
            }

            self.seen_header = true;
        }

        if chunk.kind() == ChunkType::IEND {
            self.done = true;
        }

        debug!("Chunk {} ({} bytes)", chunk.name(), chunk.data.len());

        Some(Ok(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_chunk(out: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(data);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(tag);
        hasher.update(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
    }

    fn stream(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        for (tag, data) in chunks {
            push_chunk(&mut out, tag, data);
        }
        out
    }

    #[test]
    fn rejects_empty_and_foreign_data() {
        assert!(matches!(ChunkReader::new(&[]), Err(DisassemblerError::InvalidFormat(_))));

        let plist = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><plist></plist>";
        assert!(matches!(ChunkReader::new(plist), Err(DisassemblerError::InvalidFormat(_))));
    }

    #[test]
    fn reads_chunks_until_iend() {
        let data = stream(&[(b"IHDR", &[0; 13]), (b"tEXt", b"a\0b"), (b"IEND", &[]), (b"IDAT", &[1])]);
        let chunks: Vec<_> = ChunkReader::new(&data).unwrap().collect::<Result<_, _>>().unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].kind(), ChunkType::IHDR);
        assert_eq!(chunks[1].kind(), ChunkType::Unknown(*b"tEXt"));
        assert!(!chunks[1].kind().is_critical());
        assert_eq!(chunks[2].kind(), ChunkType::IEND);
        assert_eq!(chunks[0].declared_length(), 13);
        assert_eq!(chunks[1].declared_length(), 3);
        assert!(chunks.iter().all(|c| c.verify_crc().is_ok()));
    }

    #[test]
    fn first_chunk_must_be_header() {
        let data = stream(&[(b"IDAT", &[1, 2, 3])]);
        let mut reader = ChunkReader::new(&data).unwrap();

        assert!(matches!(reader.next(), Some(Err(DisassemblerError::InvalidFormat(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn signature_only_has_no_header() {
        let mut reader = ChunkReader::new(&PNG_SIGNATURE).unwrap();
        assert!(matches!(reader.next(), Some(Err(DisassemblerError::InvalidFormat(_)))));
    }

    #[test]
    fn length_past_end_is_invalid() {
        let mut data = stream(&[(b"IHDR", &[0; 13])]);
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"IDAT");
        data.extend_from_slice(&[0; 10]);

        let results: Vec<_> = ChunkReader::new(&data).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DisassemblerError::InvalidFormat(_))));
    }

    #[test]
    fn detects_corrupted_crc() {
        let mut data = stream(&[(b"IHDR", &[0; 13])]);
        let last = data.len() - 1;
        data[last] ^= 0xFF;

        let chunk = ChunkReader::new(&data).unwrap().next().unwrap().unwrap();
        assert!(matches!(chunk.verify_crc(), Err(DisassemblerError::IntegrityCheckFailed { .. })));
    }
}

use crate::utils::error::{DisassemblerError, DisassemblerResult};

/// Bounds-checked big-endian reads over chunk payloads.
pub(crate) trait SafeAccess {
    fn get_range_safe(&self, range: std::ops::Range<usize>) -> DisassemblerResult<&[u8]>;
    fn read_u8_at(&self, offset: usize) -> DisassemblerResult<u8>;
    fn read_u16_at(&self, offset: usize) -> DisassemblerResult<u16>;
    fn read_u32_at(&self, offset: usize) -> DisassemblerResult<u32>;
}

impl SafeAccess for [u8] {
    /// Safely retrieves a sub-slice.
    ///
    /// # Errors
    ///
    /// Returns `DisassemblerError::InvalidFormat` if the range is inverted or
    /// reaches past the end of the slice.
    fn get_range_safe(&self, range: std::ops::Range<usize>) -> DisassemblerResult<&[u8]> {
        self.get(range.clone()).ok_or_else(|| {
            DisassemblerError::invalid_format(format!(
                "Range {}..{} out of bounds (len {})",
                range.start,
                range.end,
                self.len()
            ))
        })
    }

    fn read_u8_at(&self, offset: usize) -> DisassemblerResult<u8> {
        Ok(self.get_range_safe(offset..offset + 1)?[0])
    }

    fn read_u16_at(&self, offset: usize) -> DisassemblerResult<u16> {
        let bytes = self.get_range_safe(offset..offset + 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32_at(&self, offset: usize) -> DisassemblerResult<u32> {
        let bytes = self.get_range_safe(offset..offset + 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

//! CRC-32 (IEEE 802.3) helpers.
//!
//! RAR uses the same polynomial everywhere; RAR3 header checksums keep
//! only the low 16 bits of the 32-bit value.

/// CRC-32 of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// The truncated header checksum used by RAR3 blocks.
pub fn crc32_low16(data: &[u8]) -> u16 {
    (crc32fast::hash(data) & 0xffff) as u16
}

/// Streaming CRC-32 accumulator for payload verification.
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

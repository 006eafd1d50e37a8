use crate::{rar3, rar5};

#[derive(Debug)]
/// A decoded block of either format, as handed to the info callback.
pub enum Block {
    Rar3(rar3::Block),
    Rar5(Box<rar5::Block>),
}

#[derive(Debug)]
/// Header checksum of a block; the width depends on the format.
pub enum HeaderCrc {
    Crc16(u16),
    Crc32(u32),
}

impl Block {
    /// Offset of the block in its volume.
    pub fn offset(&self) -> u64 {
        match self {
            Block::Rar3(b) => b.offset,
            Block::Rar5(b) => b.offset,
        }
    }

    /// Size of the data area following the block header.
    pub fn data_size(&self) -> u64 {
        match self {
            Block::Rar3(b) => b.add_size,
            Block::Rar5(b) => b.data_size.unwrap_or(0),
        }
    }

    /// The stored header checksum.
    pub fn header_crc(&self) -> HeaderCrc {
        match self {
            Block::Rar3(b) => HeaderCrc::Crc16(b.header_crc16),
            Block::Rar5(b) => HeaderCrc::Crc32(b.header_crc32),
        }
    }
}

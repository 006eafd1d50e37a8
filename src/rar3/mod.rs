//! The RAR3 container layout, written by RAR 1.50 up to RAR 4.x.
//!
//! A RAR3 archive is a flat stream of blocks, each with a fixed 7-byte
//! header, a type-specific header payload and an optional data area.
//! Header integrity is covered by a CRC-32 truncated to 16 bits; a
//! failed check is treated as the end of the archive, not an error.

mod block_parser;
mod blocks;
mod decode_file_name;
mod extended_time;

pub use block_parser::*;
pub use blocks::*;
pub use decode_file_name::decode_file_name;

const NAME_MAX_SIZE: u16 = 1000;

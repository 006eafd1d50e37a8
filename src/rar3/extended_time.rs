//! Extended timestamps for RAR3 file headers.
//!
//! DOS timestamps have two-second precision, so RAR 2.9 added an
//! optional trailer refining them. It starts with a u16 holding one
//! 4-bit field per timestamp:
//!
//! | Bits  | Name               |
//! | ----- | ------------------ |
//! | 15-12 | mtime flags        |
//! | 11-8  | ctime flags        |
//! | 7-4   | atime flags        |
//! | 3-0   | archive time flags |
//!
//! In each field, bit 0x08 says the timestamp is present, bit 0x04 adds
//! one second (rounding), and the low two bits give the byte count of a
//! fractional part in 100ns units. A present timestamp other than the
//! mtime (already carried by the fixed header) is preceded by its own
//! u32 DOS base value.

use std::io;

use crate::{read::*, time_conv};

#[derive(Debug)]
pub struct ExtendedTime {
    pub modification_time: Result<time::PrimitiveDateTime, u32>,
    pub creation_time: Option<Result<time::PrimitiveDateTime, u32>>,
    pub access_time: Option<Result<time::PrimitiveDateTime, u32>>,

    // unrar says this one is never written, but reading it is harmless.
    pub archive_time: Option<Result<time::PrimitiveDateTime, u32>>,
}

#[derive(Debug)]
struct TimeFieldFlags(u8);

impl TimeFieldFlags {
    const PRESENT: u8 = 0x8;
    const ADD_SECOND: u8 = 0x4;
    const PRECISION_MASK: u8 = 0x3;

    const MAX_PRECISION: u8 = 3;

    fn shifted(flags: u16, shift: u8) -> Self {
        Self((flags >> (shift * 4)) as u8 & 0xf)
    }

    fn present(&self) -> bool {
        self.0 & Self::PRESENT != 0
    }

    fn add_second(&self) -> bool {
        self.0 & Self::ADD_SECOND != 0
    }

    fn precision(&self) -> u8 {
        self.0 & Self::PRECISION_MASK
    }
}

impl ExtendedTime {
    pub fn read<R: io::Read>(
        reader: &mut R,
        modification_time: Result<time::PrimitiveDateTime, u32>,
    ) -> io::Result<Self> {
        let all_flags = read_u16(reader)?;

        // The mtime base was already read from the fixed header.
        let flags = TimeFieldFlags::shifted(all_flags, 3);
        let modification_time = match (modification_time, flags.present()) {
            (Ok(t), true) => Ok(read_increments(reader, t, flags)?),
            (t, _) => t,
        };

        let creation_time = read_stamp(reader, TimeFieldFlags::shifted(all_flags, 2))?;
        let access_time = read_stamp(reader, TimeFieldFlags::shifted(all_flags, 1))?;
        let archive_time = read_stamp(reader, TimeFieldFlags::shifted(all_flags, 0))?;

        Ok(ExtendedTime {
            modification_time,
            creation_time,
            access_time,
            archive_time,
        })
    }
}

/// Read a u32 DOS base value and refine it with the trailer.
fn read_stamp<R: io::Read>(
    reader: &mut R,
    flags: TimeFieldFlags,
) -> io::Result<Option<Result<time::PrimitiveDateTime, u32>>> {
    Ok(if flags.present() {
        let stamp = read_u32(reader)?;

        Some(match time_conv::parse_dos_datetime(stamp) {
            Ok(time) => Ok(read_increments(reader, time, flags)?),
            Err(_) => Err(stamp),
        })
    } else {
        None
    })
}

fn read_increments<R: io::Read>(
    reader: &mut R,
    mut t: time::PrimitiveDateTime,
    flags: TimeFieldFlags,
) -> io::Result<time::PrimitiveDateTime> {
    if flags.add_second() {
        t = t.saturating_add(time::Duration::SECOND);
    }

    let hundred_nanos = read_fraction(reader, flags.precision())?;
    let nanos = hundred_nanos as i64 * 100;

    Ok(t.saturating_add(time::Duration::nanoseconds(nanos)))
}

/// Read a `size`-byte little-endian fraction and shift it into the high
/// bytes of the 24-bit 100ns field.
fn read_fraction<R: io::Read>(reader: &mut R, size: u8) -> io::Result<u32> {
    let mut num = read_uint_le_sized(reader, size)? as u32;
    num <<= (TimeFieldFlags::MAX_PRECISION - size) * 8;
    Ok(num)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_shifts_into_high_bytes() -> io::Result<()> {
        let mut reader = io::Cursor::new(vec![0xff, 0xee, 0xdd]);
        assert_eq!(read_fraction(&mut reader, 1)?, 0xff0000);
        reader.set_position(0);
        assert_eq!(read_fraction(&mut reader, 3)?, 0xddeeff);
        Ok(())
    }

    #[test]
    fn add_second_bit_rounds_up() -> io::Result<()> {
        let base = time_conv::parse_dos_datetime(0x3C21A85D).unwrap();

        // mtime field only: present + add-second, no fraction bytes.
        let mut reader = io::Cursor::new(0xc000u16.to_le_bytes().to_vec());
        let ext = ExtendedTime::read(&mut reader, Ok(base))?;

        assert_eq!(ext.modification_time.unwrap(), base + time::Duration::SECOND);
        assert!(ext.creation_time.is_none());
        Ok(())
    }
}

use std::io;

use crate::{read::*, time_conv};

/// A record from a block's extra area: a type tag and its undecoded
/// payload.
pub struct RawRecord {
    pub record_type: u64,
    pub data: io::Cursor<Vec<u8>>,
}

/// Split an extra area into its records.
///
/// Each record is framed as `vint size, vint type, data`, where `size`
/// counts from the type field. A record overrunning the area ends the
/// iteration; the caller treats the remainder as opaque.
pub fn split_records(extra: &[u8]) -> Vec<RawRecord> {
    let mut records = vec![];
    let mut cursor = io::Cursor::new(extra);

    while (cursor.position() as usize) < extra.len() {
        let Ok((record_size, _)) = read_vint(&mut cursor) else {
            break;
        };
        let Ok((record_type, type_size)) = read_vint(&mut cursor) else {
            break;
        };

        let Some(data_size) = (record_size as usize).checked_sub(type_size as usize) else {
            break;
        };
        let Ok(data) = read_vec(&mut cursor, data_size) else {
            break;
        };

        records.push(RawRecord {
            record_type,
            data: io::Cursor::new(data),
        });
    }

    records
}

pub fn read_unix_time_sec<R: io::Read>(
    reader: &mut R,
) -> io::Result<Result<time::OffsetDateTime, u32>> {
    let seconds = read_u32(reader)?;
    Ok(time_conv::parse_unix_timestamp_sec(seconds).map_err(|_| seconds))
}

pub fn read_windows_time<R: io::Read>(
    reader: &mut R,
) -> io::Result<Result<time::OffsetDateTime, u64>> {
    let filetime = read_u64(reader)?;
    Ok(time_conv::parse_windows_filetime(filetime).map_err(|_| filetime))
}

#[derive(Debug)]
/// Quick-open and recovery record locations stashed in the main block.
pub struct LocatorRecord {
    pub quick_open_offset: Option<u64>,
    pub recovery_record_offset: Option<u64>,
}

flags! {
    struct LocatorRecordFlags(u8) {
        has_quick_open_offset = 0x01;
        has_recovery_record_offset = 0x02;
    }
}

impl LocatorRecord {
    pub fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = LocatorRecordFlags::new(flags as u8);

        let quick_open_offset = if flags.has_quick_open_offset() {
            Some(read_vint(reader)?.0).filter(|o| *o != 0)
        } else {
            None
        };

        let recovery_record_offset = if flags.has_recovery_record_offset() {
            Some(read_vint(reader)?.0).filter(|o| *o != 0)
        } else {
            None
        };

        Ok(LocatorRecord {
            quick_open_offset,
            recovery_record_offset,
        })
    }
}

#[derive(Debug)]
/// Per-file encryption parameters.
pub struct FileEncryptionRecord {
    pub flags: FileEncryptionRecordFlags,
    pub kdf_count: u8,
    pub salt: [u8; 16],
    pub iv: [u8; 16],
    pub check_value: Option<[u8; 12]>,
}

flags! {
    pub struct FileEncryptionRecordFlags(u8) {
        pub has_password_check = 0x01;
        pub uses_mac_checksum = 0x02;
    }
}

impl FileEncryptionRecord {
    pub fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (_version, _) = read_vint(reader)?;
        let (flags, _) = read_vint(reader)?;
        let flags = FileEncryptionRecordFlags::new(flags as u8);

        let kdf_count = read_u8(reader)?;
        let salt = read_const_bytes(reader)?;
        let iv = read_const_bytes(reader)?;

        let check_value = if flags.has_password_check() {
            Some(read_const_bytes(reader)?)
        } else {
            None
        };

        Ok(FileEncryptionRecord {
            flags,
            kdf_count,
            salt,
            iv,
            check_value,
        })
    }
}

#[derive(Debug)]
/// Hash of the unpacked file, stronger than the header CRC32.
pub struct FileHashRecord {
    pub hash: FileHash,
}

#[derive(Debug)]
pub enum FileHash {
    Blake2Sp([u8; 32]),
    Unknown(u64),
}

impl FileHashRecord {
    const BLAKE2SP: u64 = 0x00;

    pub fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (hash_type, _) = read_vint(reader)?;

        let hash = match hash_type {
            Self::BLAKE2SP => FileHash::Blake2Sp(read_const_bytes(reader)?),
            _ => FileHash::Unknown(hash_type),
        };

        Ok(FileHashRecord { hash })
    }
}

#[derive(Debug)]
/// High-resolution timestamps, either Unix or Windows FILETIME based.
pub struct FileTimeRecord {
    pub modification_time: Option<Result<time::OffsetDateTime, u64>>,
    pub creation_time: Option<Result<time::OffsetDateTime, u64>>,
    pub access_time: Option<Result<time::OffsetDateTime, u64>>,
}

flags! {
    struct FileTimeRecordFlags(u8) {
        uses_unix_time = 0x01;
        has_modification_time = 0x02;
        has_creation_time = 0x04;
        has_access_time = 0x08;
        has_unix_nanoseconds = 0x10;
    }
}

impl FileTimeRecord {
    pub fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = FileTimeRecordFlags::new(flags as u8);

        let mut read_stamp = |present: bool,
                              r: &mut R|
         -> io::Result<Option<Result<time::OffsetDateTime, u64>>> {
            if !present {
                return Ok(None);
            }
            Ok(Some(if flags.uses_unix_time() {
                read_unix_time_sec(r)?.map_err(|s| s as u64)
            } else {
                read_windows_time(r)?
            }))
        };

        let mut modification_time = read_stamp(flags.has_modification_time(), reader)?;
        let mut creation_time = read_stamp(flags.has_creation_time(), reader)?;
        let mut access_time = read_stamp(flags.has_access_time(), reader)?;

        // Unix stamps may be followed by one u32 of nanoseconds each.
        if flags.uses_unix_time() && flags.has_unix_nanoseconds() {
            for stamp in [&mut modification_time, &mut creation_time, &mut access_time] {
                if let Some(t) = stamp.take() {
                    let nanos = read_u32(reader)? as i64;
                    *stamp =
                        Some(t.map(|x| x.saturating_add(time::Duration::nanoseconds(nanos))));
                }
            }
        }

        Ok(FileTimeRecord {
            modification_time,
            creation_time,
            access_time,
        })
    }
}

#[derive(Debug)]
/// Symlink, junction or hardlink target.
pub struct RedirectionRecord {
    pub redirection_type: RedirectionType,
    pub flags: RedirectionRecordFlags,
    pub target: String,
}

int_enum! {
    pub enum RedirectionType : u16 {
        UnixSymlink = 0x0001,
        WindowsSymlink = 0x0002,
        WindowsJunction = 0x0003,
        HardLink = 0x0004,
        FileCopy = 0x0005,
    }
}

flags! {
    pub struct RedirectionRecordFlags(u16) {
        pub is_directory = 0x0001;
    }
}

impl RedirectionRecord {
    pub fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (redirection_type, _) = read_vint(reader)?;
        let (flags, _) = read_vint(reader)?;
        let (target_length, _) = read_vint(reader)?;
        let target = read_vec(reader, target_length.min(super::NAME_MAX_SIZE) as usize)?;

        Ok(RedirectionRecord {
            redirection_type: (redirection_type as u16).into(),
            flags: RedirectionRecordFlags::new(flags as u16),
            target: String::from_utf8_lossy(&target).into_owned(),
        })
    }
}

#[derive(Debug)]
/// Unix owner and group, by name and/or id.
pub struct UnixOwnerRecord {
    pub user_name: Option<Vec<u8>>,
    pub group_name: Option<Vec<u8>>,
    pub user_id: Option<u64>,
    pub group_id: Option<u64>,
}

flags! {
    struct UnixOwnerRecordFlags(u8) {
        has_user_name = 0x01;
        has_group_name = 0x02;
        has_user_id = 0x04;
        has_group_id = 0x08;
    }
}

impl UnixOwnerRecord {
    pub fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = UnixOwnerRecordFlags::new(flags as u8);

        let mut record = UnixOwnerRecord {
            user_name: None,
            group_name: None,
            user_id: None,
            group_id: None,
        };

        if flags.has_user_name() {
            let (size, _) = read_vint(reader)?;
            record.user_name = Some(read_vec(reader, size.min(super::NAME_MAX_SIZE) as usize)?);
        }

        if flags.has_group_name() {
            let (size, _) = read_vint(reader)?;
            record.group_name = Some(read_vec(reader, size.min(super::NAME_MAX_SIZE) as usize)?);
        }

        if flags.has_user_id() {
            record.user_id = Some(read_vint(reader)?.0);
        }

        if flags.has_group_id() {
            record.group_id = Some(read_vint(reader)?.0);
        }

        Ok(record)
    }
}

#[derive(Debug)]
/// Record type we don't decode.
pub struct UnknownRecord {
    pub tag: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_records_walks_the_area() {
        // Two records: (size=2, type=9, data=[0xaa]), (size=1, type=3).
        let extra = [0x02, 0x09, 0xaa, 0x01, 0x03];
        let records = split_records(&extra);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type, 9);
        assert_eq!(records[0].data.get_ref(), &vec![0xaa]);
        assert_eq!(records[1].record_type, 3);
        assert!(records[1].data.get_ref().is_empty());
    }

    #[test]
    fn split_records_stops_on_overrun() {
        // Claims 200 data bytes but only 1 follows.
        let extra = [0xc9, 0x01, 0x01, 0xaa];
        assert!(split_records(&extra).is_empty());
    }
}

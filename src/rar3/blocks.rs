use std::{io, ops::Deref};

use encoding_rs::Encoding;

use crate::{checksum, options, read::*, time_conv};

use super::{decode_file_name::decode_file_name, extended_time::ExtendedTime, NAME_MAX_SIZE};

/// Size of the fixed part of every RAR3 block header.
pub const BASE_HEADER_SIZE: u16 = 7;

#[derive(Debug)]
/// A generic RAR3 block.
pub struct Block {
    /// Offset of this block from the start of the volume.
    pub offset: u64,

    /// Offset of the data area following the header. For encrypted
    /// headers this accounts for the salt and cipher-block padding.
    pub data_offset: u64,

    /// Stored truncated CRC-32 of the header.
    pub header_crc16: u16,

    /// Size of the header.
    pub header_size: u16,

    /// Raw flag mask; the meaning depends on the block type.
    pub flags: u16,

    /// Length of the data area following the header.
    pub add_size: u64,

    /// Specific type of this block.
    pub kind: BlockKind,
}

flags! {
    /// Flags defined for every block type.
    pub struct CommonFlags(u16) {
        /// Unknown blocks with this flag must be skipped when updating
        /// an archive.
        pub skip_if_unknown = 0x4000;

        /// A data area follows the block header.
        pub contains_data = 0x8000;
    }
}

#[derive(Debug)]
/// Concrete block type.
pub enum BlockKind {
    /// The signature bytes viewed as a block; never CRC-checked.
    Mark,
    Main(MainBlock),
    File(FileBlock),
    /// RAR3 service stream (`CMT`, `RR`, ...); same layout as a file.
    Service(FileBlock),
    EndArchive(EndArchiveBlock),
    /// Block types written by RAR 2.x and earlier; recognized and
    /// skipped.
    Legacy(LegacyBlock),
    Unknown(UnknownBlock),
}

impl Block {
    pub const MARK: u8 = 0x72;
    pub const MAIN: u8 = 0x73;
    pub const FILE: u8 = 0x74;
    pub const OLD_COMMENT: u8 = 0x75;
    pub const OLD_EXTRA: u8 = 0x76;
    pub const OLD_SUB: u8 = 0x77;
    pub const OLD_RECOVERY: u8 = 0x78;
    pub const OLD_AUTH: u8 = 0x79;
    pub const SUB: u8 = 0x7a;
    pub const ENDARC: u8 = 0x7b;

    /// Read one block at `offset`, returning `None` when the stream is
    /// exhausted or the header fails its CRC check.
    ///
    /// A failed header CRC is deliberately not an error: RAR tools
    /// treat trailing garbage as end of archive, and a truncated
    /// archive still yields every entry parsed so far.
    pub fn read<R: io::Read>(
        reader: &mut R,
        offset: u64,
        charset: &'static Encoding,
    ) -> io::Result<Option<Self>> {
        let mut fixed = [0u8; BASE_HEADER_SIZE as usize];
        if !read_fully(reader, &mut fixed)? {
            return Ok(None);
        }

        let header_crc16 = u16::from_le_bytes([fixed[0], fixed[1]]);
        let block_type = fixed[2];
        let flags = u16::from_le_bytes([fixed[3], fixed[4]]);
        let header_size = u16::from_le_bytes([fixed[5], fixed[6]]);

        if block_type != Self::MARK && header_size < BASE_HEADER_SIZE {
            log::warn!("block at {offset} reports header size {header_size}, stopping");
            return Ok(None);
        }

        let mut payload = vec![0u8; header_size.saturating_sub(BASE_HEADER_SIZE) as usize];
        if !read_fully(reader, &mut payload)? {
            return Ok(None);
        }

        let add_size = if flags & 0x8000 != 0 && payload.len() >= 4 {
            u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as u64
        } else {
            0
        };

        // The checked region depends on the type: MAIN covers only the
        // first 6 payload bytes, OLD_AUTH 8, OLD_SUB drags in the data
        // area, everything else the whole header payload.
        if block_type != Self::MARK {
            let mut crc_data = Vec::with_capacity(5 + payload.len());
            crc_data.extend_from_slice(&fixed[2..]);

            match block_type {
                Self::MAIN => crc_data.extend_from_slice(&payload[..payload.len().min(6)]),
                Self::OLD_AUTH => crc_data.extend_from_slice(&payload[..payload.len().min(8)]),
                Self::OLD_SUB => {
                    crc_data.extend_from_slice(&payload);
                    let mut data = vec![0u8; add_size as usize];
                    if !read_fully(reader, &mut data)? {
                        return Ok(None);
                    }
                    crc_data.extend_from_slice(&data);
                }
                _ => crc_data.extend_from_slice(&payload),
            }

            if checksum::crc32_low16(&crc_data) != header_crc16 {
                log::debug!("header CRC mismatch at {offset}, treating as end of archive");
                return Ok(None);
            }
        }

        let mut cursor = io::Cursor::new(payload);

        // A header whose payload is shorter than its type requires is
        // treated as end of stream, same as a failed CRC.
        let kind = match Self::read_kind(block_type, &mut cursor, flags, charset) {
            Ok(kind) => kind,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::warn!("block at {offset} is shorter than its type allows, stopping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(Some(Block {
            offset,
            data_offset: offset + header_size as u64,
            header_crc16,
            header_size,
            flags,
            add_size,
            kind,
        }))
    }

    fn read_kind(
        block_type: u8,
        cursor: &mut io::Cursor<Vec<u8>>,
        flags: u16,
        charset: &'static Encoding,
    ) -> io::Result<BlockKind> {
        Ok(match block_type {
            Self::MARK => BlockKind::Mark,
            Self::MAIN => BlockKind::Main(MainBlock::read(cursor, flags)?),
            Self::FILE => BlockKind::File(FileBlock::read(cursor, flags, charset)?),
            Self::SUB => BlockKind::Service(FileBlock::read(cursor, flags, charset)?),
            Self::ENDARC => BlockKind::EndArchive(EndArchiveBlock::read(cursor, flags)?),
            Self::OLD_COMMENT | Self::OLD_EXTRA | Self::OLD_SUB | Self::OLD_RECOVERY
            | Self::OLD_AUTH => BlockKind::Legacy(LegacyBlock { tag: block_type }),
            _ => BlockKind::Unknown(UnknownBlock {
                tag: block_type,
                flags: CommonFlags::new(flags),
            }),
        })
    }

    /// Volume offset of the first byte after this block's data area.
    pub fn end_offset(&self) -> u64 {
        // OLD_SUB data was consumed by the CRC check but the offsets
        // still describe it as a data area.
        self.data_offset + self.add_size
    }
}

/// Fill `buf` completely, reporting `false` on a clean or mid-way EOF.
fn read_fully<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[derive(Debug)]
/// Main block carrying archive-wide metadata.
///
/// The first block after the signature; captured once.
pub struct MainBlock {
    pub flags: MainBlockFlags,

    /// Version of the header encryption, present on 3.x archives that
    /// set the encrypt-version flag. Not used for anything.
    pub encrypt_version: Option<u8>,
}

flags! {
    /// [`MainBlock`] flags.
    pub struct MainBlockFlags(u16) {
        /// Archive spans multiple volumes.
        pub is_volume = 0x0001;

        /// Main header contains an old-style (up to RAR 2.9) comment.
        pub has_old_comment = 0x0002;

        /// WinRAR will not modify this archive.
        pub is_locked = 0x0004;

        /// Archive uses solid compression.
        pub is_solid = 0x0008;

        /// Volumes are named `.part01.rar`, `.part02.rar`, ... rather
        /// than `.rar`, `.r00`, `.r01`, ...
        pub uses_new_numbering = 0x0010;

        /// Archive carries authenticity verification data.
        pub has_auth_verification = 0x0020;

        /// Archive contains a recovery record.
        pub has_recovery_record = 0x0040;

        /// Block headers are encrypted.
        pub has_encrypted_headers = 0x0080;

        /// Archive is the first volume; set by RAR 3.0+ only.
        pub is_first_volume = 0x0100;

        pub(self) has_encrypt_version = 0x0200;
    }
}

impl MainBlock {
    fn read<R: io::Read>(reader: &mut R, flags: u16) -> io::Result<Self> {
        let flags = MainBlockFlags::new(flags);

        // Offset of the authenticity block; not used by modern unrar.
        let _high_av_offset = read_u16(reader)?;
        let _low_av_offset = read_u32(reader)?;

        let encrypt_version = if flags.has_encrypt_version() {
            Some(read_u8(reader)?)
        } else {
            None
        };

        Ok(MainBlock {
            flags,
            encrypt_version,
        })
    }
}

impl Deref for MainBlock {
    type Target = MainBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

int_enum! {
    /// OS of the host system used to add the file to the archive.
    pub enum HostOs : u8 {
        /// MS-DOS
        MsDos = 0,

        /// OS/2
        Os2 = 1,

        /// Windows
        Win32 = 2,

        /// Unix-like (Linux, OS X/macOS)
        Unix = 3,

        /// Classic Mac OS (not to be confused with OS X/macOS)
        MacOs = 4,

        /// BeOS
        BeOs = 5,
    }
}

int_enum! {
    /// Compression method of a file entry. Everything except `Store`
    /// requires a decompressor.
    pub enum Method : u8 {
        Store = 0x30,
        Fastest = 0x31,
        Fast = 0x32,
        Normal = 0x33,
        Good = 0x34,
        Best = 0x35,
    }
}

#[derive(Debug)]
/// Block containing a file, a directory or a service stream.
pub struct FileBlock {
    pub flags: FileBlockFlags,

    /// Size of the data area of this block.
    pub packed_size: u64,

    /// Size of the file after decompression. For a split file this is
    /// the size of the whole logical file, not of this piece.
    pub unpacked_size: u64,

    /// OS used to add this file to the archive.
    pub host_os: HostOs,

    /// CRC32 of the unpacked file. In a split file, only the piece
    /// with `split_after` clear holds the CRC of the whole file;
    /// earlier pieces hold running values.
    pub crc32: u32,

    /// Modification time of the file.
    pub modification_time: Result<time::PrimitiveDateTime, u32>,

    /// Creation time of the file.
    pub creation_time: Option<Result<time::PrimitiveDateTime, u32>>,

    /// Access time of the file.
    pub access_time: Option<Result<time::PrimitiveDateTime, u32>>,

    /// Time at which the file was added to the archive.
    pub archive_time: Option<Result<time::PrimitiveDateTime, u32>>,

    /// RAR version needed to extract, times ten.
    pub extract_version: u8,

    pub method: Method,

    /// File attributes, dependent on the host OS.
    pub attributes: u32,

    /// Decoded filename.
    pub file_name: String,

    /// Filename bytes as stored, before any decoding. Split
    /// continuations are matched on this.
    pub orig_file_name: Vec<u8>,

    /// Per-file KDF salt, present when the data is encrypted.
    pub salt: Option<[u8; Self::SALT_SIZE]>,
}

flags! {
    /// [`FileBlock`] flags.
    pub struct FileBlockFlags(u16) {
        /// Data area continues from the previous volume.
        pub split_before = 0x0001;

        /// Data area continues in the next volume.
        pub split_after = 0x0002;

        /// Data area is encrypted.
        pub has_password = 0x0004;

        /// File header carries a comment (RAR 2.x).
        pub has_comment = 0x0008;

        /// File is compressed against preceding files.
        pub is_solid = 0x0010;

        /// All dictionary bits set mark a directory entry.
        pub is_directory = 0x00e0;

        /// 64-bit size fields follow the fixed ones.
        pub(self) has_large_size = 0x0100;

        /// Filename carries the compact UTF-16 encoding.
        pub(self) has_unicode_filename = 0x0200;

        /// An 8-byte KDF salt follows the filename.
        pub(self) has_salt = 0x0400;

        /// Entry is an old file version (`;n` suffix).
        pub has_version = 0x0800;

        /// Extended timestamps follow.
        pub(self) has_extended_time = 0x1000;

        /// Header has an extra area, RAR5-style.
        pub has_extra_area = 0x2000;
    }
}

impl FileBlock {
    const SALT_SIZE: usize = 8;

    fn read<R: io::Read>(
        reader: &mut R,
        flags: u16,
        charset: &'static Encoding,
    ) -> io::Result<Self> {
        let flags = FileBlockFlags::new(flags);

        let low_packed_size = read_u32(reader)? as u64;
        let low_unpacked_size = read_u32(reader)? as u64;
        let host_os = read_u8(reader)?.into();
        let crc32 = read_u32(reader)?;
        let dos_time = read_u32(reader)?;
        let mut modification_time =
            time_conv::parse_dos_datetime(dos_time).map_err(|_| dos_time);
        let extract_version = read_u8(reader)?;
        let method = read_u8(reader)?.into();
        let name_size = read_u16(reader)?.min(NAME_MAX_SIZE) as usize;
        let attributes = read_u32(reader)?;

        let (packed_size, unpacked_size) = if flags.has_large_size() {
            let high_packed_size = read_u32(reader)? as u64;
            let high_unpacked_size = read_u32(reader)? as u64;

            (
                low_packed_size | (high_packed_size << 32),
                low_unpacked_size | (high_unpacked_size << 32),
            )
        } else {
            (low_packed_size, low_unpacked_size)
        };

        let name = read_vec(reader, name_size)?;

        let (orig_file_name, file_name) = if flags.has_unicode_filename() {
            match name.iter().position(|b| *b == 0) {
                Some(i) => {
                    let decoded = decode_file_name(&name[..i], &name[i + 1..]);
                    (name[..i].to_vec(), decoded)
                }
                // No separator: the name is plain UTF-8.
                None => {
                    let decoded = String::from_utf8_lossy(&name).into_owned();
                    (name, decoded)
                }
            }
        } else {
            let decoded = if name.is_ascii() {
                String::from_utf8_lossy(&name).into_owned()
            } else {
                options::decode_fallback(&name, charset)
            };
            (name, decoded)
        };

        let salt = if flags.has_salt() {
            Some(read_const_bytes(reader)?)
        } else {
            None
        };

        let mut creation_time = None;
        let mut access_time = None;
        let mut archive_time = None;

        if flags.has_extended_time() {
            let ext = ExtendedTime::read(reader, modification_time)?;

            modification_time = ext.modification_time;
            creation_time = ext.creation_time;
            access_time = ext.access_time;
            archive_time = ext.archive_time;
        }

        Ok(FileBlock {
            flags,
            packed_size,
            unpacked_size,
            host_os,
            crc32,
            modification_time,
            creation_time,
            access_time,
            archive_time,
            extract_version,
            method,
            attributes,
            file_name,
            orig_file_name,
            salt,
        })
    }

    /// Whether this entry is a Unix symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.host_os == HostOs::Unix && self.attributes & 0xf000 == 0xa000
    }
}

impl Deref for FileBlock {
    type Target = FileBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
/// Block signaling the end of a volume or of the whole archive.
pub struct EndArchiveBlock {
    pub flags: EndArchiveBlockFlags,

    /// CRC32 of the archive data of this volume.
    pub data_crc32: Option<u32>,

    /// Number of the current volume.
    pub volume_number: Option<u16>,
}

flags! {
    /// [`EndArchiveBlock`] flags.
    pub struct EndArchiveBlockFlags(u16) {
        /// Archive continues in the next volume.
        pub has_next_volume = 0x0001;

        /// Volume data CRC32 follows.
        pub(self) has_data_crc32 = 0x0002;

        /// Space is reserved for the end-of-REV record.
        pub reserves_space = 0x0004;

        /// The volume number follows.
        pub(self) has_volume_number = 0x0008;
    }
}

impl EndArchiveBlock {
    fn read<R: io::Read>(reader: &mut R, flags: u16) -> io::Result<Self> {
        let flags = EndArchiveBlockFlags::new(flags);

        let data_crc32 = if flags.has_data_crc32() {
            Some(read_u32(reader)?)
        } else {
            None
        };

        let volume_number = if flags.has_volume_number() {
            Some(read_u16(reader)?)
        } else {
            None
        };

        Ok(EndArchiveBlock {
            flags,
            data_crc32,
            volume_number,
        })
    }
}

impl Deref for EndArchiveBlock {
    type Target = EndArchiveBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
/// Block type retired after RAR 2.x; carried through for inventory but
/// otherwise skipped.
pub struct LegacyBlock {
    pub tag: u8,
}

#[derive(Debug)]
/// Block we cannot decode.
pub struct UnknownBlock {
    pub tag: u8,
    pub flags: CommonFlags,
}

use std::{io, ops::Deref};

use crate::{checksum, read::*};

use super::{records::*, NAME_MAX_SIZE};

#[derive(Debug)]
/// A generic RAR5 block.
pub struct Block {
    /// Offset of this block from the start of the volume.
    pub offset: u64,

    /// Offset of the data area following the header. For encrypted
    /// headers this accounts for the IV prefix and cipher-block
    /// padding.
    pub data_offset: u64,

    /// Stored CRC-32 of the header (everything after the CRC field).
    pub header_crc32: u32,

    /// Size of the header on disk, including the CRC and size fields.
    pub header_size: u64,

    pub flags: CommonFlags,

    /// Size of the extra record area inside the header.
    pub extra_size: Option<u64>,

    /// Length of the data area following the header.
    pub data_size: Option<u64>,

    /// Specific type of this block.
    pub kind: BlockKind,
}

flags! {
    /// Flags defined for every block type.
    pub struct CommonFlags(u16) {
        /// An extra record area closes the block header.
        pub has_extra_area = 0x0001;

        /// A data area follows the block header.
        pub has_data_area = 0x0002;

        /// Unknown blocks with this flag must be skipped when updating
        /// an archive.
        pub skip_if_unknown = 0x0004;

        /// Data area continues from the previous volume.
        pub split_before = 0x0008;

        /// Data area continues in the next volume.
        pub split_after = 0x0010;

        /// Block depends on the preceding file block.
        pub is_child = 0x0020;

        /// Preserve the child block if the host block is modified.
        pub is_inherited = 0x0040;
    }
}

#[derive(Debug)]
/// Concrete block type.
pub enum BlockKind {
    Main(MainBlock),
    File(FileBlock),
    /// Service stream (`CMT`, `QO`, `RR`, ...); same layout as a file.
    Service(FileBlock),
    Crypt(CryptBlock),
    EndArchive(EndArchiveBlock),
    Unknown(UnknownBlock),
}

impl Block {
    pub const MAIN: u64 = 0x01;
    pub const FILE: u64 = 0x02;
    pub const SERVICE: u64 = 0x03;
    pub const CRYPT: u64 = 0x04;
    pub const ENDARC: u64 = 0x05;

    /// Read one block at `offset`, returning `None` when the stream is
    /// exhausted or the header fails its CRC check.
    pub fn read<R: io::Read>(reader: &mut R, offset: u64) -> io::Result<Option<Self>> {
        let mut crc_bytes = [0u8; 4];
        if !read_fully(reader, &mut crc_bytes)? {
            return Ok(None);
        }
        let header_crc32 = u32::from_le_bytes(crc_bytes);

        let Some((payload_size, size_bytes)) = try_read_vint_raw(reader)? else {
            return Ok(None);
        };

        // unrar refuses headers past 2 MiB; a larger claim is garbage.
        if payload_size == 0 || payload_size > 0x200000 {
            log::warn!("block at {offset} reports header size {payload_size}, stopping");
            return Ok(None);
        }

        let mut payload = vec![0u8; payload_size as usize];
        if !read_fully(reader, &mut payload)? {
            return Ok(None);
        }

        // The stored CRC covers everything after its own field, header
        // size vint included.
        let mut checked = checksum::Crc32::new();
        checked.update(&size_bytes);
        checked.update(&payload);
        if checked.finalize() != header_crc32 {
            log::debug!("header CRC mismatch at {offset}, treating as end of archive");
            return Ok(None);
        }

        let header_size = 4 + size_bytes.len() as u64 + payload_size;

        let mut cursor = io::Cursor::new(payload);

        let (block_type, _) = read_vint(&mut cursor)?;
        let (flags, _) = read_vint(&mut cursor)?;
        let flags = CommonFlags::new(flags as u16);

        let extra_size = if flags.has_extra_area() {
            Some(read_vint(&mut cursor)?.0)
        } else {
            None
        };

        let data_size = if flags.has_data_area() {
            Some(read_vint(&mut cursor)?.0)
        } else {
            None
        };

        // The extra record area closes the header payload.
        let payload_len = cursor.get_ref().len() as u64;
        let extra = match extra_size {
            Some(size) if size <= payload_len.saturating_sub(cursor.position()) => {
                let start = (payload_len - size) as usize;
                cursor.get_ref()[start..].to_vec()
            }
            Some(_) => {
                log::warn!("extra area at {offset} overruns its header, stopping");
                return Ok(None);
            }
            None => vec![],
        };

        // A header whose fields overrun its declared size is treated as
        // end of stream, same as a failed CRC.
        let kind = match Self::read_kind(block_type, &mut cursor, &extra) {
            Ok(kind) => kind,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::warn!("block at {offset} is shorter than its type allows, stopping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(Some(Block {
            offset,
            data_offset: offset + header_size,
            header_crc32,
            header_size,
            flags,
            extra_size,
            data_size,
            kind,
        }))
    }

    fn read_kind(
        block_type: u64,
        cursor: &mut io::Cursor<Vec<u8>>,
        extra: &[u8],
    ) -> io::Result<BlockKind> {
        Ok(match block_type {
            Self::MAIN => BlockKind::Main(MainBlock::read(cursor, extra)?),
            Self::FILE => BlockKind::File(FileBlock::read(cursor, extra)?),
            Self::SERVICE => BlockKind::Service(FileBlock::read(cursor, extra)?),
            Self::CRYPT => BlockKind::Crypt(CryptBlock::read(cursor)?),
            Self::ENDARC => BlockKind::EndArchive(EndArchiveBlock::read(cursor)?),
            _ => BlockKind::Unknown(UnknownBlock { tag: block_type }),
        })
    }

    /// Volume offset of the first byte after this block's data area.
    pub fn end_offset(&self) -> u64 {
        self.data_offset + self.data_size.unwrap_or(0)
    }
}

fn read_fully<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// [`read_vint`] that reports a clean EOF as `None` and keeps the raw
/// encoding, since the header CRC covers those bytes.
fn try_read_vint_raw<R: io::Read>(reader: &mut R) -> io::Result<Option<(u64, Vec<u8>)>> {
    let mut raw = vec![];
    let mut value: u64 = 0;

    loop {
        let byte = match read_u8(reader) {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };

        if raw.len() < 10 {
            value |= ((byte & 0x7f) as u64) << (7 * raw.len() as u32);
        }
        raw.push(byte);

        if byte & 0x80 == 0 {
            return Ok(Some((value, raw)));
        }
    }
}

impl Deref for Block {
    type Target = CommonFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug)]
/// Main block carrying archive-wide metadata.
pub struct MainBlock {
    pub flags: MainBlockFlags,

    /// Volume number; present on all volumes except the first.
    pub volume_number: Option<u64>,

    pub locator: Option<LocatorRecord>,

    pub unknown_records: Vec<UnknownRecord>,
}

flags! {
    /// [`MainBlock`] flags.
    pub struct MainBlockFlags(u16) {
        /// Archive spans multiple volumes.
        pub is_volume = 0x0001;

        /// The volume number field is present.
        pub(self) has_volume_number = 0x0002;

        /// Archive uses solid compression.
        pub is_solid = 0x0004;

        /// Archive contains a recovery record.
        pub has_recovery_record = 0x0008;

        /// WinRAR will not modify this archive.
        pub is_locked = 0x0010;
    }
}

impl MainBlock {
    const LOCATOR: u64 = 0x01;

    fn read<R: io::Read>(reader: &mut R, extra: &[u8]) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = MainBlockFlags::new(flags as u16);

        let volume_number = if flags.has_volume_number() {
            Some(read_vint(reader)?.0)
        } else {
            None
        };

        let mut locator = None;
        let mut unknown_records = vec![];

        for mut record in split_records(extra) {
            match record.record_type {
                Self::LOCATOR if locator.is_none() => {
                    locator = Some(LocatorRecord::read(&mut record.data)?);
                }
                tag => unknown_records.push(UnknownRecord { tag }),
            }
        }

        Ok(MainBlock {
            flags,
            volume_number,
            locator,
            unknown_records,
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
        Windows = 0,
        Unix = 1,
    }
}

/// Compression parameters packed into one vint.
#[derive(Clone, Copy)]
pub struct CompressionInfo(u64);

impl CompressionInfo {
    const VERSION_MASK: u64 = 0x003f;
    const SOLID_MASK: u64 = 0x0040;
    const METHOD_MASK: u64 = 0x0380;
    const DICT_EXPONENT_MASK: u64 = 0x7c00;

    /// Smallest RAR5 dictionary, 128 KiB.
    pub const MIN_DICT_SIZE: u64 = 0x20000;

    pub fn new(info: u64) -> Self {
        Self(info)
    }

    /// Version of the compression algorithm.
    pub fn version(&self) -> u8 {
        (self.0 & Self::VERSION_MASK) as u8
    }

    /// File is compressed against preceding files.
    pub fn is_solid(&self) -> bool {
        self.0 & Self::SOLID_MASK != 0
    }

    /// Compression method, 0 (stored) through 5 (best).
    pub fn method(&self) -> u8 {
        ((self.0 & Self::METHOD_MASK) >> 7) as u8
    }

    /// Dictionary size needed to unpack the file.
    pub fn dictionary_size(&self) -> u64 {
        let exponent = (self.0 & Self::DICT_EXPONENT_MASK) >> 10;
        Self::MIN_DICT_SIZE << (exponent & 0x0f)
    }
}

impl std::fmt::Debug for CompressionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionInfo")
            .field("version", &self.version())
            .field("is_solid", &self.is_solid())
            .field("method", &self.method())
            .field("dictionary_size", &self.dictionary_size())
            .finish()
    }
}

#[derive(Debug)]
/// Block containing a file, a directory or a service stream.
pub struct FileBlock {
    pub flags: FileBlockFlags,

    /// Size of the file after decompression; unknown when archiving
    /// from a pipe.
    pub unpacked_size: Option<u64>,

    /// OS-specific file attributes.
    pub attributes: u64,

    /// File modification time.
    pub modification_time: Option<Result<time::OffsetDateTime, u32>>,

    /// CRC32 of the unpacked file.
    pub crc32: Option<u32>,

    pub compression_info: CompressionInfo,

    /// OS used to add this file to the archive.
    pub host_os: HostOs,

    /// Raw name bytes; nominally UTF-8 with `/` separators.
    pub name: Vec<u8>,

    pub encryption: Option<FileEncryptionRecord>,

    pub hash: Option<FileHashRecord>,

    pub extended_time: Option<FileTimeRecord>,

    pub redirection: Option<RedirectionRecord>,

    pub unix_owner: Option<UnixOwnerRecord>,

    pub unknown_records: Vec<UnknownRecord>,
}

flags! {
    /// [`FileBlock`] flags.
    pub struct FileBlockFlags(u16) {
        pub is_directory = 0x0001;
        pub(self) has_modification_time = 0x0002;
        pub(self) has_crc32 = 0x0004;
        pub(self) unknown_unpacked_size = 0x0008;
    }
}

impl FileBlock {
    const CRYPT: u64 = 0x01;
    const HASH: u64 = 0x02;
    const HTIME: u64 = 0x03;
    const VERSION: u64 = 0x04;
    const REDIR: u64 = 0x05;
    const UOWNER: u64 = 0x06;

    fn read<R: io::Read>(reader: &mut R, extra: &[u8]) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;
        let flags = FileBlockFlags::new(flags as u16);

        let (unpacked_size, _) = read_vint(reader)?;
        let unpacked_size = if flags.unknown_unpacked_size() {
            None
        } else {
            Some(unpacked_size)
        };

        let (attributes, _) = read_vint(reader)?;

        let modification_time = if flags.has_modification_time() {
            Some(read_unix_time_sec(reader)?)
        } else {
            None
        };

        let crc32 = if flags.has_crc32() {
            Some(read_u32(reader)?)
        } else {
            None
        };

        let (compression_info, _) = read_vint(reader)?;
        let compression_info = CompressionInfo::new(compression_info);

        let (host_os, _) = read_vint(reader)?;

        let (name_length, _) = read_vint(reader)?;
        let name = read_vec(reader, name_length.min(NAME_MAX_SIZE) as usize)?;

        let mut encryption = None;
        let mut hash = None;
        let mut extended_time = None;
        let mut redirection = None;
        let mut unix_owner = None;
        let mut unknown_records = vec![];

        for mut record in split_records(extra) {
            let data = &mut record.data;
            match record.record_type {
                Self::CRYPT if encryption.is_none() => {
                    encryption = Some(FileEncryptionRecord::read(data)?);
                }
                Self::HASH if hash.is_none() => {
                    hash = Some(FileHashRecord::read(data)?);
                }
                Self::HTIME if extended_time.is_none() => {
                    extended_time = Some(FileTimeRecord::read(data)?);
                }
                Self::REDIR if redirection.is_none() => {
                    redirection = Some(RedirectionRecord::read(data)?);
                }
                Self::UOWNER if unix_owner.is_none() => {
                    unix_owner = Some(UnixOwnerRecord::read(data)?);
                }
                // File version records carry nothing we surface.
                Self::VERSION => {}
                tag => unknown_records.push(UnknownRecord { tag }),
            }
        }

        Ok(FileBlock {
            flags,
            unpacked_size,
            attributes,
            modification_time,
            crc32,
            compression_info,
            host_os: (host_os as u8).into(),
            name,
            encryption,
            hash,
            extended_time,
            redirection,
            unix_owner,
            unknown_records,
        })
    }

    /// Decoded file name; RAR5 names are UTF-8.
    pub fn file_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Best available modification time.
    pub fn best_modification_time(&self) -> Option<Result<time::OffsetDateTime, u64>> {
        if let Some(t) = &self.extended_time {
            if let Some(t) = &t.modification_time {
                return Some(*t);
            }
        }

        self.modification_time.map(|r| r.map_err(|t| t as u64))
    }

    /// Whether this entry redirects to a symlink target.
    pub fn is_symlink(&self) -> bool {
        matches!(
            self.redirection.as_ref().map(|r| r.redirection_type),
            Some(RedirectionType::UnixSymlink) | Some(RedirectionType::WindowsSymlink)
        )
    }
}

impl Deref for FileBlock {
    type Target = FileBlockFlags;

    fn deref(&self) -> &Self::Target {
        &self.flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Well-known service stream names.
pub enum ServiceKind {
    Comment,
    QuickOpen,
    NtfsFilePermissions,
    NtfsAlternateDataStream,
    RecoveryRecord,
    Unknown,
}

impl ServiceKind {
    pub fn from_name(name: &[u8]) -> Self {
        match name {
            b"CMT" => Self::Comment,
            b"QO" => Self::QuickOpen,
            b"ACL" => Self::NtfsFilePermissions,
            b"STM" => Self::NtfsAlternateDataStream,
            b"RR" => Self::RecoveryRecord,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug)]
/// Header-encryption parameters; precedes every other block in an
/// archive with encrypted headers.
pub struct CryptBlock {
    pub encryption_version: EncryptionVersion,
    pub kdf_count: u8,
    pub salt: [u8; 16],
    pub check_value: Option<[u8; 12]>,
}

flags! {
    struct CryptBlockFlags(u16) {
        has_password_check = 0x0001;
    }
}

int_enum! {
    pub enum EncryptionVersion : u8 {
        Aes256 = 0,
    }
}

impl CryptBlock {
    fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (encryption_version, _) = read_vint(reader)?;
        let (flags, _) = read_vint(reader)?;
        let flags = CryptBlockFlags::new(flags as u16);

        let kdf_count = read_u8(reader)?;
        let salt = read_const_bytes(reader)?;

        let check_value = if flags.has_password_check() {
            Some(read_const_bytes(reader)?)
        } else {
            None
        };

        Ok(CryptBlock {
            encryption_version: (encryption_version as u8).into(),
            kdf_count,
            salt,
            check_value,
        })
    }
}

#[derive(Debug)]
/// Block signaling the end of a volume or of the whole archive.
pub struct EndArchiveBlock {
    pub flags: EndArchiveBlockFlags,
}

flags! {
    /// [`EndArchiveBlock`] flags.
    pub struct EndArchiveBlockFlags(u16) {
        /// Archive continues in the next volume.
        pub has_next_volume = 0x0001;
    }
}

impl EndArchiveBlock {
    fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let (flags, _) = read_vint(reader)?;

        Ok(EndArchiveBlock {
            flags: EndArchiveBlockFlags::new(flags as u16),
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
/// Block we cannot decode.
pub struct UnknownBlock {
    pub tag: u64,
}

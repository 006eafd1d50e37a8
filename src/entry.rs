use crate::{
    error::{Error, RarResult},
    rar3, rar5,
};

/// The portion of a logical file's payload stored in one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Index into the archive's volume list.
    pub volume: usize,

    /// Offset of the payload within that volume.
    pub data_offset: u64,

    /// Payload bytes stored in that volume.
    pub data_size: u64,
}

/// Compression method byte; `0x30` is "stored".
pub const METHOD_STORE: u8 = 0x30;

/// A logical file reconstructed from one or more file blocks.
///
/// Only the first block of a split file carries complete metadata;
/// later pieces contribute fragments, and the piece with `split_after`
/// clear fixes the final CRC. Entries are immutable once the parse
/// finishes.
#[derive(Debug)]
pub struct FileEntry {
    /// Decoded member name, `\` kept as stored.
    pub file_name: String,

    /// Name bytes as stored in the header, before any decoding.
    pub orig_file_name: Vec<u8>,

    /// Size of the file after decompression.
    pub unpacked_size: u64,

    /// Total packed payload across all fragments.
    pub packed_size: u64,

    /// CRC32 of the unpacked file.
    pub crc32: u32,

    /// Compression method byte, `0x30` (stored) through `0x35`.
    pub method: u8,

    /// Archiver version needed to extract, times ten.
    pub extract_version: u8,

    /// Host OS tag as stored.
    pub host_os: u8,

    /// OS-specific attribute bits.
    pub attributes: u64,

    /// Modification time, when representable.
    pub modification_time: Option<time::PrimitiveDateTime>,
    pub creation_time: Option<time::PrimitiveDateTime>,
    pub access_time: Option<time::PrimitiveDateTime>,
    /// Time the entry was archived (RAR3 only, rarely written).
    pub archive_time: Option<time::PrimitiveDateTime>,

    pub is_directory: bool,
    pub is_symlink: bool,

    /// Payload is encrypted and needs a password to read.
    needs_password: bool,

    /// RAR3 per-file KDF salt.
    pub salt: Option<[u8; 8]>,

    /// Whether the last seen piece continues in another volume.
    split_after: bool,

    /// Whether the final CRC has been seen.
    finalized: bool,

    /// Volume index of the first fragment.
    pub start_volume: usize,

    /// Offset of the first block header in the start volume; the
    /// staged-extraction path copies the entry from here.
    pub header_offset: u64,

    /// Payload fragments in logical order.
    pub fragments: Vec<Fragment>,
}

impl FileEntry {
    /// Whether the payload is stored rather than compressed.
    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORE
    }

    pub fn needs_password(&self) -> bool {
        self.needs_password
    }

    /// Whether the payload spans more than one volume.
    pub fn is_split(&self) -> bool {
        self.fragments.len() > 1
    }
}

fn naive(t: Result<time::PrimitiveDateTime, u32>) -> Option<time::PrimitiveDateTime> {
    t.ok()
}

fn naive_offset(t: Option<Result<time::OffsetDateTime, u64>>) -> Option<time::PrimitiveDateTime> {
    let t = t?.ok()?;
    Some(time::PrimitiveDateTime::new(t.date(), t.time()))
}

/// Folds file blocks, in archive order, into logical entries.
///
/// A new entry opens on every file block without `split_before`; a
/// continuation extends the newest entry. An entry becomes listed as
/// soon as its first fragment is known, so iteration never waits for
/// later volumes.
#[derive(Debug, Default)]
pub struct EntryAssembler {
    entries: Vec<FileEntry>,
}

impl EntryAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_entries(self) -> Vec<FileEntry> {
        self.entries
    }

    /// Fold in a RAR3 file block located at `fragment` in `volume`,
    /// whose header starts at `header_offset`.
    pub fn push_rar3(
        &mut self,
        file: &rar3::FileBlock,
        volume: usize,
        fragment: Fragment,
        header_offset: u64,
    ) -> RarResult<()> {
        if file.split_before() {
            return self.push_continuation(fragment, file.split_after(), file.crc32);
        }

        self.entries.push(FileEntry {
            file_name: file.file_name.clone(),
            orig_file_name: file.orig_file_name.clone(),
            unpacked_size: file.unpacked_size,
            packed_size: fragment.data_size,
            crc32: file.crc32,
            method: method_byte(file.method),
            extract_version: file.extract_version,
            host_os: host_os_byte(file.host_os),
            attributes: file.attributes as u64,
            modification_time: naive(file.modification_time),
            creation_time: file.creation_time.and_then(naive),
            access_time: file.access_time.and_then(naive),
            archive_time: file.archive_time.and_then(naive),
            is_directory: file.is_directory(),
            is_symlink: file.is_symlink(),
            needs_password: file.has_password(),
            salt: file.salt,
            split_after: file.split_after(),
            finalized: !file.split_after(),
            start_volume: volume,
            header_offset,
            fragments: vec![fragment],
        });

        Ok(())
    }

    /// Fold in a RAR5 file block located at `fragment` in `volume`,
    /// whose header starts at `header_offset`.
    pub fn push_rar5(
        &mut self,
        block: &rar5::Block,
        file: &rar5::FileBlock,
        volume: usize,
        fragment: Fragment,
        header_offset: u64,
    ) -> RarResult<()> {
        if block.split_before() {
            let crc32 = file.crc32.unwrap_or(0);
            return self.push_continuation(fragment, block.split_after(), crc32);
        }

        self.entries.push(FileEntry {
            file_name: file.file_name(),
            orig_file_name: file.name.clone(),
            unpacked_size: file.unpacked_size.unwrap_or(0),
            packed_size: fragment.data_size,
            crc32: file.crc32.unwrap_or(0),
            method: METHOD_STORE + file.compression_info.method(),
            extract_version: 50,
            host_os: match file.host_os {
                rar5::HostOs::Windows => 0,
                rar5::HostOs::Unix => 1,
                rar5::HostOs::Unknown(os) => os,
            },
            attributes: file.attributes,
            modification_time: naive_offset(file.best_modification_time()),
            creation_time: naive_offset(
                file.extended_time.as_ref().and_then(|t| t.creation_time),
            ),
            access_time: naive_offset(file.extended_time.as_ref().and_then(|t| t.access_time)),
            archive_time: None,
            is_directory: file.is_directory(),
            is_symlink: file.is_symlink(),
            needs_password: file.encryption.is_some(),
            salt: None,
            split_after: block.split_after(),
            finalized: !block.split_after(),
            start_volume: volume,
            header_offset,
            fragments: vec![fragment],
        });

        Ok(())
    }

    fn push_continuation(
        &mut self,
        fragment: Fragment,
        split_after: bool,
        crc32: u32,
    ) -> RarResult<()> {
        let Some(entry) = self.entries.last_mut() else {
            // A continuation with nothing before it means we started in
            // the middle of a volume set.
            return Err(Error::NeedFirstVolume);
        };

        if entry.finalized {
            return Err(Error::bad("continuation after finalized entry"));
        }

        entry.fragments.push(fragment);
        entry.packed_size += fragment.data_size;
        entry.split_after = split_after;

        // The piece that ends the file carries the CRC of the whole
        // payload; earlier pieces hold placeholders.
        if !split_after {
            entry.crc32 = crc32;
            entry.finalized = true;
        }

        Ok(())
    }

    /// Whether the newest entry still waits for a continuation.
    pub fn expects_continuation(&self) -> bool {
        self.entries.last().is_some_and(|e| e.split_after)
    }
}

/// Raw method byte of a RAR3 method tag.
pub(crate) fn method_byte(method: rar3::Method) -> u8 {
    match method {
        rar3::Method::Store => 0x30,
        rar3::Method::Fastest => 0x31,
        rar3::Method::Fast => 0x32,
        rar3::Method::Normal => 0x33,
        rar3::Method::Good => 0x34,
        rar3::Method::Best => 0x35,
        rar3::Method::Unknown(m) => m,
    }
}

fn host_os_byte(host_os: rar3::HostOs) -> u8 {
    match host_os {
        rar3::HostOs::MsDos => 0,
        rar3::HostOs::Os2 => 1,
        rar3::HostOs::Win32 => 2,
        rar3::HostOs::Unix => 3,
        rar3::HostOs::MacOs => 4,
        rar3::HostOs::BeOs => 5,
        rar3::HostOs::Unknown(os) => os,
    }
}

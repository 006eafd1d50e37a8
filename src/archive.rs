use std::{
    io::Read,
    path::{Path, PathBuf},
};

use crate::{
    block,
    byte_source::ByteSource,
    crypto::KeyMemo,
    entry::{EntryAssembler, FileEntry, Fragment},
    error::{Error, RarResult},
    options::{self, Options},
    rar3, rar5,
    reader::StoredReader,
    signature::Signature,
    tool,
    volume::{next_volume_path, VolumeNaming},
};

/// Quick probe for a RAR signature at the start of a file.
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    let Ok(mut source) = ByteSource::open(path) else {
        return false;
    };

    let mut magic = [0u8; 8];
    let mut got = 0;
    while got < magic.len() {
        match source.read(&mut magic[got..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => got += n,
        }
    }

    Signature::from_bytes(&magic[..got]).is_some()
}

enum SourceKind {
    Path(PathBuf),
    Memory(Vec<u8>),
}

/// Summary of the captured main header.
#[derive(Debug, Default, Clone, Copy)]
struct MainInfo {
    captured: bool,
    is_volume: bool,
    is_solid: bool,
    uses_new_numbering: bool,
    headers_encrypted: bool,
}

/// A read-only RAR archive.
///
/// Opening parses every volume reachable from the given file and
/// materializes the entry list; headers of an encrypted archive stay
/// unparsed until a password is supplied. One `Archive` must not be
/// shared between threads; distinct archives on the same file are
/// independent.
pub struct Archive {
    source: SourceKind,
    options: Options,
    format: Signature,
    /// Offset of the signature in the first volume; nonzero for SFX.
    sfx_offset: u64,
    entries: Vec<FileEntry>,
    volumes: Vec<PathBuf>,
    comment: Option<String>,
    main: MainInfo,
    needs_password: bool,
    memo: KeyMemo,
}

impl Archive {
    /// Open an archive from a path with default options.
    pub fn open(path: impl AsRef<Path>) -> RarResult<Self> {
        Self::open_with(path, Options::default())
    }

    /// Open an archive from a path.
    pub fn open_with(path: impl AsRef<Path>, options: Options) -> RarResult<Self> {
        Self::from_source(SourceKind::Path(path.as_ref().to_path_buf()), options)
    }

    /// Open a single-volume archive held in memory. Volume crossing is
    /// unavailable without a filesystem, so a multi-volume set read
    /// this way behaves as if `part_only` were set.
    pub fn from_bytes(data: Vec<u8>, options: Options) -> RarResult<Self> {
        Self::from_source(SourceKind::Memory(data), options)
    }

    fn from_source(source: SourceKind, options: Options) -> RarResult<Self> {
        let mut probe = match &source {
            SourceKind::Path(path) => {
                ByteSource::open(path).map_err(|e| Self::open_error(path, e))?
            }
            SourceKind::Memory(data) => ByteSource::from_bytes(data.clone()),
        };

        let Some((format, sfx_offset)) = Signature::search_stream(&mut probe)? else {
            return Err(Error::NotArchive);
        };
        drop(probe);

        let root = match &source {
            SourceKind::Path(path) => path.clone(),
            SourceKind::Memory(_) => PathBuf::new(),
        };

        let mut archive = Self {
            source,
            options,
            format,
            sfx_offset,
            entries: vec![],
            volumes: vec![root],
            comment: None,
            main: MainInfo::default(),
            needs_password: false,
            memo: KeyMemo::default(),
        };

        archive.parse()?;
        Ok(archive)
    }

    fn open_error(path: &Path, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::bad(format!("missing volume: {}", path.display()))
        } else {
            Error::Io(e)
        }
    }

    /// The detected format generation.
    pub fn format(&self) -> Signature {
        self.format
    }

    /// Member names in archive order.
    pub fn namelist(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.file_name.clone()).collect()
    }

    /// Parsed entries in archive order.
    pub fn infolist(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Volume paths discovered during the parse, in order.
    pub fn volumelist(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// The archive comment, decoded to UTF-8.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Whether the archive headers are encrypted and still unparsed.
    pub fn needs_password(&self) -> bool {
        self.needs_password
    }

    /// Whether the archive uses solid compression.
    pub fn is_solid(&self) -> bool {
        self.main.is_solid
    }

    /// Whether the main header marks this as a multi-volume set.
    pub fn uses_volumes(&self) -> bool {
        self.main.is_volume
    }

    /// Whether the archive encrypts its block headers.
    pub fn has_encrypted_headers(&self) -> bool {
        self.main.headers_encrypted
    }

    /// Set the password and, if parsing was deferred, parse now.
    pub fn set_password(&mut self, password: &str) -> RarResult<()> {
        self.options.password = Some(password.to_owned());

        if self.needs_password {
            self.entries.clear();
            self.volumes.truncate(1);
            self.comment = None;
            self.main = MainInfo::default();
            self.needs_password = false;

            if let Err(e) = self.parse() {
                // Stay in the deferred state so another attempt can
                // reparse.
                self.needs_password = true;
                self.entries.clear();
                return Err(e);
            }
        }

        Ok(())
    }

    /// Find an entry by name; `/` and `\` separators are equivalent.
    pub fn getinfo(&self, name: &str) -> RarResult<&FileEntry> {
        let wanted = name.replace('\\', "/");

        self.entries
            .iter()
            .find(|e| e.file_name.replace('\\', "/") == wanted)
            .ok_or_else(|| Error::NoEntry(name.to_owned()))
    }

    /// Open a streaming reader over a stored member.
    ///
    /// Compressed or data-encrypted members cannot be streamed by the
    /// container parser; use [`Archive::read`] for those.
    pub fn open_member(&self, name: &str) -> RarResult<StoredReader<'_>> {
        let entry = self.getinfo(name)?;

        if entry.is_directory {
            return Err(Error::bad(format!("{name} is a directory")));
        }
        if entry.needs_password() {
            return if self.options.password.is_none() {
                Err(Error::PasswordRequired)
            } else {
                Err(Error::UnsupportedFeature(
                    "encrypted members go through the external tool".into(),
                ))
            };
        }
        if !entry.is_stored() {
            return Err(Error::UnsupportedFeature(
                "compressed members go through the external tool".into(),
            ));
        }

        Ok(StoredReader::new(self, entry))
    }

    /// Return the decompressed payload of a member.
    ///
    /// Stored members are served by the container parser with CRC
    /// verification; everything else is delegated to the external
    /// decompressor.
    pub fn read(&self, name: &str) -> RarResult<Vec<u8>> {
        let entry = self.getinfo(name)?;

        if entry.is_directory {
            return Ok(vec![]);
        }

        if entry.is_stored() && !entry.needs_password() {
            let mut reader = StoredReader::new(self, entry);
            return reader.read(None);
        }

        if entry.needs_password() && self.options.password.is_none() {
            return Err(Error::PasswordRequired);
        }

        self.read_via_tool(entry)
    }

    fn read_via_tool(&self, entry: &FileEntry) -> RarResult<Vec<u8>> {
        let SourceKind::Path(path) = &self.source else {
            return Err(Error::UnsupportedFeature(
                "external decompression needs a file-backed archive".into(),
            ));
        };

        let password = self.options.password.as_deref();

        // For a plain single-volume archive, stage just this member so
        // the tool does not decompress everything before it.
        if !self.main.is_solid && !entry.is_split() && self.format == Signature::Rar3 {
            let fragment = entry.fragments[0];
            let mut source = self.open_volume(fragment.volume)?;
            let total = (fragment.data_offset - entry.header_offset) + fragment.data_size;

            return tool::extract_staged(
                &self.options.tool,
                &mut source,
                entry.header_offset,
                total,
                &entry.file_name,
                password,
            );
        }

        tool::run(&self.options.tool, path, &entry.file_name, password)
    }

    pub(crate) fn crc_check_enabled(&self) -> bool {
        self.options.crc_check
    }

    /// Open a byte source over one volume by index.
    pub(crate) fn open_volume(&self, index: usize) -> RarResult<ByteSource> {
        match &self.source {
            SourceKind::Path(_) => {
                let path = &self.volumes[index];
                ByteSource::open(path).map_err(|e| Self::open_error(path, e))
            }
            SourceKind::Memory(data) => Ok(ByteSource::from_bytes(data.clone())),
        }
    }

    /// Confirm that the first file block of a continuation volume
    /// belongs to `entry`.
    pub(crate) fn verify_continuation(&self, volume: usize, entry: &FileEntry) -> RarResult<()> {
        let mut source = self.open_volume(volume)?;
        let offset = self.volume_start_offset(&mut source)?;

        match self.format {
            Signature::Rar3 => {
                let parser = rar3::BlockParser::new(
                    source,
                    offset,
                    self.options.charset,
                    self.options.password.clone(),
                    self.memo.clone(),
                )?;

                for result in parser {
                    match result?.kind {
                        rar3::BlockKind::File(file) => {
                            return if file.orig_file_name == entry.orig_file_name {
                                Ok(())
                            } else {
                                Err(Error::bad("split mismatch"))
                            };
                        }
                        _ => continue,
                    }
                }
            }
            Signature::Rar5 => {
                let parser = rar5::BlockParser::new(
                    source,
                    offset,
                    self.options.password.clone(),
                    self.memo.clone(),
                )?;

                for result in parser {
                    let block = result?;
                    match &block.kind {
                        rar5::BlockKind::File(file) => {
                            return if file.name == entry.orig_file_name {
                                Ok(())
                            } else {
                                Err(Error::bad("split mismatch"))
                            };
                        }
                        _ => continue,
                    }
                }
            }
        }

        Err(Error::bad("split mismatch"))
    }

    /// Offset of the first block in a volume: past the signature, and
    /// past the SFX module on the first volume.
    fn volume_start_offset(&self, source: &mut ByteSource) -> RarResult<u64> {
        let magic = source.read_at_most(self.format.size() as usize)?;

        if Signature::from_bytes(&magic) != Some(self.format) {
            // Only the first volume may hide the signature behind an
            // SFX module.
            source.seek_to(self.sfx_offset)?;
            let magic = source.read_at_most(self.format.size() as usize)?;
            if Signature::from_bytes(&magic) != Some(self.format) {
                return Err(Error::bad("volume carries no RAR signature"));
            }
            return Ok(self.sfx_offset + self.format.size());
        }

        Ok(self.format.size())
    }

    fn naming(&self) -> VolumeNaming {
        match self.format {
            Signature::Rar5 => VolumeNaming::New,
            Signature::Rar3 if self.main.uses_new_numbering => VolumeNaming::New,
            Signature::Rar3 => VolumeNaming::Old,
        }
    }

    /// Walk every volume and build the entry list.
    fn parse(&mut self) -> RarResult<()> {
        let mut assembler = EntryAssembler::new();
        let mut volume = 0;
        let mut comment: Option<PendingComment> = None;

        loop {
            let mut source = self.open_volume(volume)?;
            let offset = if volume == 0 {
                self.sfx_offset + self.format.size()
            } else {
                self.volume_start_offset(&mut source)?
            };

            let walk = match self.format {
                Signature::Rar3 => {
                    self.walk_rar3_volume(source, offset, volume, &mut assembler, &mut comment)
                }
                Signature::Rar5 => {
                    self.walk_rar5_volume(source, offset, volume, &mut assembler, &mut comment)
                }
            };

            let more_volumes = match walk {
                Ok(more) => more,
                // An encrypted-header archive without a password defers
                // parsing instead of failing.
                Err(Error::PasswordRequired) if self.options.password.is_none() => {
                    self.needs_password = true;
                    self.entries.clear();
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let continue_split = assembler.expects_continuation();

            if (more_volumes || continue_split) && !self.options.part_only {
                let SourceKind::Path(_) = &self.source else {
                    break;
                };

                let next = next_volume_path(&self.volumes[volume], self.naming())?;
                self.volumes.push(next);
                volume += 1;
                continue;
            }

            break;
        }

        self.entries = assembler.into_entries();
        self.comment = comment.and_then(|c| self.resolve_comment(c));
        Ok(())
    }

    /// Drive the RAR3 parser over one volume. Returns whether an end
    /// block announced another volume.
    fn walk_rar3_volume(
        &mut self,
        source: ByteSource,
        offset: u64,
        volume: usize,
        assembler: &mut EntryAssembler,
        comment: &mut Option<PendingComment>,
    ) -> RarResult<bool> {
        let mut parser = rar3::BlockParser::new(
            source,
            offset,
            self.options.charset,
            self.options.password.clone(),
            self.memo.clone(),
        )?;

        let mut more_volumes = false;

        while let Some(block) = parser.next_block()? {
            match &block.kind {
                rar3::BlockKind::Main(main) => {
                    if !self.main.captured {
                        self.main = MainInfo {
                            captured: true,
                            is_volume: main.is_volume(),
                            is_solid: main.is_solid(),
                            uses_new_numbering: main.uses_new_numbering(),
                            headers_encrypted: main.has_encrypted_headers(),
                        };
                    }
                }
                rar3::BlockKind::File(file) => {
                    let fragment = Fragment {
                        volume,
                        data_offset: block.data_offset,
                        data_size: block.add_size,
                    };
                    assembler.push_rar3(file, volume, fragment, block.offset)?;
                }
                rar3::BlockKind::Service(service) => {
                    if service.orig_file_name == b"CMT" && comment.is_none() {
                        *comment = Some(PendingComment {
                            volume,
                            data_offset: block.data_offset,
                            data_size: block.add_size,
                            unpacked_size: service.unpacked_size,
                            method: crate::entry::method_byte(service.method),
                            extract_version: service.extract_version,
                            crc32: service.crc32,
                            salt: service.salt,
                            encrypted: service.has_password(),
                        });
                    }
                }
                rar3::BlockKind::EndArchive(end) => {
                    more_volumes = end.has_next_volume();
                }
                rar3::BlockKind::Mark | rar3::BlockKind::Legacy(_)
                | rar3::BlockKind::Unknown(_) => {}
            }

            self.notify(block::Block::Rar3(block));
        }

        let (_, memo) = parser.into_parts();
        self.memo = memo;
        Ok(more_volumes)
    }

    /// Drive the RAR5 parser over one volume.
    fn walk_rar5_volume(
        &mut self,
        source: ByteSource,
        offset: u64,
        volume: usize,
        assembler: &mut EntryAssembler,
        comment: &mut Option<PendingComment>,
    ) -> RarResult<bool> {
        let mut parser = rar5::BlockParser::new(
            source,
            offset,
            self.options.password.clone(),
            self.memo.clone(),
        )?;

        let mut more_volumes = false;

        while let Some(block) = parser.next_block()? {
            match &block.kind {
                rar5::BlockKind::Main(main) => {
                    if !self.main.captured {
                        self.main = MainInfo {
                            captured: true,
                            is_volume: main.is_volume(),
                            is_solid: main.is_solid(),
                            uses_new_numbering: true,
                            headers_encrypted: parser.headers_encrypted(),
                        };
                    }
                }
                rar5::BlockKind::File(file) => {
                    let fragment = Fragment {
                        volume,
                        data_offset: block.data_offset,
                        data_size: block.data_size.unwrap_or(0),
                    };
                    assembler.push_rar5(&block, file, volume, fragment, block.offset)?;
                }
                rar5::BlockKind::Service(service) => {
                    let is_comment =
                        rar5::ServiceKind::from_name(&service.name) == rar5::ServiceKind::Comment;

                    if is_comment && comment.is_none() {
                        *comment = Some(PendingComment {
                            volume,
                            data_offset: block.data_offset,
                            data_size: block.data_size.unwrap_or(0),
                            unpacked_size: service.unpacked_size.unwrap_or(0),
                            method: 0x30 + service.compression_info.method(),
                            extract_version: 50,
                            crc32: service.crc32.unwrap_or(0),
                            salt: None,
                            encrypted: service.encryption.is_some(),
                        });
                    }
                }
                rar5::BlockKind::EndArchive(end) => {
                    more_volumes = end.has_next_volume();
                }
                rar5::BlockKind::Crypt(_) | rar5::BlockKind::Unknown(_) => {}
            }

            self.notify(block::Block::Rar5(Box::new(block)));
        }

        let (_, memo) = parser.into_parts();
        self.memo = memo;
        Ok(more_volumes)
    }

    fn notify(&mut self, block: block::Block) {
        if let Some(callback) = &mut self.options.info_callback {
            callback(&block);
        }
    }

    /// Turn the remembered comment block into text, if we can.
    fn resolve_comment(&self, pending: PendingComment) -> Option<String> {
        if pending.encrypted && self.options.password.is_none() {
            return None;
        }

        let data = {
            let mut source = self.open_volume(pending.volume).ok()?;
            source.seek_to(pending.data_offset).ok()?;
            let data = source.read_at_most(pending.data_size as usize).ok()?;
            (data.len() as u64 == pending.data_size).then_some(data)?
        };

        let raw = if pending.method == 0x30 && !pending.encrypted {
            data
        } else if self.format == Signature::Rar3 {
            // Compressed or encrypted comments take the staged-archive
            // detour through the external tool.
            let password = self.options.password.as_deref();
            match tool::decompress_rar3_data(
                &self.options.tool,
                pending.extract_version,
                pending.method,
                &data,
                pending.unpacked_size,
                pending.crc32,
                pending.salt,
                password.filter(|_| pending.encrypted),
            ) {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!("could not expand archive comment: {e}");
                    return None;
                }
            }
        } else {
            log::warn!("skipping compressed RAR5 comment");
            return None;
        };

        match String::from_utf8(raw) {
            Ok(text) => Some(text),
            Err(e) => Some(options::decode_fallback(e.as_bytes(), self.options.charset)),
        }
    }
}

/// Archive comment found during the parse, expanded lazily at the end.
struct PendingComment {
    volume: usize,
    data_offset: u64,
    data_size: u64,
    unpacked_size: u64,
    method: u8,
    extract_version: u8,
    crc32: u32,
    salt: Option<[u8; 8]>,
    encrypted: bool,
}

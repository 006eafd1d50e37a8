use std::io;

use crate::{
    archive::Archive,
    byte_source::ByteSource,
    checksum::Crc32,
    entry::FileEntry,
    error::{Error, RarResult},
};

/// Seekable, CRC-checking reader over the stored payload of one entry,
/// stitching fragments across volume boundaries.
///
/// The reader borrows the archive's fragment list and owns its own byte
/// sources, so readers on distinct entries can coexist. The CRC is
/// verified once the cursor sequentially reaches the end of the file;
/// any seek makes the accumulator unusable and the check is skipped.
pub struct StoredReader<'a> {
    archive: &'a Archive,
    entry: &'a FileEntry,
    /// Logical position, 0 ..= unpacked size.
    pos: u64,
    crc: Crc32,
    crc_usable: bool,
    crc_verified: bool,
    current: Option<OpenFragment>,
    closed: bool,
}

struct OpenFragment {
    source: ByteSource,
    index: usize,
    remaining: u64,
}

impl<'a> StoredReader<'a> {
    pub(crate) fn new(archive: &'a Archive, entry: &'a FileEntry) -> Self {
        Self {
            archive,
            entry,
            pos: 0,
            crc: Crc32::new(),
            crc_usable: true,
            crc_verified: false,
            current: None,
            closed: false,
        }
    }

    /// Size of the file being read.
    pub fn size(&self) -> u64 {
        self.entry.unpacked_size
    }

    /// Current logical position.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Read up to `n` bytes, or everything remaining when `n` is
    /// `None`. Short only at end of file.
    pub fn read(&mut self, n: Option<usize>) -> RarResult<Vec<u8>> {
        let remaining = (self.size() - self.pos) as usize;
        let want = n.map_or(remaining, |n| n.min(remaining));

        let mut out = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            let got = self.read_step(&mut out[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }

        out.truncate(filled);
        Ok(out)
    }

    /// Absolute/relative/from-end seek with clamping into
    /// `0 ..= file size`. Forward seeks inside the current fragment
    /// advance the open byte source; anything else reopens lazily.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> RarResult<u64> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => self.size() as i64,
        };

        let target = (base.saturating_add(offset)).clamp(0, self.size() as i64) as u64;

        // A repositioned cursor no longer sees the payload start to
        // end, so the CRC cannot be checked anymore.
        self.crc_usable = false;

        if target >= self.pos {
            let delta = target - self.pos;
            if let Some(current) = &mut self.current {
                if delta <= current.remaining {
                    if delta > 0 {
                        let at = current.source.tell()?;
                        current.source.seek_to(at + delta)?;
                        current.remaining -= delta;
                    }
                    self.pos = target;
                    return Ok(self.pos);
                }
            }
        }

        self.current = None;
        self.pos = target;
        Ok(self.pos)
    }

    /// Release the byte source. Idempotent; reading after close yields
    /// end of file.
    pub fn close(&mut self) {
        self.current = None;
        self.closed = true;
    }

    /// One read against the currently open fragment, advancing volumes
    /// as fragments drain.
    fn read_step(&mut self, buf: &mut [u8]) -> RarResult<usize> {
        if self.closed || buf.is_empty() || self.pos >= self.size() {
            return Ok(0);
        }

        if self.current.is_none() {
            self.open_fragment_at(self.pos)?;
        }

        // Fragment drained mid-file: stitch in the next volume.
        while self.current.as_ref().is_some_and(|c| c.remaining == 0) {
            let index = self.current.as_ref().map(|c| c.index).unwrap_or(0);
            let next = index + 1;
            if next >= self.entry.fragments.len() {
                return Err(Error::bad("stored file data ends prematurely"));
            }
            self.open_fragment(next, 0)?;
        }

        let current = self.current.as_mut().expect("fragment is open");
        let want = (buf.len() as u64).min(current.remaining) as usize;

        let got = io::Read::read(&mut current.source, &mut buf[..want])?;
        if got == 0 {
            return Err(Error::bad("truncated stored file data"));
        }

        current.remaining -= got as u64;
        self.pos += got as u64;

        if self.crc_usable {
            self.crc.update(&buf[..got]);
        }

        if self.pos == self.size() {
            self.finish()?;
        }

        Ok(got)
    }

    /// End-of-payload bookkeeping: verify the CRC when it is still
    /// meaningful, then drop the byte source.
    fn finish(&mut self) -> RarResult<()> {
        self.current = None;

        if self.crc_usable && !self.crc_verified {
            self.crc_verified = true;

            if self.archive.crc_check_enabled() {
                let computed = std::mem::take(&mut self.crc).finalize();
                if computed != self.entry.crc32 {
                    return Err(Error::bad(format!(
                        "CRC check failed: {computed:08x} != {:08x}",
                        self.entry.crc32
                    )));
                }
            }
        }

        Ok(())
    }

    /// Locate the fragment containing logical offset `pos` and open it.
    fn open_fragment_at(&mut self, pos: u64) -> RarResult<()> {
        let mut start = 0;

        for (index, fragment) in self.entry.fragments.iter().enumerate() {
            let end = start + fragment.data_size;
            if pos < end || (pos == end && index + 1 == self.entry.fragments.len()) {
                return self.open_fragment(index, pos - start);
            }
            start = end;
        }

        Err(Error::bad("position outside any fragment"))
    }

    /// Open fragment `index`, positioned `skip` bytes in. Continuation
    /// volumes are re-checked against the entry they claim to continue.
    fn open_fragment(&mut self, index: usize, skip: u64) -> RarResult<()> {
        // Drop the previous volume before opening the next one.
        self.current = None;

        let fragment = self.entry.fragments[index];

        if index > 0 {
            self.archive.verify_continuation(fragment.volume, self.entry)?;
        }

        let mut source = self.archive.open_volume(fragment.volume)?;
        source.seek_to(fragment.data_offset + skip)?;

        self.current = Some(OpenFragment {
            source,
            index,
            remaining: fragment.data_size - skip,
        });

        Ok(())
    }
}

/// Seek origin, mirroring `io::SeekFrom` with clamping semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl io::Read for StoredReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_step(buf).map_err(io::Error::other)
    }
}

impl io::Seek for StoredReader<'_> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(o) => (o as i64, Whence::Start),
            io::SeekFrom::Current(o) => (o, Whence::Current),
            io::SeekFrom::End(o) => (o, Whence::End),
        };

        StoredReader::seek(self, offset, whence).map_err(io::Error::other)
    }
}

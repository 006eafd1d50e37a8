use std::{
    fs,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

/// Random-access view over one physical volume: a file on disk or an
/// in-memory buffer.
///
/// Reads past the end return short (possibly empty) data rather than an
/// error; a seek past the end is clamped by the following read coming
/// back empty. A byte source has a single owner and is not shared
/// between threads.
#[derive(Debug)]
pub enum ByteSource {
    File(io::BufReader<fs::File>),
    Memory(io::Cursor<Vec<u8>>),
}

impl ByteSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = fs::File::open(path)?;
        Ok(Self::File(io::BufReader::new(file)))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::Memory(io::Cursor::new(data))
    }

    /// Total size of the underlying volume.
    pub fn len(&mut self) -> io::Result<u64> {
        match self {
            Self::File(f) => Ok(f.get_ref().metadata()?.len()),
            Self::Memory(c) => Ok(c.get_ref().len() as u64),
        }
    }

    /// Read up to `n` bytes; fewer only at end of volume.
    pub fn read_at_most(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; n];
        let mut filled = 0;

        while filled < n {
            let got = self.read(&mut buf[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }

        buf.truncate(filled);
        Ok(buf)
    }

    pub fn seek_to(&mut self, offset: u64) -> io::Result<u64> {
        self.seek(SeekFrom::Start(offset))
    }

    pub fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(f) => f.read(buf),
            Self::Memory(c) => c.read(buf),
        }
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::File(f) => f.seek(pos),
            Self::Memory(c) => c.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_at_end() -> io::Result<()> {
        let mut src = ByteSource::from_bytes(b"abcdef".to_vec());
        assert_eq!(src.read_at_most(4)?, b"abcd");
        assert_eq!(src.read_at_most(4)?, b"ef");
        assert_eq!(src.read_at_most(4)?, b"");
        Ok(())
    }

    #[test]
    fn seek_past_end_reads_empty() -> io::Result<()> {
        let mut src = ByteSource::from_bytes(b"abc".to_vec());
        src.seek_to(100)?;
        assert_eq!(src.tell()?, 100);
        assert_eq!(src.read_at_most(1)?, b"");
        Ok(())
    }
}

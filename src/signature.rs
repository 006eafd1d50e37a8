use std::io;

use aho_corasick::AhoCorasick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// File signatures of the two supported RAR archive generations.
pub enum Signature {
    /// RAR archive written by RAR 1.5 up to 4.x, the "RAR3" layout.
    Rar3,

    /// RAR archive written by RAR 5.0 and later.
    Rar5,
}

impl Signature {
    /// File signature of the RAR3 layout.
    pub const RAR3: &'static [u8; 7] = b"Rar!\x1a\x07\x00";
    /// File signature of the RAR5 layout.
    pub const RAR5: &'static [u8; 8] = b"Rar!\x1a\x07\x01\x00";

    /// Byte size of the signature.
    pub const fn size(&self) -> u64 {
        self.magic().len() as u64
    }

    /// The magic bytes corresponding to the format.
    pub const fn magic(&self) -> &'static [u8] {
        match self {
            Self::Rar3 => Self::RAR3,
            Self::Rar5 => Self::RAR5,
        }
    }

    /// Parse the RAR signature from the start of a byte slice.
    ///
    /// The RAR5 magic must be checked first since the RAR3 magic is a
    /// prefix of it up to the version byte.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(Self::RAR5) {
            Some(Self::Rar5)
        } else if bytes.starts_with(Self::RAR3) {
            Some(Self::Rar3)
        } else {
            None
        }
    }

    /// The maximum size of an SFX binary embedded before the archive
    /// signature, including the signature itself.
    pub const MAX_SFX_SIZE: u64 = 0x100000;

    /// Search for a RAR signature within the first
    /// [`Signature::MAX_SFX_SIZE`] bytes of the stream and return the
    /// format together with the offset of the signature.
    ///
    /// The first block of the archive starts at `offset + format.size()`.
    /// Archives normally carry the signature at offset 0; self-extracting
    /// archives prepend an extractor binary, so the signature has to be
    /// searched for.
    pub fn search_stream<R: io::Read>(reader: R) -> Result<Option<(Self, u64)>, io::Error> {
        // RAR5 first: its magic embeds the RAR3 one.
        let patterns = [&Self::RAR5[..], &Self::RAR3[..]];

        let Ok(ac) = AhoCorasick::new(patterns) else {
            unreachable!("Aho-Corasick pattern not constructed correctly")
        };

        // Avoid reading the whole file in case there is no signature
        // within MAX_SFX_SIZE.
        let bounded_reader = &mut reader.take(Self::MAX_SFX_SIZE);

        match ac.stream_find_iter(bounded_reader).next() {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok(m)) => {
                let format = match m.pattern().as_i32() {
                    0 => Self::Rar5,
                    1 => Self::Rar3,
                    i => unreachable!("invalid Aho-Corasick pattern ID: {i}"),
                };

                Ok(Some((format, m.start() as u64)))
            }
        }
    }
}

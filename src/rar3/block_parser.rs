use encoding_rs::Encoding;

use crate::{
    byte_source::ByteSource,
    crypto::{HeaderDecrypt, KeyMemo},
    error::{Error, RarResult},
    read::read_const_bytes,
};

use super::{Block, BlockKind};

const SALT_SIZE: usize = 8;

/// Pull parser over the block stream of one RAR3 volume.
///
/// Blocks come back in archive order; the stream ends at the volume
/// end, at an end-of-archive block, or at the first header that fails
/// its CRC check. Once a main block announces encrypted headers, every
/// following header is read through an AES-CBC decryptor seeded from a
/// per-header salt.
pub struct BlockParser {
    source: ByteSource,
    file_size: u64,
    next_offset: u64,
    end_reached: bool,
    charset: &'static Encoding,
    headers_encrypted: bool,
    /// Whether any encrypted header decoded successfully yet.
    decrypt_proven: bool,
    password: Option<String>,
    memo: KeyMemo,
}

impl BlockParser {
    pub fn new(
        mut source: ByteSource,
        offset: u64,
        charset: &'static Encoding,
        password: Option<String>,
        memo: KeyMemo,
    ) -> RarResult<Self> {
        let file_size = source.len()?;

        Ok(Self {
            source,
            file_size,
            next_offset: offset,
            end_reached: false,
            charset,
            headers_encrypted: false,
            decrypt_proven: false,
            password,
            memo,
        })
    }

    /// Read the next block, or `None` once the volume is exhausted.
    pub fn next_block(&mut self) -> RarResult<Option<Block>> {
        if self.end_reached || self.next_offset >= self.file_size {
            return Ok(None);
        }

        let block = if self.headers_encrypted {
            self.read_encrypted_block()?
        } else {
            self.read_plain_block()?
        };

        let Some(block) = block else {
            self.end_reached = true;
            return Ok(None);
        };

        self.next_offset = block.end_offset();

        match &block.kind {
            BlockKind::Main(main) if main.has_encrypted_headers() => {
                self.headers_encrypted = true;
            }
            BlockKind::EndArchive(_) => {
                self.end_reached = true;
            }
            _ => {}
        }

        Ok(Some(block))
    }

    fn read_plain_block(&mut self) -> RarResult<Option<Block>> {
        let offset = self.next_offset;
        self.source.seek_to(offset)?;
        Ok(Block::read(&mut self.source, offset, self.charset)?)
    }

    fn read_encrypted_block(&mut self) -> RarResult<Option<Block>> {
        let password = self
            .password
            .as_deref()
            .ok_or(Error::PasswordRequired)?
            .to_owned();

        let offset = self.next_offset;
        self.source.seek_to(offset)?;

        // Every encrypted header starts with its own KDF salt.
        let salt: [u8; SALT_SIZE] = match read_const_bytes(&mut self.source) {
            Ok(salt) => salt,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (key, iv) = self.memo.rar3_key(&password, &salt);
        let mut decrypt = HeaderDecrypt::rar3(&mut self.source, &key, &iv);

        // RAR3 has no password check value; the first encrypted header
        // failing its CRC (or decoding to a marker, which never occurs
        // inside the encrypted region) is how a wrong password shows
        // up.
        let block = Block::read(&mut decrypt, offset, self.charset)?
            .filter(|block| !matches!(block.kind, BlockKind::Mark));

        let Some(mut block) = block else {
            if !self.decrypt_proven {
                return Err(Error::WrongPassword);
            }
            return Ok(None);
        };
        self.decrypt_proven = true;

        // The ciphertext pads the header up to the AES block size; the
        // data area starts past the salt and that padding.
        let padded = (block.header_size as u64).div_ceil(16) * 16;
        block.data_offset = offset + SALT_SIZE as u64 + padded;

        Ok(Some(block))
    }

    /// Whether the volume announced encrypted headers.
    pub fn headers_encrypted(&self) -> bool {
        self.headers_encrypted
    }

    /// Hand back the byte source, positioned wherever parsing left it,
    /// together with the key memo.
    pub fn into_parts(self) -> (ByteSource, KeyMemo) {
        (self.source, self.memo)
    }
}

impl Iterator for BlockParser {
    type Item = RarResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

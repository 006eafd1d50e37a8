use crate::{
    byte_source::ByteSource,
    crypto::{self, HeaderDecrypt, KeyMemo},
    error::{Error, RarResult},
    read::read_const_bytes,
};

use super::{Block, BlockKind};

const IV_SIZE: usize = 16;

/// Pull parser over the block stream of one RAR5 volume.
///
/// After a crypt block, every header is encrypted: a fresh 16-byte IV
/// precedes each one and the ciphertext is padded to the AES block
/// size. The crypt block itself is always plain.
pub struct BlockParser {
    source: ByteSource,
    file_size: u64,
    next_offset: u64,
    end_reached: bool,
    password: Option<String>,
    memo: KeyMemo,
    /// KDF parameters from the crypt block, once seen.
    crypt: Option<HeaderCrypt>,
    /// Whether any encrypted header decoded successfully yet.
    decrypt_proven: bool,
}

struct HeaderCrypt {
    kdf_count: u8,
    salt: [u8; 16],
}

impl BlockParser {
    pub fn new(
        mut source: ByteSource,
        offset: u64,
        password: Option<String>,
        memo: KeyMemo,
    ) -> RarResult<Self> {
        let file_size = source.len()?;

        Ok(Self {
            source,
            file_size,
            next_offset: offset,
            end_reached: false,
            password,
            memo,
            crypt: None,
            decrypt_proven: false,
        })
    }

    /// Read the next block, or `None` once the volume is exhausted.
    pub fn next_block(&mut self) -> RarResult<Option<Block>> {
        if self.end_reached || self.next_offset >= self.file_size {
            return Ok(None);
        }

        let block = if self.crypt.is_some() {
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
            BlockKind::Crypt(crypt) => {
                if let Some(check_value) = &crypt.check_value {
                    let password = self.password.as_deref().ok_or(Error::PasswordRequired)?;
                    crypto::verify_password(password, &crypt.salt, crypt.kdf_count, check_value)?;
                }

                self.crypt = Some(HeaderCrypt {
                    kdf_count: crypt.kdf_count,
                    salt: crypt.salt,
                });
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
        Ok(Block::read(&mut self.source, offset)?)
    }

    fn read_encrypted_block(&mut self) -> RarResult<Option<Block>> {
        let password = self
            .password
            .as_deref()
            .ok_or(Error::PasswordRequired)?
            .to_owned();

        let crypt = self.crypt.as_ref().expect("crypt block seen");
        let (kdf_count, salt) = (crypt.kdf_count, crypt.salt);
        let key = self.memo.rar5_key(&password, &salt, kdf_count)?;

        let offset = self.next_offset;
        self.source.seek_to(offset)?;

        let iv: [u8; IV_SIZE] = match read_const_bytes(&mut self.source) {
            Ok(iv) => iv,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut decrypt = HeaderDecrypt::rar5(&mut self.source, &key, &iv);

        let Some(mut block) = Block::read(&mut decrypt, offset)? else {
            // Without a check value in the crypt block, a wrong
            // password surfaces as the first header failing its CRC.
            if !self.decrypt_proven {
                return Err(Error::WrongPassword);
            }
            return Ok(None);
        };
        self.decrypt_proven = true;

        let padded = block.header_size.div_ceil(16) * 16;
        block.data_offset = offset + IV_SIZE as u64 + padded;

        Ok(Some(block))
    }

    /// Whether the volume announced encrypted headers.
    pub fn headers_encrypted(&self) -> bool {
        self.crypt.is_some()
    }

    /// Hand back the byte source together with the key memo.
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

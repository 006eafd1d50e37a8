use std::io;

use aes::{
    cipher::{BlockDecryptMut, KeyIvInit},
    Aes128, Aes256,
};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

enum CbcState {
    Rar3(Box<Aes128CbcDec>),
    Rar5(Box<Aes256CbcDec>),
}

/// Transparently decrypting view over a byte source, from a block
/// boundary onward.
///
/// AES-CBC only moves in 16-byte steps, so reads against the underlying
/// source are block aligned; callers may still request arbitrary byte
/// counts and the partial block is retained for the next read. All
/// header parsing on an encrypted archive goes through this.
pub struct HeaderDecrypt<'a, R: io::Read> {
    source: &'a mut R,
    cipher: CbcState,
    /// Decrypted bytes not yet handed out.
    pending: Vec<u8>,
}

impl<'a, R: io::Read> HeaderDecrypt<'a, R> {
    /// AES-128-CBC decryption, the RAR3 header scheme.
    pub fn rar3(source: &'a mut R, key: &[u8; 16], iv: &[u8; 16]) -> Self {
        Self {
            source,
            cipher: CbcState::Rar3(Box::new(Aes128CbcDec::new(key.into(), iv.into()))),
            pending: Vec::new(),
        }
    }

    /// AES-256-CBC decryption, the RAR5 header scheme.
    pub fn rar5(source: &'a mut R, key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            source,
            cipher: CbcState::Rar5(Box::new(Aes256CbcDec::new(key.into(), iv.into()))),
            pending: Vec::new(),
        }
    }

    /// Pull and decrypt enough whole cipher blocks to cover `need`
    /// bytes. Stops short at end of stream.
    fn fill(&mut self, need: usize) -> io::Result<()> {
        while self.pending.len() < need {
            let mut block = [0u8; BLOCK_SIZE];
            let mut got = 0;

            while got < BLOCK_SIZE {
                let n = self.source.read(&mut block[got..])?;
                if n == 0 {
                    // A trailing partial cipher block cannot be
                    // decrypted; drop it.
                    return Ok(());
                }
                got += n;
            }

            match &mut self.cipher {
                CbcState::Rar3(c) => c.decrypt_block_mut((&mut block).into()),
                CbcState::Rar5(c) => c.decrypt_block_mut((&mut block).into()),
            }

            self.pending.extend_from_slice(&block);
        }

        Ok(())
    }
}

impl<R: io::Read> io::Read for HeaderDecrypt<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf.len())?;

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use aes::cipher::{generic_array::GenericArray, BlockEncryptMut};
    use std::io::Read;

    use super::*;

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    #[test]
    fn unaligned_reads_see_contiguous_plaintext() -> io::Result<()> {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];

        let plain: Vec<u8> = (0u8..64).collect();
        let mut encrypted = plain.clone();
        let mut enc = Aes128CbcEnc::new(&key.into(), &iv.into());
        for chunk in encrypted.chunks_exact_mut(BLOCK_SIZE) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }

        let mut source = io::Cursor::new(encrypted);
        let mut decrypt = HeaderDecrypt::rar3(&mut source, &key, &iv);

        let mut out = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let n = decrypt.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }

        assert_eq!(out, plain);
        Ok(())
    }
}

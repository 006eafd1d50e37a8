//! Programmatic fixture archives.
//!
//! Real `.rar` binaries cannot be produced in the test environment, so
//! these builders assemble byte-exact RAR3 and RAR5 volumes from the
//! on-disk layout rules: fixed 7-byte headers plus CRC-16 for RAR3,
//! vint framing plus CRC-32 for RAR5, optional AES-CBC header
//! encryption for both.

#![allow(dead_code)]

use aes::cipher::{generic_array::GenericArray, BlockEncryptMut, KeyIvInit};
use rarview::crypto;

pub const DOS_TIME: u32 = 0x3C21A85D;

pub fn crc(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

fn crc16(data: &[u8]) -> u16 {
    (crc32fast::hash(data) & 0xffff) as u16
}

// ---------------------------------------------------------------- RAR3

pub const RAR3_MAIN_VOLUME: u16 = 0x0001;
pub const RAR3_MAIN_NEWNUMBERING: u16 = 0x0010;
pub const RAR3_MAIN_PASSWORD: u16 = 0x0080;
pub const RAR3_MAIN_FIRSTVOLUME: u16 = 0x0100;

pub const RAR3_FILE_SPLIT_BEFORE: u16 = 0x0001;
pub const RAR3_FILE_SPLIT_AFTER: u16 = 0x0002;
pub const RAR3_FILE_PASSWORD: u16 = 0x0004;
pub const RAR3_FILE_DIRECTORY: u16 = 0x00e0;
pub const RAR3_FILE_UNICODE: u16 = 0x0200;
pub const RAR3_FILE_SALT: u16 = 0x0400;
pub const RAR3_LONG_BLOCK: u16 = 0x8000;

pub const RAR3_ENDARC_NEXT_VOLUME: u16 = 0x0001;

/// Parameters of one RAR3 file or service block.
pub struct Rar3File<'a> {
    pub name: &'a [u8],
    pub data: &'a [u8],
    /// Size of the whole logical file (equal to `data.len()` unless
    /// split).
    pub unpacked_size: u64,
    pub crc32: u32,
    pub flags: u16,
    pub method: u8,
    pub salt: Option<[u8; 8]>,
}

impl<'a> Rar3File<'a> {
    pub fn stored(name: &'a [u8], data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            unpacked_size: data.len() as u64,
            crc32: crc(data),
            flags: 0,
            method: 0x30,
            salt: None,
        }
    }
}

/// Header-encryption state of a [`Rar3Builder`].
enum Rar3Crypt {
    Plain,
    Encrypted { password: String, counter: u8 },
}

pub struct Rar3Builder {
    data: Vec<u8>,
    crypt: Rar3Crypt,
    header_password: Option<String>,
}

impl Rar3Builder {
    pub fn new() -> Self {
        let mut data = vec![];
        data.extend_from_slice(b"Rar!\x1a\x07\x00");
        Self {
            data,
            crypt: Rar3Crypt::Plain,
            header_password: None,
        }
    }

    /// Prepend `prefix` bytes before the signature, as an SFX stub
    /// would.
    pub fn with_sfx_prefix(prefix: &[u8]) -> Self {
        let mut data = prefix.to_vec();
        data.extend_from_slice(b"Rar!\x1a\x07\x00");
        Self {
            data,
            crypt: Rar3Crypt::Plain,
            header_password: None,
        }
    }

    /// Password used once a main block announces encrypted headers.
    pub fn header_password(&mut self, password: &str) -> &mut Self {
        self.header_password = Some(password.to_owned());
        self
    }

    /// Emit one block. `crc_payload_len` bounds the payload area the
    /// header CRC covers (6 for MAIN, full length otherwise).
    fn block(&mut self, block_type: u8, flags: u16, payload: &[u8], crc_payload_len: usize) {
        let header_size = (7 + payload.len()) as u16;

        let mut body = vec![block_type];
        body.extend_from_slice(&flags.to_le_bytes());
        body.extend_from_slice(&header_size.to_le_bytes());
        body.extend_from_slice(payload);

        let crc_end = 5 + crc_payload_len.min(payload.len());
        let header_crc = crc16(&body[..crc_end]);

        let mut header = header_crc.to_le_bytes().to_vec();
        header.extend_from_slice(&body);

        match &mut self.crypt {
            Rar3Crypt::Plain => self.data.extend_from_slice(&header),
            Rar3Crypt::Encrypted { password, counter } => {
                *counter += 1;
                let salt = [*counter; 8];
                let (key, iv) = crypto::rar3_s2k(password, &salt);

                header.resize(header.len().div_ceil(16) * 16, 0);
                let mut cipher = cbc::Encryptor::<aes::Aes128>::new(&key.into(), &iv.into());
                for chunk in header.chunks_exact_mut(16) {
                    cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
                }

                self.data.extend_from_slice(&salt);
                self.data.extend_from_slice(&header);
            }
        }
    }

    pub fn main(&mut self, flags: u16) -> &mut Self {
        // high_av_offset u16 + low_av_offset u32, both unused.
        self.block(0x73, flags, &[0u8; 6], 6);

        if flags & RAR3_MAIN_PASSWORD != 0 {
            // Everything after the main block is header-encrypted.
            self.crypt = Rar3Crypt::Encrypted {
                password: self.header_password.clone().expect("header password set"),
                counter: 0,
            };
        }
        self
    }

    fn file_block(&mut self, block_type: u8, file: &Rar3File) {
        let mut flags = file.flags | RAR3_LONG_BLOCK;
        if file.salt.is_some() {
            flags |= RAR3_FILE_SALT;
        }

        let mut payload = vec![];
        payload.extend_from_slice(&(file.data.len() as u32).to_le_bytes());
        payload.extend_from_slice(&(file.unpacked_size as u32).to_le_bytes());
        payload.push(2); // host: Win32
        payload.extend_from_slice(&file.crc32.to_le_bytes());
        payload.extend_from_slice(&DOS_TIME.to_le_bytes());
        payload.push(29); // extract version 2.9
        payload.push(file.method);
        payload.extend_from_slice(&(file.name.len() as u16).to_le_bytes());
        payload.extend_from_slice(&0x20u32.to_le_bytes());
        payload.extend_from_slice(file.name);
        if let Some(salt) = file.salt {
            payload.extend_from_slice(&salt);
        }

        let crc_len = payload.len();
        self.block(block_type, flags, &payload, crc_len);
        self.data.extend_from_slice(file.data);
    }

    pub fn file(&mut self, file: &Rar3File) -> &mut Self {
        self.file_block(0x74, file);
        self
    }

    /// A `CMT` service stream holding the archive comment.
    pub fn comment(&mut self, text: &[u8]) -> &mut Self {
        self.file_block(0x7a, &Rar3File::stored(b"CMT", text));
        self
    }

    pub fn directory(&mut self, name: &[u8]) -> &mut Self {
        self.file_block(
            0x74,
            &Rar3File {
                name,
                data: b"",
                unpacked_size: 0,
                crc32: 0,
                flags: RAR3_FILE_DIRECTORY,
                method: 0x30,
                salt: None,
            },
        );
        self
    }

    pub fn end_archive(&mut self, flags: u16) -> &mut Self {
        self.block(0x7b, flags, &[], 0);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.data.clone()
    }
}

// ---------------------------------------------------------------- RAR5

pub const RAR5_BLOCK_DATA: u64 = 0x0002;
pub const RAR5_BLOCK_SPLIT_BEFORE: u64 = 0x0008;
pub const RAR5_BLOCK_SPLIT_AFTER: u64 = 0x0010;

pub fn vint(mut value: u64) -> Vec<u8> {
    let mut out = vec![];
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Header-encryption state of a [`Rar5Builder`].
enum Rar5Crypt {
    Plain,
    Encrypted { key: [u8; 32], counter: u8 },
}

pub struct Rar5Builder {
    data: Vec<u8>,
    crypt: Rar5Crypt,
}

pub struct Rar5File<'a> {
    pub name: &'a [u8],
    pub data: &'a [u8],
    pub unpacked_size: u64,
    pub crc32: u32,
    /// Block-level split flags.
    pub split: u64,
}

impl<'a> Rar5File<'a> {
    pub fn stored(name: &'a [u8], data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            unpacked_size: data.len() as u64,
            crc32: crc(data),
            split: 0,
        }
    }
}

impl Rar5Builder {
    pub fn new() -> Self {
        let mut data = vec![];
        data.extend_from_slice(b"Rar!\x1a\x07\x01\x00");
        Self {
            data,
            crypt: Rar5Crypt::Plain,
        }
    }

    /// Emit one block; `payload` covers everything after the header
    /// size field (type, flags, sizes, fields, extra area). The stored
    /// CRC covers the header size vint plus the payload.
    fn block(&mut self, payload: &[u8]) {
        let mut checked = vint(payload.len() as u64);
        checked.extend_from_slice(payload);

        let mut header = crc(&checked).to_le_bytes().to_vec();
        header.extend_from_slice(&checked);

        match &mut self.crypt {
            Rar5Crypt::Plain => self.data.extend_from_slice(&header),
            Rar5Crypt::Encrypted { key, counter } => {
                *counter += 1;
                let iv = [*counter; 16];

                header.resize(header.len().div_ceil(16) * 16, 0);
                let mut cipher = cbc::Encryptor::<aes::Aes256>::new((&*key).into(), &iv.into());
                for chunk in header.chunks_exact_mut(16) {
                    cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
                }

                self.data.extend_from_slice(&iv);
                self.data.extend_from_slice(&header);
            }
        }
    }

    /// Crypt block announcing encrypted headers, with a password check
    /// value; everything after it is encrypted.
    pub fn crypt(&mut self, password: &str, kdf_count: u8) -> &mut Self {
        let salt = [0x5au8; 16];

        let check = crypto::rar5_password_check(password, &salt, kdf_count).unwrap();
        let mut check_value = [0u8; 12];
        check_value[..8].copy_from_slice(&check);
        check_value[8..].copy_from_slice(&crc(&check).to_le_bytes());

        let mut payload = vint(4); // type: crypt
        payload.extend_from_slice(&vint(0)); // block flags
        payload.extend_from_slice(&vint(0)); // AES-256 version
        payload.extend_from_slice(&vint(1)); // has password check
        payload.push(kdf_count);
        payload.extend_from_slice(&salt);
        payload.extend_from_slice(&check_value);

        self.block(&payload);

        let key = crypto::rar5_kdf(password, &salt, kdf_count).unwrap();
        self.crypt = Rar5Crypt::Encrypted { key, counter: 0 };
        self
    }

    pub fn main(&mut self, is_volume: bool) -> &mut Self {
        let mut payload = vint(1); // type: main
        payload.extend_from_slice(&vint(0)); // block flags
        payload.extend_from_slice(&vint(if is_volume { 0x0001 } else { 0 }));
        self.block(&payload);
        self
    }

    fn file_block(&mut self, block_type: u64, file: &Rar5File) {
        let mut payload = vint(block_type);
        payload.extend_from_slice(&vint(RAR5_BLOCK_DATA | file.split));
        payload.extend_from_slice(&vint(file.data.len() as u64)); // data size
        payload.extend_from_slice(&vint(0x0004)); // file flags: has crc32
        payload.extend_from_slice(&vint(file.unpacked_size));
        payload.extend_from_slice(&vint(0)); // attributes
        payload.extend_from_slice(&file.crc32.to_le_bytes());
        payload.extend_from_slice(&vint(0)); // compression: stored
        payload.extend_from_slice(&vint(1)); // host: Unix
        payload.extend_from_slice(&vint(file.name.len() as u64));
        payload.extend_from_slice(file.name);

        self.block(&payload);
        self.data.extend_from_slice(file.data);
    }

    pub fn file(&mut self, file: &Rar5File) -> &mut Self {
        self.file_block(2, file);
        self
    }

    /// A `CMT` service stream holding the archive comment.
    pub fn comment(&mut self, text: &[u8]) -> &mut Self {
        self.file_block(3, &Rar5File::stored(b"CMT", text));
        self
    }

    pub fn end_archive(&mut self, next_volume: bool) -> &mut Self {
        let mut payload = vint(5); // type: end of archive
        payload.extend_from_slice(&vint(0)); // block flags
        payload.extend_from_slice(&vint(if next_volume { 1 } else { 0 }));
        self.block(&payload);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.data.clone()
    }
}

// ------------------------------------------------------------- helpers

/// Write volumes into a fresh temp directory and return (dir, paths).
pub fn write_volumes(
    names_and_data: &[(&str, Vec<u8>)],
) -> (tempfile::TempDir, Vec<std::path::PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = vec![];

    for (name, data) in names_and_data {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        paths.push(path);
    }

    (dir, paths)
}

/// 512 numbered newline-terminated lines of four bytes each.
pub fn numbered_lines() -> Vec<u8> {
    let mut data = Vec::with_capacity(2048);
    for i in 0..512 {
        data.extend_from_slice(format!("{i:03}\n").as_bytes());
    }
    data
}

//! External decompressor invocation.
//!
//! Compression is not reimplemented here; members that are not stored
//! are piped through an external tool (`unrar p` by default), reading
//! its stdout as the decompressed stream. For non-solid single-volume
//! archives the member is first staged into a minimal temporary
//! archive so the tool does not have to walk the whole original.

use std::{
    io::{Read, Write},
    path::Path,
    process::{Command, Stdio},
};

use crate::{
    byte_source::ByteSource,
    checksum,
    error::{Error, RarResult},
    options::ToolConfig,
    signature::Signature,
};

int_enum! {
    /// Exit codes of the decompressor tool.
    pub enum ToolExit : i32 {
        Ok = 0,
        Warning = 1,
        Fatal = 2,
        Crc = 3,
        Locked = 4,
        Write = 5,
        Open = 6,
        Usage = 7,
        Memory = 8,
        Create = 9,
        NoFiles = 10,
        Password = 11,
        UserBreak = 255,
    }
}

/// Run the tool against `archive_path`, returning the decompressed
/// bytes of `member` from its stdout. Stderr is discarded.
pub fn run(
    config: &ToolConfig,
    archive_path: &Path,
    member: &str,
    password: Option<&str>,
) -> RarResult<Vec<u8>> {
    // The tool wants the platform separator in member names.
    let member = member.replace('\\', std::path::MAIN_SEPARATOR_STR);

    let mut command = Command::new(&config.program);
    command.args(&config.args);

    // `-p-` forbids an interactive password prompt.
    match password {
        Some(password) => command.arg(format!("-p{password}")),
        None => command.arg("-p-"),
    };

    let output = command
        .arg(archive_path)
        .arg(&member)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(Error::Io)?;

    let exit: ToolExit = output.status.code().unwrap_or(-1).into();

    match exit {
        ToolExit::Ok => Ok(output.stdout),
        ToolExit::Warning => {
            log::warn!("decompressor reported a warning for {member}");
            Ok(output.stdout)
        }
        ToolExit::Password => Err(Error::WrongPassword),
        ToolExit::Crc => Err(Error::bad("decompressor reported a CRC error")),
        ToolExit::NoFiles => Err(Error::NoEntry(member)),
        code => Err(Error::bad(format!("decompressor failed: {code:?}"))),
    }
}

/// Minimal main block for staged archives; the constant CRC matches
/// these exact thirteen bytes.
fn staged_main_header() -> [u8; 13] {
    let mut header = [0u8; 13];
    header[..2].copy_from_slice(&0x90cfu16.to_le_bytes());
    header[2] = 0x73;
    header[5..7].copy_from_slice(&13u16.to_le_bytes());
    header
}

/// Stage `total_size` bytes of an entry (header plus payload) from
/// `source` into a single-member temporary archive and run the tool on
/// it.
///
/// The temporary file is removed on every exit path.
pub fn extract_staged(
    config: &ToolConfig,
    source: &mut ByteSource,
    header_offset: u64,
    total_size: u64,
    member: &str,
    password: Option<&str>,
) -> RarResult<Vec<u8>> {
    const COPY_CHUNK: usize = 32 * 1024;

    let mut staged = tempfile::Builder::new()
        .prefix("rarview")
        .suffix(".rar")
        .tempfile()
        .map_err(Error::Io)?;

    staged.write_all(Signature::RAR3).map_err(Error::Io)?;
    staged.write_all(&staged_main_header()).map_err(Error::Io)?;

    source.seek_to(header_offset)?;
    let mut left = total_size;
    let mut chunk = vec![0u8; COPY_CHUNK];

    while left > 0 {
        let want = (left as usize).min(COPY_CHUNK);
        let got = source.read(&mut chunk[..want])?;
        if got == 0 {
            return Err(Error::bad("read failed while staging entry"));
        }
        staged.write_all(&chunk[..got]).map_err(Error::Io)?;
        left -= got as u64;
    }

    staged.flush().map_err(Error::Io)?;

    run(config, staged.path(), member, password)
}

/// Decompress a raw RAR3 data area by wrapping it in a staged archive
/// with a synthesized file header. Used for compressed archive
/// comments, whose data never appears in the entry list.
#[allow(clippy::too_many_arguments)]
pub fn decompress_rar3_data(
    config: &ToolConfig,
    extract_version: u8,
    method: u8,
    data: &[u8],
    unpacked_size: u64,
    crc32: u32,
    salt: Option<[u8; 8]>,
    password: Option<&str>,
) -> RarResult<Vec<u8>> {
    const NAME: &[u8] = b"data";

    let mut flags: u16 = 0x8000;
    if salt.is_some() {
        flags |= 0x0400;
    }
    if password.is_some() {
        flags |= 0x0004;
    }

    let mut payload = Vec::with_capacity(32 + NAME.len());
    payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
    payload.extend_from_slice(&(unpacked_size as u32).to_le_bytes());
    payload.push(0); // MS-DOS host
    payload.extend_from_slice(&crc32.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes()); // DOS time
    payload.push(extract_version);
    payload.push(method);
    payload.extend_from_slice(&(NAME.len() as u16).to_le_bytes());
    payload.extend_from_slice(&0x20u32.to_le_bytes()); // attributes
    payload.extend_from_slice(NAME);
    if let Some(salt) = salt {
        payload.extend_from_slice(&salt);
    }

    let header_size = (7 + payload.len()) as u16;
    let mut crc_data = Vec::with_capacity(5 + payload.len());
    crc_data.push(0x74);
    crc_data.extend_from_slice(&flags.to_le_bytes());
    crc_data.extend_from_slice(&header_size.to_le_bytes());
    crc_data.extend_from_slice(&payload);
    let header_crc = checksum::crc32_low16(&crc_data);

    let mut staged = tempfile::Builder::new()
        .prefix("rarview")
        .suffix(".rar")
        .tempfile()
        .map_err(Error::Io)?;

    staged.write_all(Signature::RAR3).map_err(Error::Io)?;
    staged.write_all(&staged_main_header()).map_err(Error::Io)?;
    staged.write_all(&header_crc.to_le_bytes()).map_err(Error::Io)?;
    staged.write_all(&crc_data).map_err(Error::Io)?;
    staged.write_all(data).map_err(Error::Io)?;
    staged.flush().map_err(Error::Io)?;

    let out = run(config, staged.path(), "data", password)?;

    if out.len() as u64 != unpacked_size || checksum::crc32(&out) != crc32 {
        return Err(Error::bad("decompressed data failed its checks"));
    }

    Ok(out)
}

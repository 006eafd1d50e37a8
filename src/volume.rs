//! Volume name sequencing for multi-volume archives.
//!
//! The sequencer is a pure name transformation; it never touches the
//! filesystem. Two conventions exist:
//!
//! - old numbering: `archive.rar`, `archive.r00`, `archive.r01`, ...,
//!   `archive.r99`, `archive.s00`, ...
//! - new numbering (RAR3 `NEWNUMBERING` flag, always on RAR5):
//!   `archive.part01.rar`, `archive.part02.rar`, ...

use std::path::{Path, PathBuf};

use crate::error::{Error, RarResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeNaming {
    /// `.rar` / `.rNN` / `.sNN` extensions.
    Old,

    /// All volumes keep the `.rar` extension; a decimal run inside the
    /// name counts up.
    New,
}

/// Compute the file name of the volume following `name`.
pub fn next_volume_name(name: &str, naming: VolumeNaming) -> RarResult<String> {
    match naming {
        VolumeNaming::Old => next_old_volume_name(name),
        VolumeNaming::New => next_new_volume_name(name),
    }
}

/// [`next_volume_name`] applied to the file-name component of a path.
pub fn next_volume_path(path: &Path, naming: VolumeNaming) -> RarResult<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(Error::BadVolumeName)?;

    Ok(path.with_file_name(next_volume_name(file_name, naming)?))
}

fn next_old_volume_name(name: &str) -> RarResult<String> {
    let mut bytes = name.as_bytes().to_vec();

    // First transition: `.rar` becomes `.r00`.
    if name.len() >= 4 && name[name.len() - 4..].eq_ignore_ascii_case(".rar") {
        let n = bytes.len();
        bytes[n - 2] = b'0';
        bytes[n - 1] = b'0';
        return String::from_utf8(bytes).map_err(|_| Error::BadVolumeName);
    }

    // Otherwise increment the rightmost digit, carrying '9' into the
    // character to its left, so `.r99` rolls over to `.s00`.
    let mut i = match bytes.iter().rposition(|b| b.is_ascii_digit()) {
        Some(i) => i,
        None => return Err(Error::BadVolumeName),
    };

    loop {
        if bytes[i] == b'9' {
            bytes[i] = b'0';
            if i == 0 {
                return Err(Error::BadVolumeName);
            }
            i -= 1;
            if !bytes[i].is_ascii_digit() {
                bytes[i] = bytes[i].wrapping_add(1);
                break;
            }
        } else {
            bytes[i] += 1;
            break;
        }
    }

    String::from_utf8(bytes).map_err(|_| Error::BadVolumeName)
}

fn next_new_volume_name(name: &str) -> RarResult<String> {
    let bytes = name.as_bytes();

    // Locate the last run of ASCII digits.
    let end = match bytes.iter().rposition(|b| b.is_ascii_digit()) {
        Some(i) => i + 1,
        None => return Err(Error::BadVolumeName),
    };
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);

    let digits = &name[start..end];
    let number: u64 = digits.parse().map_err(|_| Error::BadVolumeName)?;
    let width = digits.len();

    let mut out = bytes.to_vec();

    if digits.bytes().all(|b| b == b'9') {
        // Digit run overflows: reset it and bump the preceding character.
        if start == 0 {
            return Err(Error::BadVolumeName);
        }
        out[start - 1] = out[start - 1].wrapping_add(1);
        for b in &mut out[start..end] {
            *b = b'0';
        }
        String::from_utf8(out).map_err(|_| Error::BadVolumeName)
    } else {
        let next = format!("{:0width$}", number + 1, width = width);
        let mut s = String::with_capacity(name.len() + 1);
        s.push_str(&name[..start]);
        s.push_str(&next);
        s.push_str(&name[end..]);
        Ok(s)
    }
}

//! Read-only access to RAR archives.
//!
//! This crate parses the RAR3 (RAR 1.5 - 4.x) and RAR5 container
//! layouts: it enumerates entries, exposes their metadata, follows
//! multi-volume sets, decodes the RAR3 compact UTF-16 filename
//! encoding and decrypts encrypted headers. Stored members are served
//! directly as a seekable, CRC-checked stream; compressed members are
//! delegated to an external decompressor (`unrar` by default).
//!
//! ```no_run
//! # fn main() -> rarview::RarResult<()> {
//! let archive = rarview::Archive::open("archive.rar")?;
//!
//! for entry in archive.infolist() {
//!     println!("{} ({} bytes)", entry.file_name, entry.unpacked_size);
//! }
//!
//! let data = archive.read("some/member.txt")?;
//! # let _ = data;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

mod archive;
mod block;
mod byte_source;
mod checksum;
pub mod crypto;
mod entry;
pub mod error;
mod options;
pub mod rar3;
pub mod rar5;
mod read;
mod reader;
pub mod sanitize;
mod signature;
mod time_conv;
mod tool;
pub mod volume;

pub use archive::{is_archive, Archive};
pub use block::{Block, HeaderCrc};
pub use byte_source::ByteSource;
pub use entry::{FileEntry, Fragment};
pub use error::{Error, RarResult};
pub use options::{InfoCallback, Options, ToolConfig};
pub use reader::{StoredReader, Whence};
pub use sanitize::{sanitize_unix, sanitize_win32};
pub use signature::Signature;
pub use tool::ToolExit;
pub use volume::{next_volume_name, next_volume_path, VolumeNaming};

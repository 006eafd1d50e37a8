use std::io;

use thiserror::Error;

/// Specialized [`Result`] type for reading RAR archives.
pub type RarResult<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
/// An error that may occur while reading a RAR archive.
pub enum Error {
    /// The file carries no RAR signature.
    #[error("not a RAR archive")]
    NotArchive,

    /// The archive structure is damaged: truncated payload, failed data
    /// CRC, split continuation mismatch or a structural impossibility.
    ///
    /// Note that a *header* CRC failure is not reported through this
    /// variant; the parser treats it as end of archive and keeps the
    /// entries decoded so far.
    #[error("bad RAR archive: {0}")]
    BadArchive(String),

    /// A next volume name could not be constructed from the current one.
    #[error("cannot construct next volume name")]
    BadVolumeName,

    /// Lookup by member name failed.
    #[error("no such entry in archive: {0}")]
    NoEntry(String),

    /// The entry or the archive headers are encrypted and no password
    /// has been set.
    #[error("password required")]
    PasswordRequired,

    /// The configured password failed the archive's check value or
    /// produced invalid plaintext.
    #[error("wrong password")]
    WrongPassword,

    /// A volume other than the first was opened directly.
    #[error("need to start from the first volume")]
    NeedFirstVolume,

    /// Crypto support is unavailable in this build.
    #[error("crypto support not available")]
    NoCrypto,

    /// The archive uses a feature this library cannot serve, such as a
    /// compression method the external tool does not understand.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Unknown I/O error from the underlying byte source.
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::UnexpectedEof => Self::BadArchive("unexpected end of file".into()),
            _ => Self::Io(value),
        }
    }
}

impl Error {
    pub(crate) fn bad(msg: impl Into<String>) -> Self {
        Self::BadArchive(msg.into())
    }
}

use encoding_rs::{Encoding, WINDOWS_1252};

use crate::block::Block;

/// Callback invoked for every block decoded during the parse, useful
/// for inventory and debugging tools.
pub type InfoCallback = Box<dyn FnMut(&Block)>;

/// Configuration for opening an archive.
///
/// The options are fixed at open time; there is no runtime-mutable
/// global state.
pub struct Options {
    /// Fallback charset for RAR3 filenames stored without the Unicode
    /// flag. Such names were written in whatever OEM code page the
    /// archiving machine used, so decoding them is guesswork.
    pub charset: &'static Encoding,

    /// Verify payload CRC-32 when reading stored members.
    pub crc_check: bool,

    /// Do not follow `NEXT_VOLUME` markers into further volumes.
    pub part_only: bool,

    /// Password for encrypted members and encrypted headers. Can also
    /// be supplied later through [`crate::Archive::set_password`].
    pub password: Option<String>,

    /// Per-block parse callback.
    pub info_callback: Option<InfoCallback>,

    /// External decompressor invoked for non-stored members.
    pub tool: ToolConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            charset: WINDOWS_1252,
            crc_check: true,
            part_only: false,
            password: None,
            info_callback: None,
            tool: ToolConfig::default(),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("charset", &self.charset.name())
            .field("crc_check", &self.crc_check)
            .field("part_only", &self.part_only)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("info_callback", &self.info_callback.is_some())
            .field("tool", &self.tool)
            .finish()
    }
}

/// Command line of the external decompressor.
///
/// The archive path and the member name get appended to `args` when the
/// tool is invoked; its stdout is the decompressed stream.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "unrar".into(),
            // `p` prints the member to stdout, `-inul` silences the UI.
            args: vec!["p".into(), "-inul".into()],
        }
    }
}

/// Decode bytes with the configured fallback charset, replacing
/// undecodable sequences.
pub fn decode_fallback(bytes: &[u8], charset: &'static Encoding) -> String {
    let (decoded, _, _) = charset.decode(bytes);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_1252_fallback() {
        // 0xE9 is é in windows-1252 but invalid UTF-8.
        assert_eq!(decode_fallback(b"caf\xe9", WINDOWS_1252), "café");
    }
}

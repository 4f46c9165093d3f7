use std::{borrow::Cow, fmt::Display, str::FromStr, sync::LazyLock};

use regex::bytes::Regex;
use thiserror::Error;
use tracing::warn;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Browsers only look this far into a page for a charset declaration
const META_SCAN_LIMIT: usize = 1024;

/// `<meta charset="...">` or `<meta http-equiv="Content-Type" content="...; charset=...">`
static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s[^>]*?charset\s*=\s*["']?(?P<label>[A-Za-z0-9_.:-]+)"#)
        .expect("meta charset regex should parse")
});

/// Character encodings schedule pages are served in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    /// ISO-8859-1; windows-1252 labels map here too since every byte decodes
    Latin1,
    Ascii,
}

impl Encoding {
    /// Looks up a charset label as it appears in a `Content-Type` header or a
    /// `<meta charset>`. Returns `None` for labels we can't decode.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().trim_matches('"').to_ascii_lowercase();
        match label.as_str() {
            "utf-8" | "utf8" | "unicode-1-1-utf-8" => Some(Encoding::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "l1" | "windows-1252" | "cp1252" => {
                Some(Encoding::Latin1)
            }
            "us-ascii" | "ascii" => Some(Encoding::Ascii),
            _ => None,
        }
    }

    /// Reads the charset a page declares for itself in a `<meta>` tag near
    /// the top of the document
    pub fn sniff_meta(bytes: &[u8]) -> Option<Self> {
        let head = &bytes[..bytes.len().min(META_SCAN_LIMIT)];
        let label = META_CHARSET.captures(head)?.name("label")?;
        Self::from_label(std::str::from_utf8(label.as_bytes()).ok()?)
    }

    /// Pulls the `charset=` parameter out of a `Content-Type` value
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, value)| Self::from_label(value))
    }
}

impl FromStr for Encoding {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| DecodeError::UnknownEncoding(s.to_string()))
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::Ascii => "us-ascii",
        })
    }
}

/// What to do with bytes that don't fit the declared encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Substitute or fall back and keep going
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("document is not valid {encoding}: bad byte at offset {offset}")]
    InvalidBytes { encoding: Encoding, offset: usize },
    #[error("unsupported character encoding {0:?}")]
    UnknownEncoding(String),
}

/// Turns raw document bytes into text. Invalid input is either repaired
/// (lenient) or refused (strict), never silently truncated.
pub fn decode(bytes: &[u8], encoding: Encoding, policy: DecodePolicy) -> Result<Cow<'_, str>, DecodeError> {
    match encoding {
        Encoding::Utf8 => {
            let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            match std::str::from_utf8(bytes) {
                Ok(text) => Ok(Cow::Borrowed(text)),
                Err(e) if policy == DecodePolicy::Lenient => {
                    warn!(
                        offset = e.valid_up_to(),
                        "document is not valid utf-8, replacing bad sequences"
                    );
                    Ok(String::from_utf8_lossy(bytes))
                }
                Err(e) => Err(DecodeError::InvalidBytes {
                    encoding,
                    offset: e.valid_up_to(),
                }),
            }
        }
        Encoding::Latin1 => Ok(Cow::Owned(latin1(bytes))),
        Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
            None => Ok(Cow::Owned(latin1(bytes))),
            Some(offset) if policy == DecodePolicy::Lenient => {
                warn!(offset, "document is not ascii, decoding as latin-1");
                Ok(Cow::Owned(latin1(bytes)))
            }
            Some(offset) => Err(DecodeError::InvalidBytes { encoding, offset }),
        },
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

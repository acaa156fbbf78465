//! Path grammar resolver
//!
//! Splits a request path into an access token, processing instructions and
//! the source image URL. Supported forms:
//!
//! ```text
//! /<token>/fill/300/200/noea/1/<url-tail>          legacy positional
//! /<token>/rs:fill:300:200/g:noea/<url-tail>       advanced
//! <url-tail> := plain/<url>[@ext] | encoded/<b64>[.ext]
//!             | http(s)://... | <relative> (with base_url) | <b64>[.ext]
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tracing::trace;

use crate::config::Config;
use crate::constants::{BYPASS_TOKEN, ENCODED_KEYWORD, PLAIN_KEYWORD};
use crate::error::ProcessingError;
use crate::options::{Instruction, OptionName, Precedence, ResizeType};

type Result<T> = std::result::Result<T, ProcessingError>;

/// How the source URL was written in the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlEncoding {
    /// Literal URL, possibly percent-escaped
    Plain,
    /// base64url-encoded URL
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    /// Absolute URL of the source image (base URL already applied)
    pub url: String,
    pub encoding: UrlEncoding,
    /// Output format requested with `@ext` / `.ext`
    pub extension: Option<String>,
}

/// An instruction taken from the path together with its precedence
#[derive(Debug, Clone, PartialEq)]
pub struct PathInstruction {
    pub instruction: Instruction,
    pub precedence: Precedence,
}

impl PathInstruction {
    fn new(instruction: Instruction, precedence: Precedence) -> Self {
        Self {
            instruction,
            precedence,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPath {
    /// Access token (`unsafe` or a signature), if the path carries one
    pub token: Option<String>,
    /// `/` + everything after the token, as received; what a signature covers
    pub signed_path: String,
    pub instructions: Vec<PathInstruction>,
    pub source: SourceUrl,
}

impl ParsedPath {
    /// `format` instruction for the URL extension, if one was given
    pub fn extension_instruction(&self) -> Option<PathInstruction> {
        self.source.extension.as_ref().map(|ext| {
            PathInstruction::new(
                Instruction::new(OptionName::Format.as_str(), [ext.as_str()]),
                Precedence::UrlExtension,
            )
        })
    }
}

/// Parse the request path (without its query string)
pub fn parse_path(path: &str, config: &Config) -> Result<ParsedPath> {
    let (token, tail) = split_access_token(path, config)?;
    parse_tail(token, tail, config)
}

/// Split the access token off the request path
///
/// Returns the token, if any, and the rest of the path without its leading
/// `/`. With signing enforced the first segment is always the token.
/// Otherwise it is one when it is `unsafe` or has the shape of a signature,
/// so signed URLs keep resolving after signing is switched off.
pub fn split_access_token<'a>(
    path: &'a str,
    config: &Config,
) -> Result<(Option<&'a str>, &'a str)> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Err(ProcessingError::invalid_path("path is empty"));
    }

    let (first, after_first) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    let is_token = config.signing.is_enforced()
        || first == BYPASS_TOKEN
        || (!after_first.is_empty()
            && looks_like_signature(first, config.signing.signature_size));

    if is_token {
        Ok((Some(first), after_first))
    } else {
        Ok((None, trimmed))
    }
}

/// Parse what follows the access token
pub fn parse_tail(token: Option<&str>, tail: &str, config: &Config) -> Result<ParsedPath> {
    let token = token.map(str::to_string);
    let signed_path = format!("/{}", tail);
    if tail.is_empty() {
        return Err(ProcessingError::invalid_path("missing source URL"));
    }

    let segments: Vec<&str> = tail.split('/').collect();
    let mut instructions = Vec::new();
    let mut index = 0;

    if let Some(legacy) = parse_legacy(&segments) {
        trace!(path = %tail, "legacy positional path");
        instructions.extend(legacy);
        index = LEGACY_SEGMENTS;
    }

    while index < segments.len() {
        let segment = segments[index];

        if segment.is_empty() && index + 1 < segments.len() {
            index += 1;
            continue;
        }

        if segment == PLAIN_KEYWORD {
            let source = parse_plain(&segments[index + 1..].join("/"), config)?;
            return Ok(ParsedPath {
                token,
                signed_path,
                instructions,
                source,
            });
        }

        if segment == ENCODED_KEYWORD {
            let source = parse_encoded(&segments[index + 1..], config)?;
            return Ok(ParsedPath {
                token,
                signed_path,
                instructions,
                source,
            });
        }

        let rest = segments[index..].join("/");
        if is_http_url(&percent_decode(&rest)) {
            let source = parse_plain(&rest, config)?;
            return Ok(ParsedPath {
                token,
                signed_path,
                instructions,
                source,
            });
        }

        if segment.contains(':') {
            let instruction: Instruction = percent_decode(segment).parse()?;
            instructions.push(PathInstruction::new(instruction, Precedence::Path));
            index += 1;
            continue;
        }

        let source = if config.base_url.is_empty() {
            parse_encoded(&segments[index..], config)?
        } else {
            parse_plain(&rest, config)?
        };
        return Ok(ParsedPath {
            token,
            signed_path,
            instructions,
            source,
        });
    }

    Err(ProcessingError::invalid_path("missing source URL"))
}

const LEGACY_SEGMENTS: usize = 5;

/// `resize-type/width/height/gravity/enlarge` followed by at least one more segment
fn parse_legacy(segments: &[&str]) -> Option<Vec<PathInstruction>> {
    if segments.len() <= LEGACY_SEGMENTS {
        return None;
    }

    let resize = segments[0];
    let (width, height) = (segments[1], segments[2]);
    if resize.parse::<ResizeType>().is_err()
        || width.parse::<u32>().is_err()
        || height.parse::<u32>().is_err()
    {
        return None;
    }

    let positional = |name: OptionName, value: &str, precedence: Precedence| {
        PathInstruction::new(Instruction::new(name.as_str(), [value]), precedence)
    };

    Some(vec![
        positional(OptionName::ResizingType, resize, Precedence::Path),
        positional(OptionName::Width, width, Precedence::PositionalSize),
        positional(OptionName::Height, height, Precedence::PositionalSize),
        positional(OptionName::Gravity, segments[3], Precedence::Path),
        positional(OptionName::Enlarge, segments[4], Precedence::Path),
    ])
}

/// Literal URL, optionally escaped and suffixed with `@ext`
fn parse_plain(raw: &str, config: &Config) -> Result<SourceUrl> {
    let (url, extension) = match raw.rsplit_once('@') {
        Some((url, ext)) if is_extension(ext) => (url, Some(ext.to_string())),
        _ => (raw, None),
    };

    let url = percent_decode(url);
    if url.is_empty() {
        return Err(ProcessingError::invalid_source("source URL is empty"));
    }

    Ok(SourceUrl {
        url: with_base_url(url, config),
        encoding: UrlEncoding::Plain,
        extension,
    })
}

/// base64url URL split over one or more segments, optionally suffixed with `.ext`
fn parse_encoded(segments: &[&str], config: &Config) -> Result<SourceUrl> {
    let joined = segments.concat();
    let (blob, extension) = match joined.rsplit_once('.') {
        Some((blob, ext)) if is_extension(ext) => (blob, Some(ext.to_string())),
        _ => (joined.as_str(), None),
    };

    let blob = blob.trim_end_matches('=');
    if blob.is_empty() {
        return Err(ProcessingError::invalid_source("encoded source URL is empty"));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(blob)
        .map_err(|e| ProcessingError::invalid_source(format!("invalid base64: {}", e)))?;
    let url = String::from_utf8(bytes)
        .map_err(|_| ProcessingError::invalid_source("decoded URL is not valid UTF-8"))?;
    if url.is_empty() {
        return Err(ProcessingError::invalid_source("source URL is empty"));
    }

    Ok(SourceUrl {
        url: with_base_url(url, config),
        encoding: UrlEncoding::Base64,
        extension,
    })
}

/// Percent-decode a path component
///
/// Byte sequences that do not decode to UTF-8 stay escaped, so the URL can
/// still be fetched as written.
fn percent_decode(value: &str) -> String {
    let bytes = urlencoding::decode_binary(value.as_bytes());
    let mut decoded = String::with_capacity(bytes.len());
    let mut rest: &[u8] = &bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                decoded.push_str(valid);
                return decoded;
            }
            Err(e) => {
                let (valid, invalid) = rest.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    decoded.push_str(valid);
                }
                let len = e.error_len().unwrap_or(invalid.len());
                for byte in &invalid[..len] {
                    decoded.push('%');
                    decoded.push_str(&hex::encode_upper([*byte]));
                }
                rest = &invalid[len..];
            }
        }
    }
}

/// base64url digest truncated to `size` bytes, as produced by signing
fn looks_like_signature(segment: &str, size: usize) -> bool {
    if segment == PLAIN_KEYWORD || segment == ENCODED_KEYWORD {
        return false;
    }

    segment.len() == (size * 4 + 2) / 3
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn is_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_http_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether `url` starts with a `scheme://` prefix
fn has_scheme(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn with_base_url(url: String, config: &Config) -> String {
    if config.base_url.is_empty() || has_scheme(&url) {
        return url;
    }

    format!(
        "{}/{}",
        config.base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

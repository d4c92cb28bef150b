//! Charset codec between Unicode text and the wire codepage.
//!
//! Requests always go out in a single-byte legacy codepage (windows-1251 by
//! default). Replies name their own encoding in the declaration; when they do
//! not, a byte-order mark and then the configured default are used.

use encoding_rs::{EncoderResult, Encoding, WINDOWS_1251};
use regex::bytes::Regex;
use std::sync::OnceLock;

use crate::errors::ExchangeError;

/// Codepage mandated for request bodies.
pub fn default_wire_charset() -> &'static Encoding {
    WINDOWS_1251
}

/// Only the head of the document is searched for the declaration.
const DECLARATION_WINDOW: usize = 512;

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*<\?xml[^>]*?\bencoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#)
            .expect("declaration pattern is valid")
    })
}

/// Resolves an encoding label (`windows-1251`, `cp1251`, `UTF-8`, ...).
pub fn charset_for_label(label: &str) -> Result<&'static Encoding, ExchangeError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ExchangeError::UnknownCharset(label.to_string()))
}

/// Returns the encoding label declared in the document header, if any.
pub fn declared_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    declaration_regex()
        .captures(head)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}

/// Encodes `text` into `charset`.
///
/// Fails with `UnsupportedCharacter` naming the first character that has no
/// representation; nothing is ever substituted or dropped.
pub fn encode_to_wire(text: &str, charset: &'static Encoding) -> Result<Vec<u8>, ExchangeError> {
    let mut encoder = charset.new_encoder();
    let capacity = encoder
        .max_buffer_length_from_utf8_without_replacement(text.len())
        .ok_or_else(|| ExchangeError::MalformedDocument("document too large to encode".into()))?;
    let mut out = vec![0u8; capacity];

    let (result, _read, written) =
        encoder.encode_from_utf8_without_replacement(text, &mut out, true);
    match result {
        EncoderResult::InputEmpty => {
            out.truncate(written);
            Ok(out)
        }
        EncoderResult::Unmappable(character) => {
            // Every character before the first unmappable one was encoded.
            let position = text
                .chars()
                .position(|c| c == character)
                .unwrap_or_default();
            Err(ExchangeError::UnsupportedCharacter {
                character,
                position,
                charset: charset.name(),
            })
        }
        EncoderResult::OutputFull => Err(ExchangeError::MalformedDocument(
            "encoder output buffer exhausted".into(),
        )),
    }
}

/// Decodes reply bytes to text.
///
/// The declared charset wins, then a byte-order mark, then `default`.
/// Byte sequences that are invalid in the chosen charset are an error.
pub fn decode_from_wire(bytes: &[u8], default: &'static Encoding) -> Result<String, ExchangeError> {
    let (charset, body) = match declared_charset(bytes) {
        Some(label) => {
            let charset = charset_for_label(&label)?;
            match Encoding::for_bom(bytes) {
                Some((bom, len)) if bom == charset => (charset, &bytes[len..]),
                _ => (charset, bytes),
            }
        }
        None => match Encoding::for_bom(bytes) {
            Some((bom, len)) => (bom, &bytes[len..]),
            None => (default, bytes),
        },
    };

    tracing::debug!("Decoding {} reply bytes as {}", body.len(), charset.name());
    charset
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or_else(|| {
            ExchangeError::MalformedDocument(format!(
                "reply is not valid {} text",
                charset.name()
            ))
        })
}

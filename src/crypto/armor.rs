//! ASCII armor for keys and messages.
//!
//! Armored blocks are base64 between `-----BEGIN ARGONCHAT <LABEL>-----` and
//! `-----END ARGONCHAT <LABEL>-----` lines, wrapped at 64 columns.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Line width of the base64 body.
const LINE_WIDTH: usize = 64;

/// Input bytes per body line.
const CHUNK: usize = LINE_WIDTH / 4 * 3;

/// Errors that can occur while removing armor.
#[derive(Error, Debug)]
pub enum ArmorError {
    #[error("Missing armor header for {0}")]
    MissingHeader(&'static str),

    #[error("Missing armor footer for {0}")]
    MissingFooter(&'static str),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

fn header(label: &str) -> String {
    format!("-----BEGIN ARGONCHAT {}-----", label)
}

fn footer(label: &str) -> String {
    format!("-----END ARGONCHAT {}-----", label)
}

/// Exact length of the armored form of `len` bytes.
fn armored_len(label: &str, len: usize) -> usize {
    let body: usize = (0..len)
        .step_by(CHUNK)
        .map(|start| (len - start).min(CHUNK).div_ceil(3) * 4 + 1)
        .sum();
    header(label).len() + footer(label).len() + 2 + body
}

/// Appends the armored block to `out`, which must already hold enough capacity.
fn write_armor(label: &str, data: &[u8], out: &mut String) {
    out.push_str(&header(label));
    out.push('\n');

    let mut line = [0u8; LINE_WIDTH];
    for chunk in data.chunks(CHUNK) {
        // a full chunk encodes to exactly LINE_WIDTH bytes
        if let Ok(n) = BASE64.encode_slice(chunk, &mut line) {
            out.push_str(std::str::from_utf8(&line[..n]).unwrap_or_default());
        }
        out.push('\n');
    }
    line.zeroize();

    out.push_str(&footer(label));
    out.push('\n');
}

/// Wraps binary data in an armored block.
pub fn armor(label: &str, data: &[u8]) -> String {
    let mut out = String::with_capacity(armored_len(label, data.len()));
    write_armor(label, data, &mut out);
    out
}

/// Like [`armor`], for secrets: the text is built in place and wiped on drop.
pub fn armor_secret(label: &str, data: &[u8]) -> Zeroizing<String> {
    let mut out = Zeroizing::new(String::with_capacity(armored_len(label, data.len())));
    write_armor(label, data, &mut out);
    out
}

/// Extracts the binary content of the first armored block with `label`.
pub fn dearmor(text: &str, label: &'static str) -> Result<Vec<u8>, ArmorError> {
    let header = header(label);
    let footer = footer(label);

    let start = text
        .find(&header)
        .ok_or(ArmorError::MissingHeader(label))?
        + header.len();
    let end = text[start..]
        .find(&footer)
        .ok_or(ArmorError::MissingFooter(label))?
        + start;

    let armored = &text[start..end];
    let mut body = Zeroizing::new(String::with_capacity(armored.len()));
    body.extend(armored.chars().filter(|c| !c.is_whitespace()));
    Ok(BASE64.decode(body.as_bytes())?)
}

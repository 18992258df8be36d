//! RouterOS API word codec.
//!
//! DESIGN
//! ======
//! The API speaks in sentences: a sequence of length-prefixed words closed
//! by a zero-length word. The length prefix is variable width; its high
//! bits announce how many bytes follow:
//!
//! | length            | bytes | marker        |
//! |-------------------|-------|---------------|
//! | `< 0x80`          | 1     | none          |
//! | `< 0x4000`        | 2     | `0x8000`      |
//! | `< 0x20_0000`     | 3     | `0xC0_0000`   |
//! | `< 0x1000_0000`   | 4     | `0xE000_0000` |
//! | otherwise         | 5     | `0xF0` + u32  |
//!
//! Leading bytes `0xF8..=0xFF` are reserved control bytes and are rejected.
//! Word payloads are decoded lossily: routers happily store non-UTF-8
//! comments and one odd byte must not poison a whole poll.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a single inbound word; anything larger is a desync.
const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Attribute map of one reply sentence (`=key=value` words).
pub type Row = HashMap<String, String>;

/// Error returned while decoding API sentences.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reserved control byte 0x{0:02x} in length prefix")]
    ControlByte(u8),
    #[error("word length {0} exceeds limit")]
    WordTooLong(usize),
    #[error("empty reply sentence")]
    EmptySentence,
    #[error("unknown reply type: {0}")]
    UnknownReply(String),
}

// =============================================================================
// ENCODE
// =============================================================================

/// Append the length prefix for a word of `len` bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    let n = len as u32;
    if n < 0x80 {
        out.push(n as u8);
    } else if n < 0x4000 {
        out.extend_from_slice(&(n | 0x8000).to_be_bytes()[2..]);
    } else if n < 0x20_0000 {
        out.extend_from_slice(&(n | 0xC0_0000).to_be_bytes()[1..]);
    } else if n < 0x1000_0000 {
        out.extend_from_slice(&(n | 0xE000_0000).to_be_bytes());
    } else {
        out.push(0xF0);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

/// Append one length-prefixed word.
pub fn encode_word(word: &str, out: &mut Vec<u8>) {
    encode_length(word.len(), out);
    out.extend_from_slice(word.as_bytes());
}

/// Encode a full sentence including its terminating empty word.
#[must_use]
pub fn encode_sentence(words: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.iter().map(|w| w.len() + 1).sum::<usize>() + 1);
    for word in words {
        encode_word(word, &mut out);
    }
    out.push(0);
    out
}

// =============================================================================
// DECODE
// =============================================================================

async fn read_length<R>(reader: &mut R) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read_u8().await?;
    let (extra, mut value) = match first {
        b if b & 0x80 == 0x00 => (0, u32::from(b)),
        b if b & 0xC0 == 0x80 => (1, u32::from(b & 0x3F)),
        b if b & 0xE0 == 0xC0 => (2, u32::from(b & 0x1F)),
        b if b & 0xF0 == 0xE0 => (3, u32::from(b & 0x0F)),
        0xF0 => (4, 0),
        b => return Err(CodecError::ControlByte(b)),
    };
    for _ in 0..extra {
        value = (value << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(value as usize)
}

async fn read_word<R>(reader: &mut R) -> Result<String, CodecError>
where
    R: AsyncRead + Unpin,
{
    let len = read_length(reader).await?;
    if len > MAX_WORD_LEN {
        return Err(CodecError::WordTooLong(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read words until the terminating empty word.
pub async fn read_sentence<R>(reader: &mut R) -> Result<Vec<String>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut words = Vec::new();
    loop {
        let word = read_word(reader).await?;
        if word.is_empty() {
            return Ok(words);
        }
        words.push(word);
    }
}

// =============================================================================
// REPLY
// =============================================================================

/// A decoded reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `!re`: one data row.
    Row(Row),
    /// `!done`: end of the reply, possibly with attributes (`=ret=`).
    Done(Row),
    /// `!trap`: the command failed; the connection stays usable.
    Trap(Row),
    /// `!fatal`: the router is closing the connection.
    Fatal(String),
    /// `!empty`: the command produced no rows.
    Empty,
}

/// Split an attribute word (`=key=value`) into its parts.
///
/// The value may itself contain `=`; only the first separator after the key
/// counts.
#[must_use]
pub fn parse_attribute(word: &str) -> Option<(&str, &str)> {
    let rest = word.strip_prefix('=')?;
    Some(rest.split_once('=').unwrap_or((rest, "")))
}

fn collect_attributes(words: &[String]) -> Row {
    words
        .iter()
        .filter_map(|w| parse_attribute(w))
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// Classify a raw sentence by its leading reply word.
pub fn parse_reply(words: Vec<String>) -> Result<Reply, CodecError> {
    let Some((kind, rest)) = words.split_first() else {
        return Err(CodecError::EmptySentence);
    };
    match kind.as_str() {
        "!re" => Ok(Reply::Row(collect_attributes(rest))),
        "!done" => Ok(Reply::Done(collect_attributes(rest))),
        "!trap" => Ok(Reply::Trap(collect_attributes(rest))),
        "!empty" => Ok(Reply::Empty),
        "!fatal" => Ok(Reply::Fatal(rest.join(" "))),
        other => Err(CodecError::UnknownReply(other.to_owned())),
    }
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;

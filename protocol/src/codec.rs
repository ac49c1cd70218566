//! Tree serializer and the login exchange framing.
//!
//! A node is written depth-first, pre-order:
//! - label (`writeUTF` string)
//! - alert level (1 byte, see [`AlertLevel::wire_id`])
//! - message flag (1 byte), then the message only when the flag is set
//! - allows-children flag (1 byte)
//! - child count (BE `i16`)
//! - each child, recursively, in order
//!
//! The inline child count lets a client decode without buffering the whole
//! response. The server response is a single gzip member holding the
//! authentication flag followed by the tree when the flag is `true`.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::alert::{AlertLevel, InvalidAlertLevel};
use crate::de::{read_bool, read_i16, read_u8, read_utf};
use crate::node::NodeSnapshot;
use crate::ser::{write_bool, write_utf};

/// Largest child count representable by the `i16` wire field.
pub const MAX_CHILDREN: usize = i16::MAX as usize;

/// Deepest nesting either side accepts; the root sits at depth 0.
///
/// The encoder refuses deeper trees so everything it sends decodes, and so
/// a runaway tree cannot exhaust the stack of the encoding thread.
pub const MAX_DEPTH: usize = 512;

/// Errors produced while encoding/decoding status trees.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("too many children for current protocol: count={count} limit={limit}")]
    TooManyChildren { count: usize, limit: usize },

    #[error("encoded string exceeds limit: limit={limit} actual={len}")]
    StringTooLong { len: usize, limit: usize },

    #[error("malformed modified UTF-8 at byte {offset}")]
    InvalidModifiedUtf8 { offset: usize },

    #[error("negative child count {count}")]
    NegativeChildCount { count: i16 },

    #[error("tree nesting exceeds limit {limit}")]
    TooDeep { limit: usize },

    #[error(transparent)]
    InvalidAlertLevel(#[from] InvalidAlertLevel),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes `node` and its entire subtree.
///
/// Fails with [`CodecError::TooManyChildren`] as soon as any node has more
/// than [`MAX_CHILDREN`] children, or with [`CodecError::TooDeep`] once the
/// nesting reaches [`MAX_DEPTH`]; the output written so far is not usable.
pub fn encode_node<W: Write>(writer: &mut W, node: &NodeSnapshot) -> Result<(), CodecError> {
    encode_node_at(writer, node, 0)
}

fn encode_node_at<W: Write>(
    writer: &mut W,
    node: &NodeSnapshot,
    depth: usize,
) -> Result<(), CodecError> {
    if depth >= MAX_DEPTH {
        return Err(CodecError::TooDeep { limit: MAX_DEPTH });
    }

    write_utf(writer, &node.label)?;
    writer.write_all(&[node.alert_level.wire_id()])?;

    match node.effective_message() {
        Some(message) => {
            write_bool(writer, true)?;
            write_utf(writer, message)?;
        }
        None => write_bool(writer, false)?,
    }

    write_bool(writer, node.allows_children)?;

    let count = node.children.len();
    let wire_count = i16::try_from(count).map_err(|_| CodecError::TooManyChildren {
        count,
        limit: MAX_CHILDREN,
    })?;
    writer.write_all(&wire_count.to_be_bytes())?;

    for child in &node.children {
        encode_node_at(writer, child, depth + 1)?;
    }
    Ok(())
}

/// Reads one node and its subtree, the inverse of [`encode_node`].
pub fn decode_node<R: Read>(reader: &mut R) -> Result<NodeSnapshot, CodecError> {
    decode_node_at(reader, 0)
}

fn decode_node_at<R: Read>(reader: &mut R, depth: usize) -> Result<NodeSnapshot, CodecError> {
    if depth >= MAX_DEPTH {
        return Err(CodecError::TooDeep { limit: MAX_DEPTH });
    }

    let label = read_utf(reader)?;
    let alert_level = AlertLevel::try_from(read_u8(reader)?)?;
    let alert_message = if read_bool(reader)? {
        Some(read_utf(reader)?)
    } else {
        None
    };
    let allows_children = read_bool(reader)?;

    let count = read_i16(reader)?;
    let count = usize::try_from(count).map_err(|_| CodecError::NegativeChildCount { count })?;
    let mut children = Vec::with_capacity(count);
    for _ in 0..count {
        children.push(decode_node_at(reader, depth + 1)?);
    }

    Ok(NodeSnapshot {
        label,
        alert_level,
        alert_message,
        allows_children,
        children,
    })
}

/// Writes the client request: username then password.
pub fn encode_credentials<W: Write>(
    writer: &mut W,
    username: &str,
    password: &str,
) -> Result<(), CodecError> {
    write_utf(writer, username)?;
    write_utf(writer, password)?;
    Ok(())
}

/// Builds the complete compressed server response.
///
/// `None` produces a failed-login response holding a single `false` byte.
/// The gzip trailer is finalized before returning; on error nothing is
/// returned, so a caller never sends a partially encoded tree.
pub fn encode_response(tree: Option<&NodeSnapshot>) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    match tree {
        Some(root) => {
            write_bool(&mut encoder, true)?;
            encode_node(&mut encoder, root)?;
        }
        None => write_bool(&mut encoder, false)?,
    }
    Ok(encoder.finish()?)
}

/// Client side of [`encode_response`]: `Ok(None)` means authentication failed.
pub fn decode_response<R: Read>(reader: R) -> Result<Option<NodeSnapshot>, CodecError> {
    let mut decoder = GzDecoder::new(reader);
    if !read_bool(&mut decoder)? {
        return Ok(None);
    }
    Ok(Some(decode_node(&mut decoder)?))
}

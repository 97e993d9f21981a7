//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means the bytes themselves were wrong (or the
//! stream carrying them failed mid-frame), never a membership rule.

use scaffolding_transport::TransportError;

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A read asked for more bytes than the buffer still holds.
    ///
    /// Reads never go out of bounds; they fail with this instead.
    #[error("truncated buffer: needed {needed} bytes, {remaining} remaining")]
    TruncatedBuffer { needed: usize, remaining: usize },

    /// Bytes that should have been UTF-8 text were not.
    #[error("invalid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    /// A room code failed the shape or checksum check.
    ///
    /// Such a code is never handed to the mesh overlay.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// A request type name does not fit in the one-byte length prefix.
    #[error("request type name is {0} bytes (max 255)")]
    TypeNameTooLong(usize),

    /// A body does not fit in the four-byte length prefix.
    #[error("body is {0} bytes (max u32::MAX)")]
    BodyTooLong(usize),

    /// Serializing a JSON payload failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserializing a JSON payload failed (malformed JSON, missing
    /// fields, wrong types).
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The stream failed while a frame was being read or written.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Returns `true` if the underlying cause is an expired timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

//! A growable byte sequence with a read cursor.
//!
//! Every frame and every fixed-width field in the lobby protocol goes
//! through a [`ByteBuffer`]. Writers append at the end; readers consume
//! from the cursor and advance it. Multi-byte integers are big-endian
//! ("network order") on the wire.

use crate::ProtocolError;

/// A byte sequence plus a read offset.
///
/// A buffer built with [`ByteBuffer::new`] starts empty for writing; one
/// built with [`ByteBuffer::from_bytes`] starts at offset 0 over the
/// supplied bytes for reading. Both operations work on either kind, so a
/// buffer can be filled and then drained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer for writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer for reading the given bytes.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    // -----------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Appends a `u16` in big-endian order.
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a `u32` in big-endian order.
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends the UTF-8 bytes of `text` (no length prefix).
    pub fn write_str(&mut self, text: &str) {
        self.data.extend_from_slice(text.as_bytes());
    }

    // -----------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------

    /// Consumes exactly `len` bytes and returns them.
    ///
    /// # Errors
    /// [`ProtocolError::TruncatedBuffer`] if fewer than `len` bytes remain.
    /// The cursor does not move on failure.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], ProtocolError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ProtocolError::TruncatedBuffer {
                needed: len,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Reads a fixed-size array. Used by the integer readers.
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads `len` bytes and decodes them as UTF-8.
    ///
    /// # Errors
    /// - [`ProtocolError::TruncatedBuffer`] if fewer than `len` bytes remain.
    /// - [`ProtocolError::InvalidEncoding`] if the bytes are not UTF-8. The
    ///   bytes are consumed either way.
    pub fn read_str(&mut self, len: usize) -> Result<String, ProtocolError> {
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    /// Consumes everything after the cursor.
    pub fn read_remaining(&mut self) -> &[u8] {
        let start = self.pos;
        self.pos = self.data.len();
        &self.data[start..]
    }

    // -----------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total number of bytes held, read or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All bytes held, ignoring the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_write_integers_are_big_endian() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(0x01);
        buf.write_u16(0x63DD);
        buf.write_u32(0xDEADBEEF);

        assert_eq!(buf.as_bytes(), &[0x01, 0x63, 0xDD, 0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_read_sequence_returns_written_values() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(7);
        buf.write_u16(25565);
        buf.write_u32(u32::MAX);
        buf.write_bytes(&[1, 2, 3]);
        buf.write_str("héllo");

        let mut buf = ByteBuffer::from_bytes(buf.into_bytes());
        assert_eq!(buf.read_u8().unwrap(), 7);
        assert_eq!(buf.read_u16().unwrap(), 25565);
        assert_eq!(buf.read_u32().unwrap(), u32::MAX);
        assert_eq!(buf.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert_eq!(buf.read_str("héllo".len()).unwrap(), "héllo");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_read_u32_past_end_is_truncated_and_cursor_stays() {
        let mut buf = ByteBuffer::from_bytes(vec![0xAA, 0xBB]);

        let err = buf.read_u32().unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::TruncatedBuffer { needed: 4, remaining: 2 }
        ));
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.read_u16().unwrap(), 0xAABB);
    }

    #[test]
    fn test_read_u8_on_empty_buffer_is_truncated() {
        let mut buf = ByteBuffer::new();
        assert!(matches!(
            buf.read_u8(),
            Err(ProtocolError::TruncatedBuffer { needed: 1, remaining: 0 })
        ));
    }

    #[test]
    fn test_read_str_invalid_utf8_is_invalid_encoding() {
        let mut buf = ByteBuffer::from_bytes(vec![0xFF, 0xFE, 0x41]);

        assert!(matches!(
            buf.read_str(3),
            Err(ProtocolError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_read_bytes_zero_length_succeeds_on_empty() {
        let mut buf = ByteBuffer::new();
        assert!(buf.read_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn test_read_remaining_drains_after_cursor() {
        let mut buf = ByteBuffer::from_bytes(b"\x05rest".to_vec());
        buf.read_u8().unwrap();

        assert_eq!(buf.read_remaining(), b"rest");
        assert_eq!(buf.remaining(), 0);
        assert!(buf.read_remaining().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Field {
        U8(u8),
        U16(u16),
        U32(u32),
        Bytes(Vec<u8>),
        Text(String),
    }

    fn field() -> impl Strategy<Value = Field> {
        prop_oneof![
            any::<u8>().prop_map(Field::U8),
            any::<u16>().prop_map(Field::U16),
            any::<u32>().prop_map(Field::U32),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(Field::Bytes),
            ".{0,16}".prop_map(Field::Text),
        ]
    }

    proptest! {
        #[test]
        fn prop_mixed_fields_read_back_in_order(fields in proptest::collection::vec(field(), 0..32)) {
            let mut buf = ByteBuffer::new();
            for f in &fields {
                match f {
                    Field::U8(v) => buf.write_u8(*v),
                    Field::U16(v) => buf.write_u16(*v),
                    Field::U32(v) => buf.write_u32(*v),
                    Field::Bytes(v) => buf.write_bytes(v),
                    Field::Text(v) => buf.write_str(v),
                }
            }

            let mut buf = ByteBuffer::from_bytes(buf.into_bytes());
            for f in &fields {
                match f {
                    Field::U8(v) => prop_assert_eq!(buf.read_u8().unwrap(), *v),
                    Field::U16(v) => prop_assert_eq!(buf.read_u16().unwrap(), *v),
                    Field::U32(v) => prop_assert_eq!(buf.read_u32().unwrap(), *v),
                    Field::Bytes(v) => prop_assert_eq!(buf.read_bytes(v.len()).unwrap(), v.as_slice()),
                    Field::Text(v) => prop_assert_eq!(&buf.read_str(v.len()).unwrap(), v),
                }
            }
            prop_assert_eq!(buf.remaining(), 0);
        }

        #[test]
        fn prop_over_read_never_panics(data in proptest::collection::vec(any::<u8>(), 0..8), extra in 1usize..16) {
            let mut buf = ByteBuffer::from_bytes(data.clone());
            let result = buf.read_bytes(data.len() + extra);
            let is_truncated = matches!(result, Err(ProtocolError::TruncatedBuffer { .. }));
            prop_assert!(is_truncated);
        }
    }
}

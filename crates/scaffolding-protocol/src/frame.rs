//! Request and response frames.
//!
//! Wire format (all integers big-endian):
//!
//! ```text
//! request:  [u8 N][N bytes type name, UTF-8][u32 L][L bytes body]
//! response: [u8 status][u32 L][L bytes body]
//! ```
//!
//! A frame is written with a single send and flushed. Reading one takes the
//! fixed header first and then exactly `L` more bytes; a stream that ends
//! inside a frame, or a read that outlasts its timeout, is an error rather
//! than a partial frame.

use std::time::Duration;

use scaffolding_transport::{with_timeout, Connection, TransportError};

use crate::types::status;
use crate::{ByteBuffer, ProtocolError};

/// Longest type name the one-byte length prefix can carry.
pub const MAX_TYPE_NAME_LEN: usize = u8::MAX as usize;

/// Bounds applied while reading a frame from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Upper bound on each individual receive.
    pub timeout: Duration,
    /// Bodies larger than this are refused before any allocation.
    pub max_body_len: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_body_len: 16 * 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A client → server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request type name, e.g. `c:ping`.
    pub kind: String,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(kind: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            body: body.into(),
        }
    }

    /// A request with an empty body.
    pub fn empty(kind: impl Into<String>) -> Self {
        Self::new(kind, Vec::new())
    }

    /// Encodes the full frame.
    ///
    /// # Errors
    /// [`ProtocolError::TypeNameTooLong`] or [`ProtocolError::BodyTooLong`]
    /// when a length does not fit its prefix.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name_len = u8::try_from(self.kind.len())
            .map_err(|_| ProtocolError::TypeNameTooLong(self.kind.len()))?;
        let body_len = body_len(&self.body)?;

        let mut buf = ByteBuffer::new();
        buf.write_u8(name_len);
        buf.write_str(&self.kind);
        buf.write_u32(body_len);
        buf.write_bytes(&self.body);
        Ok(buf.into_bytes())
    }

    /// Decodes one frame from the cursor of `buf`.
    pub fn decode(buf: &mut ByteBuffer) -> Result<Self, ProtocolError> {
        let name_len = usize::from(buf.read_u8()?);
        let kind = buf.read_str(name_len)?;
        let body_len = buf.read_u32()? as usize;
        let body = buf.read_bytes(body_len)?.to_vec();
        Ok(Self { kind, body })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A server → client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// `0` on success; see [`status`](crate::status) for the others.
    pub status: u8,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u8, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A status-0 response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(status::OK, body)
    }

    /// A nonzero status with a UTF-8 explanation as the body.
    pub fn failure(status: u8, message: &str) -> Self {
        Self::new(status, message.as_bytes())
    }

    /// The answer to a request type nobody registered.
    pub fn unknown_request(kind: &str) -> Self {
        Self::failure(
            status::UNKNOWN_REQUEST,
            &format!("unknown request type: {kind}"),
        )
    }

    pub fn is_ok(&self) -> bool {
        self.status == status::OK
    }

    /// The body as UTF-8 text, if it is valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// A reader over the body.
    pub fn body_buffer(&self) -> ByteBuffer {
        ByteBuffer::from_bytes(self.body.clone())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body_len = body_len(&self.body)?;
        let mut buf = ByteBuffer::new();
        buf.write_u8(self.status);
        buf.write_u32(body_len);
        buf.write_bytes(&self.body);
        Ok(buf.into_bytes())
    }

    pub fn decode(buf: &mut ByteBuffer) -> Result<Self, ProtocolError> {
        let status = buf.read_u8()?;
        let body_len = buf.read_u32()? as usize;
        let body = buf.read_bytes(body_len)?.to_vec();
        Ok(Self { status, body })
    }
}

fn body_len(body: &[u8]) -> Result<u32, ProtocolError> {
    u32::try_from(body.len()).map_err(|_| ProtocolError::BodyTooLong(body.len()))
}

// ---------------------------------------------------------------------------
// Stream I/O
// ---------------------------------------------------------------------------

/// Receives exactly `len` bytes within `limit`. `None` means the peer
/// closed before sending anything.
async fn recv<C>(
    conn: &C,
    len: usize,
    limit: Duration,
) -> Result<Option<Vec<u8>>, ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    with_timeout(limit, async {
        conn.recv_exact(len).await.map_err(ProtocolError::from)
    })
    .await
}

/// Like [`recv`], but a close is an error: we are inside a frame.
async fn recv_within_frame<C>(
    conn: &C,
    len: usize,
    limit: Duration,
) -> Result<Vec<u8>, ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    recv(conn, len, limit).await?.ok_or_else(|| {
        TransportError::Cancelled(format!("peer closed with {len} frame bytes outstanding"))
            .into()
    })
}

/// Armed once a frame's first bytes are consumed. Dropped while still
/// armed (cancelled, or an error mid-frame) it poisons the connection,
/// since the next read would start inside this frame.
struct MidFrame<'a, C: Connection> {
    conn: &'a C,
    armed: bool,
}

impl<'a, C: Connection> MidFrame<'a, C> {
    fn new(conn: &'a C) -> Self {
        Self { conn, armed: true }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl<C: Connection> Drop for MidFrame<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.poison();
        }
    }
}

fn check_body_len(len: usize, limits: &ReadLimits) -> Result<(), ProtocolError> {
    if len > limits.max_body_len {
        return Err(ProtocolError::BodyTooLong(len));
    }
    Ok(())
}

/// Reads the next request frame.
///
/// Returns `Ok(None)` if the peer closed the stream cleanly between
/// frames.
pub async fn read_request<C>(
    conn: &C,
    limits: &ReadLimits,
) -> Result<Option<Request>, ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    let Some(first) = recv(conn, 1, limits.timeout).await? else {
        return Ok(None);
    };
    let name_len = usize::from(first[0]);
    let frame = MidFrame::new(conn);

    let mut header = ByteBuffer::from_bytes(
        recv_within_frame(conn, name_len + 4, limits.timeout).await?,
    );
    let kind = header.read_str(name_len)?;
    let body_len = header.read_u32()? as usize;
    check_body_len(body_len, limits)?;

    let body = recv_within_frame(conn, body_len, limits.timeout).await?;
    frame.complete();
    Ok(Some(Request { kind, body }))
}

/// Reads one response frame. A close at any point is an error: the caller
/// is always waiting on an answer.
pub async fn read_response<C>(
    conn: &C,
    limits: &ReadLimits,
) -> Result<Response, ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    let mut header =
        ByteBuffer::from_bytes(recv_within_frame(conn, 5, limits.timeout).await?);
    let frame = MidFrame::new(conn);
    let status = header.read_u8()?;
    let body_len = header.read_u32()? as usize;
    check_body_len(body_len, limits)?;

    let body = recv_within_frame(conn, body_len, limits.timeout).await?;
    frame.complete();
    Ok(Response { status, body })
}

pub async fn write_request<C>(conn: &C, request: &Request) -> Result<(), ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    conn.send(&request.encode()?).await?;
    Ok(())
}

pub async fn write_response<C>(
    conn: &C,
    response: &Response,
) -> Result<(), ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    conn.send(&response.encode()?).await?;
    Ok(())
}

/// Sends `request` and waits for its response, the whole round trip
/// bounded by `limit`.
///
/// A timeout leaves the response unread: it arrives later and is seen by
/// whoever reads next. If the timer fired mid-frame the connection is
/// poisoned instead.
pub async fn exchange<C>(
    conn: &C,
    request: &Request,
    limit: Duration,
    limits: &ReadLimits,
) -> Result<Response, ProtocolError>
where
    C: Connection<Error = TransportError>,
{
    with_timeout(limit, async {
        write_request(conn, request).await?;
        read_response(conn, limits).await
    })
    .await
}

//! Content-Length framing
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```

use crate::transport::message::Message;
use crate::types::RpcError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Upper bound on a header block before we give up on the stream.
pub const MAX_HEADER_LEN: usize = 8 * 1024;

/// Largest body a peer may announce.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Frames [`Message`]s over a byte stream.
///
/// Decoding buffers partial reads and only yields once the header and all
/// `Content-Length` body bytes are present. A bad header cannot be
/// resynchronised from, so it is reported as [`RpcError::Protocol`].
#[derive(Debug, Default)]
pub struct ContentLengthCodec {
    /// Body length parsed from a header whose body has not fully arrived.
    pending_body: Option<usize>,
}

impl ContentLengthCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ContentLengthCodec {
    type Item = Message;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, RpcError> {
        loop {
            let length = match self.pending_body {
                Some(length) => length,
                None => {
                    let Some(end) = find_header_end(src) else {
                        if src.len() > MAX_HEADER_LEN {
                            return Err(RpcError::Protocol(format!(
                                "no header terminator within {} bytes",
                                MAX_HEADER_LEN
                            )));
                        }
                        return Ok(None);
                    };
                    let header = src.split_to(end + HEADER_TERMINATOR.len());
                    let length = parse_content_length(&header[..end])?;
                    if length > MAX_BODY_LEN {
                        return Err(RpcError::Protocol(format!(
                            "Content-Length {} exceeds the {} byte limit",
                            length, MAX_BODY_LEN
                        )));
                    }
                    self.pending_body = Some(length);
                    length
                }
            };

            if src.len() < length {
                return Ok(None);
            }

            let body = src.split_to(length);
            self.pending_body = None;

            let value: serde_json::Value = serde_json::from_slice(&body)
                .map_err(|e| RpcError::Protocol(format!("invalid JSON body: {}", e)))?;

            match Message::from_value(value) {
                Some(message) => return Ok(Some(message)),
                None => {
                    debug!("Dropped unclassifiable frame of {} bytes", length);
                    continue;
                }
            }
        }
    }
}

impl Encoder<Message> for ContentLengthCodec {
    type Error = RpcError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), RpcError> {
        write_frame(&item, dst)
    }
}

/// The exact bytes written for `message`.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, RpcError> {
    let mut buf = BytesMut::new();
    write_frame(message, &mut buf)?;
    Ok(buf.to_vec())
}

fn write_frame(message: &Message, dst: &mut BytesMut) -> Result<(), RpcError> {
    let body = serde_json::to_vec(&message.to_value())?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());

    dst.reserve(header.len() + body.len());
    dst.extend_from_slice(header.as_bytes());
    dst.extend_from_slice(&body);
    Ok(())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_content_length(header: &[u8]) -> Result<usize, RpcError> {
    let header = std::str::from_utf8(header)
        .map_err(|_| RpcError::Protocol("header block is not ASCII".to_string()))?;

    let mut content_length = None;
    for line in header.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RpcError::Protocol(format!("malformed header line: {:?}", line)))?;

        // Other headers (e.g. Content-Type) are ignored
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            let length = value.trim().parse::<usize>().map_err(|_| {
                RpcError::Protocol(format!("invalid Content-Length: {:?}", value.trim()))
            })?;
            content_length = Some(length);
        }
    }

    content_length.ok_or_else(|| RpcError::Protocol("missing Content-Length header".to_string()))
}

//! Wire layer: JSON-RPC envelopes and Content-Length framing

pub mod codec;
pub mod message;

pub use codec::{encode_frame, ContentLengthCodec};
pub use message::{
    ErrorObject, Message, Notification, Request, RequestId, Response, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};

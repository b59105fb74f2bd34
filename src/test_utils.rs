//! In-memory server double for exercising the client without a process

use crate::transport::{ContentLengthCodec, ErrorObject, Message, Request, RequestId};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

/// The server end of an in-memory duplex pipe.
pub struct FakeServer {
    reader: FramedRead<ReadHalf<DuplexStream>, ContentLengthCodec>,
    writer: FramedWrite<WriteHalf<DuplexStream>, ContentLengthCodec>,
}

impl FakeServer {
    /// A fake plus the reader/writer pair to hand to the client.
    pub fn pair() -> (Self, ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);

        let server = Self {
            reader: FramedRead::new(server_read, ContentLengthCodec::new()),
            writer: FramedWrite::new(server_write, ContentLengthCodec::new()),
        };
        (server, client_read, client_write)
    }

    pub async fn recv(&mut self) -> Message {
        self.reader
            .next()
            .await
            .expect("client closed the stream")
            .expect("client sent an undecodable frame")
    }

    /// Next request, skipping notifications. Panics on any other method.
    pub async fn expect_request(&mut self, method: &str) -> Request {
        loop {
            match self.recv().await {
                Message::Request(req) => {
                    assert_eq!(req.method, method, "unexpected request");
                    return req;
                }
                Message::Notification(_) => continue,
                Message::Response(resp) => panic!("expected {} request, got {:?}", method, resp),
            }
        }
    }

    /// Answer `initialize` with `capabilities` and swallow `initialized`.
    pub async fn handshake(&mut self, capabilities: Value) {
        let init = self.expect_request("initialize").await;
        self.reply(init.id, serde_json::json!({ "capabilities": capabilities }))
            .await;
        match self.recv().await {
            Message::Notification(_) => {}
            other => panic!("expected initialized notification, got {:?}", other),
        }
    }

    pub async fn reply(&mut self, id: RequestId, result: Value) {
        self.send(Message::response(id, Ok(result))).await;
    }

    pub async fn reply_error(&mut self, id: RequestId, code: i64, message: &str) {
        let error = ErrorObject {
            code,
            message: message.to_string(),
            data: None,
        };
        self.send(Message::response(id, Err(error))).await;
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) {
        self.send(Message::notification(method, params)).await;
    }

    pub async fn send_request(&mut self, id: u64, method: &str, params: Option<Value>) {
        self.send(Message::request(id, method, params)).await;
    }

    pub async fn send(&mut self, message: Message) {
        self.writer.send(message).await.expect("client went away");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let io = self.writer.get_mut();
        io.write_all(bytes).await.expect("client went away");
        io.flush().await.expect("client went away");
    }
}

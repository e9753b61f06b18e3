//! Local websocket chat server for integration tests

use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use tungstenite::Message;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// What the server saw on one connection
#[allow(dead_code)]
#[derive(Debug)]
pub struct Exchange {
    /// Request target including the signed query string
    pub uri: String,
    /// First text frame the client sent
    pub request: String,
}

/// Serves one scripted reply per connection, then stops accepting
pub struct ChatServer {
    endpoint: String,
    handle: JoinHandle<Vec<Exchange>>,
}

impl ChatServer {
    /// `replies[n]` is the list of frames sent back on the n-th connection
    pub fn start(replies: Vec<Vec<String>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind chat server");
        let endpoint = format!(
            "ws://{}/v1.1/chat",
            listener.local_addr().expect("local address")
        );

        let handle = thread::spawn(move || {
            let mut exchanges = Vec::new();
            for frames in replies {
                let (stream, _) = listener.accept().expect("accept connection");
                let mut uri = String::new();
                let mut socket =
                    tungstenite::accept_hdr(
                        stream,
                        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                            uri = request.uri().to_string();
                            Ok(response)
                        },
                    )
                    .expect("websocket handshake");

                let request = match socket.read().expect("request frame") {
                    Message::Text(text) => text.as_str().to_string(),
                    other => panic!("unexpected request frame: {other:?}"),
                };
                for frame in frames {
                    socket.send(Message::text(frame)).expect("send frame");
                }
                let _ = socket.close(None);
                while socket.read().is_ok() {}

                exchanges.push(Exchange { uri, request });
            }
            exchanges
        });

        Self { endpoint, handle }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Wait for every scripted connection and return what was received
    pub fn finish(self) -> Vec<Exchange> {
        self.handle.join().expect("chat server thread")
    }
}

/// One reply frame in the chat wire format
pub fn frame(status: i64, content: &str) -> String {
    serde_json::json!({
        "header": {"code": 0, "message": "Success", "status": status},
        "payload": {"choices": {"status": status, "seq": 0, "text": [{"content": content, "role": "assistant", "index": 0}]}}
    })
    .to_string()
}

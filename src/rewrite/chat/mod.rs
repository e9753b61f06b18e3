
pub mod auth;

use serde::{Deserialize, Serialize};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::{ChatService, RewriteError};
use crate::config::{ChatCredentials, RewriteConfig};

/// Frame status that closes a reply
const FINAL_STATUS: i64 = 2;

type ChatSocket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Blocking client for a websocket chat endpoint.
///
/// Each call opens a socket on a freshly signed URL, sends one request frame
/// and reads JSON reply frames until one reports status 2. Connect, read and
/// write are bounded by the configured timeout.
pub struct ChatClient {
    endpoint: Url,
    credentials: ChatCredentials,
    domain: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    header: RequestHeader<'a>,
    parameter: RequestParameter<'a>,
    payload: RequestPayload<'a>,
}

#[derive(Debug, Serialize)]
struct RequestHeader<'a> {
    app_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestParameter<'a> {
    chat: ChatParameters<'a>,
}

#[derive(Debug, Serialize)]
struct ChatParameters<'a> {
    domain: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestPayload<'a> {
    message: RequestMessage<'a>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    text: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatFrame {
    header: FrameHeader,
    #[serde(default)]
    payload: Option<FramePayload>,
}

#[derive(Debug, Deserialize)]
struct FrameHeader {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    choices: FrameChoices,
}

#[derive(Debug, Deserialize)]
struct FrameChoices {
    status: i64,
    #[serde(default)]
    text: Vec<FrameText>,
}

#[derive(Debug, Deserialize)]
struct FrameText {
    content: String,
}

impl ChatClient {
    #[inline]
    pub fn new(endpoint: Url, credentials: ChatCredentials, config: &RewriteConfig) -> Self {
        Self {
            endpoint,
            credentials,
            domain: config.domain.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn connect(&self, url: &Url) -> Result<ChatSocket, RewriteError> {
        let host = url
            .host_str()
            .ok_or_else(|| RewriteError::Transport(format!("endpoint has no host: {url}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| RewriteError::Transport(format!("endpoint has no port: {url}")))?;
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(transport)?
            .next()
            .ok_or_else(|| RewriteError::Transport(format!("{host} did not resolve")))?;

        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(transport)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(transport)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(transport)?;

        let (socket, response) = tungstenite::client_tls(url.as_str(), stream).map_err(transport)?;
        debug!("Chat socket open (HTTP {})", response.status());
        Ok(socket)
    }

    fn request_body(&self, prompt: &str) -> Result<String, RewriteError> {
        let request = ChatRequest {
            header: RequestHeader {
                app_id: &self.credentials.app_id,
            },
            parameter: RequestParameter {
                chat: ChatParameters {
                    domain: &self.domain,
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                },
            },
            payload: RequestPayload {
                message: RequestMessage {
                    text: [ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                },
            },
        };

        serde_json::to_string(&request)
            .map_err(|e| RewriteError::Protocol(format!("failed to encode request: {e}")))
    }
}

impl ChatService for ChatClient {
    fn complete(&self, prompt: &str) -> Result<String, RewriteError> {
        let body = self.request_body(prompt)?;
        let url = auth::signed_url(&self.endpoint, &self.credentials, &auth::http_date_now())?;
        debug!("Opening chat socket to {}", self.endpoint);

        let mut socket = self.connect(&url)?;
        socket.send(Message::text(body)).map_err(transport)?;

        let mut reply = ReplyAssembler::default();
        loop {
            let message = match socket.read() {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break;
                }
                Err(e) => return Err(transport(e)),
            };

            let finished = match message {
                Message::Text(text) => reply.push(text.as_str())?,
                Message::Binary(data) => {
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| RewriteError::Protocol(e.to_string()))?;
                    reply.push(text)?
                }
                Message::Close(_) => break,
                _ => false,
            };
            if finished {
                // The reply is complete; a failed close handshake does not change it
                let _ = socket.close(None);
                break;
            }
        }

        reply.finish()
    }
}

fn transport(error: impl std::fmt::Display) -> RewriteError {
    RewriteError::Transport(error.to_string())
}

/// Collects reply text frame by frame
#[derive(Debug, Default)]
struct ReplyAssembler {
    text: String,
    finished: bool,
}

impl ReplyAssembler {
    /// Add one frame; returns true once the final frame has arrived
    fn push(&mut self, frame: &str) -> Result<bool, RewriteError> {
        if self.finished {
            return Ok(true);
        }

        let frame: ChatFrame =
            serde_json::from_str(frame).map_err(|e| RewriteError::Protocol(e.to_string()))?;
        if frame.header.code != 0 {
            return Err(RewriteError::Service {
                code: frame.header.code,
                message: frame.header.message,
            });
        }

        if let Some(payload) = frame.payload {
            for text in payload.choices.text {
                self.text.push_str(&text.content);
            }
            self.finished = payload.choices.status == FINAL_STATUS;
        }
        Ok(self.finished)
    }

    fn finish(self) -> Result<String, RewriteError> {
        if self.finished {
            Ok(self.text)
        } else {
            Err(RewriteError::Incomplete)
        }
    }
}

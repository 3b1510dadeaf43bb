//! ttrpc framing, server and client
//!
//! Each message is a 10 byte header (`length: u32 BE`, `stream_id: u32 BE`,
//! `type: u8`, `flags: u8`) followed by a protobuf `Request` or `Response`.
//! Clients use odd stream ids, increasing by two.

use super::error::{Result, StubError};
use super::mux::{LogicalConn, MuxSender};
use crate::proto::ttrpc::{code, Request, Response, Status};
use async_trait::async_trait;
use dashmap::DashMap;
use prost::Message;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const MESSAGE_HEADER_LEN: usize = 10;
pub const MESSAGE_LENGTH_MAX: usize = 4 << 20;
pub const MESSAGE_TYPE_REQUEST: u8 = 0x1;
pub const MESSAGE_TYPE_RESPONSE: u8 = 0x2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: u32,
    pub message_type: u8,
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MESSAGE_LENGTH_MAX {
            return Err(StubError::MessageTooLarge(self.payload.len()));
        }

        let mut buf = Vec::with_capacity(MESSAGE_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.stream_id.to_be_bytes());
        buf.push(self.message_type);
        buf.push(self.flags);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Read one frame; `None` when the stream ended between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
    let mut header = [0u8; MESSAGE_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let stream_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if length > MESSAGE_LENGTH_MAX {
        return Err(StubError::MessageTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        stream_id,
        message_type: header[8],
        flags: header[9],
        payload,
    }))
}

/// Build a successful response carrying `message`.
pub fn ok_response<M: Message>(message: &M) -> Response {
    Response {
        status: Some(Status {
            code: code::OK,
            message: String::new(),
        }),
        payload: message.encode_to_vec(),
    }
}

pub fn error_response(code: i32, message: impl Into<String>) -> Response {
    Response {
        status: Some(Status {
            code,
            message: message.into(),
        }),
        payload: Vec::new(),
    }
}

/// Decode `payload` as `Req`, run `handler`, and wrap the outcome in a response.
pub async fn unary<Req, Resp, F, Fut>(payload: &[u8], handler: F) -> Response
where
    Req: Message + Default,
    Resp: Message,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = anyhow::Result<Resp>>,
{
    let request = match Req::decode(payload) {
        Ok(request) => request,
        Err(e) => return error_response(code::INVALID_ARGUMENT, e.to_string()),
    };

    match handler(request).await {
        Ok(response) => ok_response(&response),
        Err(e) => error_response(code::INTERNAL, format!("{e:#}")),
    }
}

/// Client side of one logical connection.
pub struct Client {
    sender: MuxSender,
    next_stream_id: AtomicU32,
    pending: Arc<DashMap<u32, oneshot::Sender<Response>>>,
}

/// Delivers responses to waiting [`Client`] calls; must be driven alongside it.
pub struct ResponseReader {
    reader: DuplexStream,
    pending: Arc<DashMap<u32, oneshot::Sender<Response>>>,
}

impl Client {
    pub fn new(conn: LogicalConn) -> (Self, ResponseReader) {
        let pending = Arc::new(DashMap::new());
        let client = Self {
            sender: conn.sender,
            next_stream_id: AtomicU32::new(1),
            pending: pending.clone(),
        };
        (
            client,
            ResponseReader {
                reader: conn.reader,
                pending,
            },
        )
    }

    /// Unary call of `service/method`.
    pub async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let stream_id = self.next_stream_id.fetch_add(2, Ordering::Relaxed);
        let envelope = Request {
            service: service.to_string(),
            method: method.to_string(),
            payload: request.encode_to_vec(),
            timeout_nano: i64::try_from(timeout.as_nanos()).unwrap_or(i64::MAX),
            metadata: Vec::new(),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(stream_id, tx);

        let frame = Frame {
            stream_id,
            message_type: MESSAGE_TYPE_REQUEST,
            flags: 0,
            payload: envelope.encode_to_vec(),
        }
        .encode()?;

        if let Err(e) = self.sender.send(&frame).await {
            self.pending.remove(&stream_id);
            return Err(e);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(StubError::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&stream_id);
                return Err(StubError::Timeout(format!("{service}/{method}")));
            }
        };

        if let Some(status) = response.status.filter(|s| s.code != code::OK) {
            return Err(StubError::Status {
                method: format!("{service}/{method}"),
                code: status.code,
                message: status.message,
            });
        }

        Ok(Resp::decode(response.payload.as_slice())?)
    }
}

impl ResponseReader {
    /// Run until the connection closes; pending calls then fail with `ConnectionClosed`.
    pub async fn run(mut self) -> Result<()> {
        let result = loop {
            let frame = match read_frame(&mut self.reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            if frame.message_type != MESSAGE_TYPE_RESPONSE {
                break Err(StubError::UnexpectedMessageType(frame.message_type));
            }

            let response = match Response::decode(frame.payload.as_slice()) {
                Ok(response) => response,
                Err(e) => break Err(e.into()),
            };

            match self.pending.remove(&frame.stream_id) {
                Some((_, waiter)) => {
                    let _ = waiter.send(response);
                }
                None => debug!(stream_id = frame.stream_id, "Response for unknown stream"),
            }
        };

        self.pending.clear();
        result
    }
}

/// Handles one decoded request.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, request: Request) -> Response;
}

/// Server side of one logical connection.
pub struct Server<D> {
    conn: LogicalConn,
    dispatcher: Arc<D>,
}

impl<D: Dispatch> Server<D> {
    pub fn new(conn: LogicalConn, dispatcher: Arc<D>) -> Self {
        Self { conn, dispatcher }
    }

    /// Serve requests until the connection closes or a handler asks to stop.
    ///
    /// Requests are handled concurrently; a terminating request is handled
    /// inline so its reply is sent before returning. Handlers still running
    /// when this returns are aborted.
    pub async fn serve(self) -> Result<()> {
        let Server {
            conn: LogicalConn { mut reader, sender },
            dispatcher,
        } = self;
        let mut handlers = JoinSet::new();

        loop {
            while let Some(joined) = handlers.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "ttrpc handler failed");
                }
            }

            let Some(frame) = read_frame(&mut reader).await? else {
                return Ok(());
            };

            if frame.message_type != MESSAGE_TYPE_REQUEST {
                return Err(StubError::UnexpectedMessageType(frame.message_type));
            }

            let request = Request::decode(frame.payload.as_slice())?;
            let stream_id = frame.stream_id;

            if is_terminating(&request) {
                let response = dispatcher.dispatch(request).await;
                reply(&sender, stream_id, response).await?;
                return Ok(());
            }

            let dispatcher = dispatcher.clone();
            let sender = sender.clone();
            handlers.spawn(async move {
                let response = dispatcher.dispatch(request).await;
                if let Err(e) = reply(&sender, stream_id, response).await {
                    warn!(stream_id, error = %e, "Failed to send ttrpc response");
                }
            });
        }
    }
}

fn is_terminating(request: &Request) -> bool {
    request.method == "Shutdown"
}

async fn reply(sender: &MuxSender, stream_id: u32, response: Response) -> Result<()> {
    let frame = Frame {
        stream_id,
        message_type: MESSAGE_TYPE_RESPONSE,
        flags: 0,
        payload: response.encode_to_vec(),
    }
    .encode()?;
    sender.send(&frame).await
}

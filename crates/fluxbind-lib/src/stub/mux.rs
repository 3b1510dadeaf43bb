//! Connection multiplexing
//!
//! The runtime socket carries two logical connections, one per direction of
//! RPC. Every frame is `conn_id: u32 BE | length: u32 BE | payload`. Inbound
//! payloads are fed into a per-connection in-memory pipe so the ttrpc layer
//! can read each logical connection as a plain byte stream.

use super::error::{Result, StubError};
use super::ttrpc::{MESSAGE_HEADER_LEN, MESSAGE_LENGTH_MAX};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Logical connection on which the runtime calls the plugin.
pub const PLUGIN_SERVICE_CONN: u32 = 1;
/// Logical connection on which the plugin calls the runtime.
pub const RUNTIME_SERVICE_CONN: u32 = 2;

const HEADER_LEN: usize = 8;
/// A mux frame carries exactly one ttrpc message.
const FRAME_LENGTH_MAX: usize = MESSAGE_HEADER_LEN + MESSAGE_LENGTH_MAX;
const PIPE_CAPACITY: usize = 64 * 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of one logical connection. Clones share the socket.
#[derive(Clone)]
pub struct MuxSender {
    conn_id: u32,
    writer: Arc<Mutex<BoxedWriter>>,
}

impl MuxSender {
    /// Send `data` as a single frame.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(HEADER_LEN + data.len());
        frame.extend_from_slice(&self.conn_id.to_be_bytes());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(data);

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// One logical connection: a byte stream to read from and a frame sender.
pub struct LogicalConn {
    pub reader: DuplexStream,
    pub sender: MuxSender,
}

/// Reads frames off the socket and routes them to logical connections.
pub struct Demux<R> {
    reader: R,
    routes: HashMap<u32, DuplexStream>,
}

/// Split `stream` into the plugin-service and runtime-service connections.
///
/// The returned [`Demux`] must be driven for either connection to receive data.
pub fn open<S>(stream: S) -> (Demux<ReadHalf<S>>, LogicalConn, LogicalConn)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let writer: Arc<Mutex<BoxedWriter>> = Arc::new(Mutex::new(Box::new(writer)));

    let mut routes = HashMap::new();
    let mut conn = |conn_id: u32| {
        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        routes.insert(conn_id, far);
        LogicalConn {
            reader: near,
            sender: MuxSender {
                conn_id,
                writer: writer.clone(),
            },
        }
    };

    let plugin = conn(PLUGIN_SERVICE_CONN);
    let runtime = conn(RUNTIME_SERVICE_CONN);

    (Demux { reader, routes }, plugin, runtime)
}

impl<R: AsyncRead + Unpin> Demux<R> {
    /// Route frames until the socket closes.
    ///
    /// Dropping the routes on return signals end-of-stream to every logical
    /// connection.
    pub async fn run(mut self) -> Result<()> {
        let mut header = [0u8; HEADER_LEN];

        loop {
            match self.reader.read_exact(&mut header).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Runtime closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let conn_id = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
            if length > FRAME_LENGTH_MAX {
                return Err(StubError::MessageTooLarge(length));
            }

            let mut payload = vec![0u8; length];
            self.reader.read_exact(&mut payload).await?;

            match self.routes.get_mut(&conn_id) {
                Some(pipe) => pipe.write_all(&payload).await?,
                None => warn!(conn_id, length, "Dropping frame for unknown connection"),
            }
        }
    }
}

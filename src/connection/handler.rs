//! Connection Handler
//!
//! Services one client: buffers incoming bytes, decodes one request at a
//! time, executes it and writes the reply.
//!
//! ## Service Cycle
//!
//! ```text
//! 1. Client accepted (Server)
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  Decode one request?         │──── incomplete ───┐
//!    └───────────┬──────────────────┘                   │
//!                │ complete                             ▼
//!                ▼                         ┌──────────────────────────┐
//!    ┌──────────────────────────────┐      │ Await readable, read     │
//!    │ Execute, write reply, flush  │      │ into buffer (0 = close)  │
//!    └───────────┬──────────────────┘      └────────────┬─────────────┘
//!                │                                      │
//!                ▼                                      │
//!    ┌──────────────────────────────┐                   │
//!    │ Yield to other connections   │                   │
//!    └───────────┬──────────────────┘                   │
//!                └──────────────[Loop back]─────────────┘
//!        │
//!        ▼
//! 3. Peer closed / protocol error / I/O error -> handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream, so a read may hold part of a request or several
//! pipelined ones. Bytes stay in a `BytesMut` until a whole request has
//! arrived; malformed input closes the connection instead.

use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use std::cell::Cell;
use std::net::SocketAddr;
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
///
/// Lives on the server thread, so plain `Cell`s are enough.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: Cell<u64>,
    /// Currently active connections
    pub active_connections: Cell<u64>,
    /// Total commands processed
    pub commands_processed: Cell<u64>,
    /// Total bytes read
    pub bytes_read: Cell<u64>,
    /// Total bytes written
    pub bytes_written: Cell<u64>,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        bump(&self.connections_accepted, 1);
        bump(&self.active_connections, 1);
    }

    pub fn connection_closed(&self) {
        let active = &self.active_connections;
        active.set(active.get().saturating_sub(1));
    }

    pub fn command_processed(&self) {
        bump(&self.commands_processed, 1);
    }

    pub fn bytes_read(&self, count: usize) {
        bump(&self.bytes_read, count as u64);
    }

    pub fn bytes_written(&self, count: usize) {
        bump(&self.bytes_written, count as u64);
    }
}

fn bump(counter: &Cell<u64>, by: u64) {
    counter.set(counter.get().saturating_add(by));
}

/// Handles a single client connection.
///
/// Generic over the stream so the service cycle can run against a
/// `TcpStream` or an in-memory mock.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Client's address (for logging)
    peer: SocketAddr,

    /// Bytes received but not yet decoded
    buffer: BytesMut,

    command_handler: CommandHandler,

    parser: RespParser,

    stats: Rc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        command_handler: CommandHandler,
        stats: Rc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            peer,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Runs the service cycle until the peer goes away or misbehaves.
    ///
    /// An orderly close by the peer is `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let result = match self.main_loop().await {
            Err(ConnectionError::ClientDisconnected) => Ok(()),
            other => other,
        };

        match &result {
            Ok(()) => info!(client = %self.peer, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.peer, "Connection reset by client")
            }
            Err(e) if matches!(e, ConnectionError::ParseError(_)) => {
                warn!(client = %self.peer, error = %e, "Protocol error, closing connection")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        debug!(
            accepted = self.stats.connections_accepted.get(),
            active = self.stats.active_connections.get(),
            commands = self.stats.commands_processed.get(),
            bytes_read = self.stats.bytes_read.get(),
            bytes_written = self.stats.bytes_written.get(),
            "Connection stats"
        );
        result
    }

    /// One request per turn, then give the other connections a chance.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            match self.try_parse_request()? {
                Some(request) => {
                    let response = self.command_handler.execute(&request);
                    self.stats.command_processed();
                    self.send_response(&response).await?;
                    tokio::task::yield_now().await;
                }
                None => self.read_more_data().await?,
            }
        }
    }

    /// Decodes one request from the front of the buffer, if complete.
    fn try_parse_request(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse_request(&self.buffer)? {
            Some((request, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.peer,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(request))
            }
            None => {
                trace!(
                    client = %self.peer,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Waits until the socket is readable and appends what arrived.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.peer, bytes = n, "Read data");

        Ok(())
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.peer, bytes = bytes.len(), "Sent response");
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed RESP input
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed the connection between requests
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client closed the connection in the middle of a request
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Runs a [`ConnectionHandler`] to completion. Errors have already been
/// logged by the handler.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    command_handler: CommandHandler,
    stats: Rc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, peer, command_handler, stats);
    let _ = handler.run().await;
}

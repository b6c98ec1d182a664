//! Event Loop
//!
//! Accepts clients and services them all from one thread. The tokio reactor
//! is the readiness multiplexer: every accepted socket becomes a local task
//! that only runs once its socket is ready, and the key space is never
//! touched by two tasks at once because only one task runs at a time.
//!
//! [`Server::run`] must be driven inside a [`tokio::task::LocalSet`].

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Pause after a failed accept, so a persistent error such as `EMFILE`
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listener plus everything needed to service its clients.
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
    stats: Rc<ConnectionStats>,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs, handler: CommandHandler) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            handler,
            stats: Rc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Rc<ConnectionStats> {
        Rc::clone(&self.stats)
    }

    /// Serves clients until `shutdown` resolves.
    ///
    /// Open connections are dropped, not drained, when this returns.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut connections = JoinSet::new();

        tokio::select! {
            _ = self.accept_loop(&mut connections) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        if !connections.is_empty() {
            debug!(open = connections.len(), "Dropping open connections");
        }
        connections.shutdown().await;
    }

    async fn accept_loop(&self, connections: &mut JoinSet<()>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(client = %addr, "Accepted connection");
                    let handler = self.handler.clone();
                    let stats = Rc::clone(&self.stats);
                    connections.spawn_local(handle_connection(stream, addr, handler, stats));
                }
                Err(e) => accept_failed(&e).await,
            }

            while connections.try_join_next().is_some() {}
        }
    }
}

async fn accept_failed(e: &io::Error) {
    error!(error = %e, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Keyspace, SharedKeyspace, SnapshotStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

    struct TestServer {
        addr: SocketAddr,
        keyspace: SharedKeyspace,
        stats: Rc<ConnectionStats>,
        shutdown: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<()>,
        _dir: tempfile::TempDir,
    }

    async fn start_server() -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let keyspace = Keyspace::new().into_shared();
        let handler = CommandHandler::new(
            keyspace.clone(),
            SnapshotStore::new(dir.path().join("dump.rkv")),
        );
        let server = Server::bind("127.0.0.1:0", handler).await.unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();
        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::task::spawn_local(server.run(async {
            let _ = rx.await;
        }));

        TestServer {
            addr,
            keyspace,
            stats,
            shutdown,
            task,
            _dir: dir,
        }
    }

    async fn expect_reply(client: &mut TcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(REPLY_TIMEOUT, client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        assert_eq!(buf, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let start = tokio::time::Instant::now();
        accept_failed(&io::Error::from_raw_os_error(24)).await;
        assert!(start.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn test_set_get_over_tcp() {
        LocalSet::new()
            .run_until(async {
                let server = start_server().await;
                let mut client = TcpStream::connect(server.addr).await.unwrap();

                client
                    .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
                    .await
                    .unwrap();
                expect_reply(&mut client, b"$2\r\nOK\r\n").await;

                client
                    .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
                    .await
                    .unwrap();
                expect_reply(&mut client, b"$4\r\nAriz\r\n").await;

                assert!(server.keyspace.borrow_mut().contains_live(b"name"));
                assert_eq!(server.stats.commands_processed.get(), 2);
            })
            .await;
    }

    #[tokio::test]
    async fn test_idle_client_does_not_block_others() {
        LocalSet::new()
            .run_until(async {
                let server = start_server().await;

                // Half a request, then silence.
                let mut stalled = TcpStream::connect(server.addr).await.unwrap();
                stalled.write_all(b"*2\r\n$3\r\nGET").await.unwrap();

                let mut other = TcpStream::connect(server.addr).await.unwrap();
                other.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
                expect_reply(&mut other, b"$4\r\nPONG\r\n").await;

                stalled.write_all(b"\r\n$1\r\nk\r\n").await.unwrap();
                expect_reply(&mut stalled, b"$-1\r\n").await;
            })
            .await;
    }

    #[tokio::test]
    async fn test_pipelining_client_does_not_starve_others() {
        LocalSet::new()
            .run_until(async {
                let server = start_server().await;

                let mut busy = TcpStream::connect(server.addr).await.unwrap();
                let burst = b"*1\r\n$4\r\nPING\r\n".repeat(500);
                busy.write_all(&burst).await.unwrap();

                let mut other = TcpStream::connect(server.addr).await.unwrap();
                other.write_all(b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n").await.unwrap();
                expect_reply(&mut other, b"$2\r\nhi\r\n").await;

                expect_reply(&mut busy, &b"$4\r\nPONG\r\n".repeat(500)).await;
            })
            .await;
    }

    #[tokio::test]
    async fn test_protocol_error_closes_only_that_connection() {
        LocalSet::new()
            .run_until(async {
                let server = start_server().await;

                let mut good = TcpStream::connect(server.addr).await.unwrap();
                let mut bad = TcpStream::connect(server.addr).await.unwrap();
                bad.write_all(b"?garbage\r\n").await.unwrap();

                let mut buf = [0u8; 16];
                let n = tokio::time::timeout(REPLY_TIMEOUT, bad.read(&mut buf))
                    .await
                    .expect("timed out waiting for close")
                    .unwrap_or(0);
                assert_eq!(n, 0);

                good.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
                expect_reply(&mut good, b"$4\r\nPONG\r\n").await;
            })
            .await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_server() {
        LocalSet::new()
            .run_until(async {
                let server = start_server().await;
                let _client = TcpStream::connect(server.addr).await.unwrap();

                server.shutdown.send(()).unwrap();
                tokio::time::timeout(REPLY_TIMEOUT, server.task)
                    .await
                    .expect("server did not stop")
                    .unwrap();
            })
            .await;
    }
}

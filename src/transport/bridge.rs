//! Tokio bridge between byte streams and a service's queues.
//!
//! Each attached stream becomes one session. A reader task pushes incoming
//! chunks as data blocks, bracketed by `SessionOpened` and `SessionClosed`.
//! A router task drains the service's outbound queue and forwards each
//! encoded block to the writer task of the session it belongs to.

use crate::core::block::{BlockKind, SessionId};
use crate::error::{Error, Result};
use crate::service::ServiceHandle;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};
use tracing::{debug, info, instrument, trace, warn};

/// Default interval between outbound queue polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Writers = Arc<Mutex<HashMap<SessionId, mpsc::UnboundedSender<Bytes>>>>;

/// Connects tokio byte streams to one service. Use one bridge per service so
/// session ids stay unique.
#[derive(Clone)]
pub struct TransportBridge {
    handle: ServiceHandle,
    writers: Writers,
    next_session: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl TransportBridge {
    pub fn new(handle: ServiceHandle) -> Self {
        Self {
            handle,
            writers: Arc::new(Mutex::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(1)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_micros(100));
        self
    }

    pub fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    /// Number of sessions with a live writer.
    pub fn session_count(&self) -> usize {
        self.writers().len()
    }

    fn writers(&self) -> MutexGuard<'_, HashMap<SessionId, mpsc::UnboundedSender<Bytes>>> {
        lock(&self.writers)
    }

    /// Attach a stream as a new session and spawn its reader and writer
    /// tasks on the current tokio runtime.
    pub fn attach<S>(&self, io: S) -> Result<SessionId>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        self.handle.open_session(session)?;

        let (reader, writer) = tokio::io::split(io);
        let (tx, rx) = mpsc::unbounded_channel();
        self.writers().insert(session, tx);

        runtime.spawn(write_loop(session, writer, rx));
        runtime.spawn(read_loop(
            session,
            reader,
            self.handle.clone(),
            Arc::clone(&self.writers),
        ));
        debug!(service = %self.handle.name(), %session, "Attached stream");
        Ok(session)
    }

    /// Forward every block currently in the outbound queue. Returns how many
    /// blocks were taken.
    pub fn route_pending(&self) -> usize {
        let mut routed = 0;
        while let Some(block) = self.handle.try_pop_outbound() {
            routed += 1;
            let session = block.session();
            match block.kind() {
                BlockKind::Data => match self.writers().get(&session) {
                    Some(tx) => {
                        if tx.send(block.into_payload()).is_err() {
                            trace!(%session, "Writer gone; dropping outbound block");
                        }
                    }
                    None => trace!(%session, "No writer for session; dropping outbound block"),
                },
                BlockKind::SessionClosed => {
                    // Dropping the sender ends the writer task, which shuts
                    // down the write half.
                    if self.writers().remove(&session).is_some() {
                        debug!(%session, "Closing session at service request");
                    }
                }
                BlockKind::SessionOpened | BlockKind::Sampler => {}
            }
        }
        routed
    }

    /// Poll the outbound queue until the service has stopped and the queue
    /// is empty, then close every writer.
    pub async fn route(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.route_pending() == 0 && self.handle.is_stopped() {
                break;
            }
        }
        self.writers().clear();
        debug!(service = %self.handle.name(), "Router finished");
    }

    pub fn spawn_router(&self) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        let bridge = self.clone();
        Ok(runtime.spawn(async move { bridge.route().await }))
    }

    /// Accept TCP connections and attach each one until `shutdown` fires.
    #[instrument(skip(self, listener, shutdown), fields(service = %self.handle.name()))]
    pub async fn serve(&self, listener: TcpListener, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "Accepting connections");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down listener");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        match self.attach(stream) {
                            Ok(session) => info!(%peer, %session, "Accepted connection"),
                            Err(e) => warn!(%peer, error = %e, "Rejected connection"),
                        }
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }
    }
}

fn lock(writers: &Writers) -> MutexGuard<'_, HashMap<SessionId, mpsc::UnboundedSender<Bytes>>> {
    writers.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_loop<R>(session: SessionId, reader: R, handle: ServiceHandle, writers: Writers)
where
    R: AsyncRead + Unpin,
{
    let mut chunks = FramedRead::new(reader, BytesCodec::new());
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(bytes) => {
                if let Err(e) = handle.push_data(session, bytes.freeze()) {
                    debug!(%session, error = %e, "Service no longer accepting input");
                    break;
                }
            }
            Err(e) => {
                warn!(%session, error = %e, "Read failed");
                break;
            }
        }
    }

    lock(&writers).remove(&session);
    let _ = handle.close_session(session);
    debug!(%session, "Peer disconnected");
}

async fn write_loop<W>(session: SessionId, writer: W, mut rx: mpsc::UnboundedReceiver<Bytes>)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, BytesCodec::new());
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = sink.send(bytes).await {
            warn!(%session, error = %e, "Write failed");
            break;
        }
    }
    if let Err(e) = SinkExt::<Bytes>::close(&mut sink).await {
        trace!(%session, error = %e, "Shutdown of write half failed");
    }
}

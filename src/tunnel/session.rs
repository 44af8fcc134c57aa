//! Session: one physical connection shared by many streams
//!
//! Owns the routing table (stream id → stream), the obfuscator and the write
//! half of the connection. Streams reach back into the session only through
//! [`SessionLink`].

use super::{Frame, SessionLink, Stream, TunnelError};
use crate::config::MuxConfig;
use crate::obfuscation::{read_record, Obfuscator};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Which end of the connection this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Opens odd stream ids
    Client,
    /// Opens even stream ids
    Server,
}

impl SessionRole {
    fn first_stream_id(self) -> u32 {
        match self {
            SessionRole::Client => 1,
            SessionRole::Server => 2,
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How long [`Session::close`] waits for the writer to shut down
pub const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A multiplexing session over one connection
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    role: SessionRole,
    config: MuxConfig,
    obfuscator: Box<dyn Obfuscator>,
    writer: tokio::sync::Mutex<BoxedWriter>,
    addrs: OnceLock<(SocketAddr, SocketAddr)>,
    /// Routing table; never held across an await
    streams: Mutex<HashMap<u32, Stream>>,
    next_stream_id: AtomicU32,
    accept_tx: mpsc::UnboundedSender<Stream>,
    accept_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Stream>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Session {
    /// Create a session that writes records to `writer`.
    ///
    /// Inbound records are fed with [`run_inbound`](Session::run_inbound) or
    /// [`recv_record`](Session::recv_record).
    pub fn new<O, W>(role: SessionRole, config: MuxConfig, obfuscator: O, writer: W) -> Self
    where
        O: Obfuscator + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(SessionInner {
                role,
                config,
                obfuscator: Box::new(obfuscator),
                writer: tokio::sync::Mutex::new(Box::new(writer)),
                addrs: OnceLock::new(),
                streams: Mutex::new(HashMap::new()),
                next_stream_id: AtomicU32::new(role.first_stream_id()),
                accept_tx,
                accept_rx: tokio::sync::Mutex::new(accept_rx),
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Record the connection's endpoints. Only the first call has effect.
    pub fn set_addrs(&self, local: SocketAddr, remote: SocketAddr) {
        let _ = self.inner.addrs.set((local, remote));
    }

    /// Get session role
    pub fn role(&self) -> SessionRole {
        self.inner.role
    }

    /// Check if the session has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get number of live streams
    pub fn stream_count(&self) -> usize {
        self.inner.streams().len()
    }

    fn link(&self) -> Arc<dyn SessionLink> {
        self.inner.clone()
    }

    /// Open a new locally initiated stream.
    ///
    /// The peer learns about it from the stream's first frame.
    pub fn open_stream(&self) -> Result<Stream, TunnelError> {
        // Checked under the table lock so close cannot miss the new stream
        let mut streams = self.inner.streams();
        if self.is_closed() {
            return Err(TunnelError::SessionClosed);
        }
        if streams.len() >= self.inner.config.max_streams {
            return Err(TunnelError::TooManyStreams);
        }

        let id = loop {
            let id = self.inner.next_stream_id.fetch_add(2, Ordering::Relaxed);
            if id != 0 && !streams.contains_key(&id) {
                break id;
            }
        };

        let stream = Stream::new(id, self.link(), &self.inner.config);
        streams.insert(id, stream.clone());
        debug!(stream_id = id, "opened stream");
        Ok(stream)
    }

    /// Wait for a stream opened by the peer.
    ///
    /// Returns `None` once the session is closed.
    pub async fn accept(&self) -> Option<Stream> {
        let mut incoming = self.inner.accept_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => None,
            stream = incoming.recv() => stream,
        }
    }

    /// Route a deobfuscated frame to its stream.
    ///
    /// The first frame for an unseen id creates the stream and queues it for
    /// [`accept`](Session::accept). A closing frame for an unknown id is
    /// ignored.
    pub async fn deliver_frame(&self, frame: Frame) -> Result<(), TunnelError> {
        if frame.stream_id == 0 {
            return Err(TunnelError::InvalidFrame("stream id 0".to_string()));
        }

        let stream = {
            let mut streams = self.inner.streams();
            if self.is_closed() {
                return Err(TunnelError::SessionClosed);
            }
            match streams.get(&frame.stream_id) {
                Some(stream) => stream.clone(),
                None => {
                    if frame.closing {
                        trace!(
                            stream_id = frame.stream_id,
                            "ignoring closing frame for unknown stream"
                        );
                        return Ok(());
                    }
                    if streams.len() >= self.inner.config.max_streams {
                        return Err(TunnelError::TooManyStreams);
                    }

                    let stream = Stream::new(frame.stream_id, self.link(), &self.inner.config);
                    streams.insert(frame.stream_id, stream.clone());
                    let _ = self.inner.accept_tx.send(stream.clone());
                    debug!(stream_id = frame.stream_id, "peer opened stream");
                    stream
                }
            }
        };

        stream.deliver_frame(frame).await;
        Ok(())
    }

    /// Deobfuscate one complete record and route its frame
    pub async fn recv_record(&self, record: &[u8]) -> Result<(), TunnelError> {
        let frame = self.inner.obfuscator.deobfuscate(record)?;
        self.deliver_frame(frame).await
    }

    /// Read records from `reader` until EOF, a transport error or session
    /// close, then close the session.
    ///
    /// Records that fail to decode are logged and skipped.
    pub async fn run_inbound<R>(&self, mut reader: R) -> Result<(), TunnelError>
    where
        R: AsyncRead + Unpin,
    {
        let result = loop {
            let record = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => break Ok(()),
                record = read_record(&mut reader) => record,
            };

            match record {
                Ok(Some(record)) => match self.recv_record(&record).await {
                    Ok(()) => {}
                    Err(TunnelError::SessionClosed) => break Ok(()),
                    Err(e) => warn!("Dropping inbound record: {}", e),
                },
                Ok(None) => {
                    debug!("connection reached EOF");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.close().await;
        result
    }

    /// Close the session and every stream in it. Idempotent.
    ///
    /// Peers are not notified per stream; they see the connection go away.
    /// Streams keep the session alive, so a session is only released once
    /// this has run. The writer gets [`WRITER_SHUTDOWN_TIMEOUT`] to shut
    /// down; a send stuck on a stalled peer does not hold close up longer.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let closed_streams = {
            let mut streams = self.inner.streams();
            for stream in streams.values() {
                stream.close_teardown_only();
            }
            let count = streams.len();
            streams.clear();
            count
        };

        self.inner.shutdown.cancel();

        // Streams nobody accepted still point back at the session
        {
            let mut incoming = self.inner.accept_rx.lock().await;
            while let Ok(stream) = incoming.try_recv() {
                stream.close_teardown_only();
            }
        }

        let writer_shutdown = async { self.inner.writer.lock().await.shutdown().await };
        match tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, writer_shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("writer shutdown failed: {}", e),
            Err(_) => warn!("writer shutdown timed out"),
        }

        info!(role = ?self.inner.role, streams = closed_streams, "session closed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.inner.role)
            .field("streams", &self.stream_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionInner {
    fn streams(&self) -> MutexGuard<'_, HashMap<u32, Stream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionLink for SessionInner {
    fn obfuscate(&self, frame: &Frame) -> Result<Bytes, TunnelError> {
        Ok(self.obfuscator.obfuscate(frame)?)
    }

    async fn send_physical(&self, wire: Bytes) -> Result<usize, TunnelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TunnelError::SessionClosed);
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(&wire).await?;
        writer.flush().await?;
        Ok(wire.len())
    }

    fn remove_stream(&self, stream_id: u32) {
        if self.streams().remove(&stream_id).is_some() {
            trace!(stream_id, "removed stream from routing table");
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.addrs.get().map(|(local, _)| *local)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.addrs.get().map(|(_, remote)| *remote)
    }
}

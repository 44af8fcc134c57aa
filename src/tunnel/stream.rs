//! Multiplexed stream implementation

use super::{BufferedPipe, Frame, FrameSorter, SortOutcome, TunnelError, MAX_PAYLOAD_SIZE};
use crate::config::MuxConfig;
use crate::obfuscation::ClosePadding;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// What a stream needs from the session that owns the connection
#[async_trait]
pub trait SessionLink: Send + Sync {
    /// Turn a frame into wire bytes
    fn obfuscate(&self, frame: &Frame) -> Result<Bytes, TunnelError>;

    /// Write wire bytes to the physical connection
    async fn send_physical(&self, wire: Bytes) -> Result<usize, TunnelError>;

    /// Drop the routing entry for `stream_id`.
    ///
    /// Called at most once per stream, never while the routing table lock
    /// is held by the caller.
    fn remove_stream(&self, stream_id: u32);

    /// Local address of the physical connection
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Remote address of the physical connection
    fn remote_addr(&self) -> Option<SocketAddr>;
}

type WriteFuture = Pin<Box<dyn Future<Output = Result<usize, TunnelError>> + Send>>;
type CloseFuture = Pin<Box<dyn Future<Output = Result<(), TunnelError>> + Send>>;

/// A reliable, ordered byte stream multiplexed over a session.
///
/// Handles are cheap to clone; every clone refers to the same stream. A
/// handle is also an `AsyncRead + AsyncWrite`, where shutting down the write
/// side closes the stream.
pub struct Stream {
    inner: Arc<StreamInner>,
    /// `AsyncWrite` operations in flight on this handle
    pending: Mutex<PendingIo>,
}

#[derive(Default)]
struct PendingIo {
    write: Option<WriteFuture>,
    close: Option<CloseFuture>,
}

struct StreamInner {
    id: u32,
    session: Arc<dyn SessionLink>,
    /// Sequence number of the next outbound frame
    next_send_seq: AtomicU32,
    closed: AtomicBool,
    /// Shared by writers, exclusive for close
    write_lock: RwLock<()>,
    pipe: Arc<BufferedPipe>,
    frame_tx: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    padding: ClosePadding,
}

impl Stream {
    /// Create a stream and start its reassembly worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(id: u32, session: Arc<dyn SessionLink>, config: &MuxConfig) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(config.inbound_queue_capacity.max(1));
        let pipe = Arc::new(BufferedPipe::new());
        let shutdown = CancellationToken::new();

        let inner = Arc::new(StreamInner {
            id,
            session,
            next_send_seq: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            write_lock: RwLock::new(()),
            pipe: pipe.clone(),
            frame_tx,
            shutdown: shutdown.clone(),
            padding: ClosePadding::from(config),
        });

        tokio::spawn(reassemble(
            FrameSorter::new(pipe),
            frame_rx,
            shutdown,
            Arc::downgrade(&inner),
        ));

        Self::from_inner(inner)
    }

    fn from_inner(inner: Arc<StreamInner>) -> Self {
        Self {
            inner,
            pending: Mutex::new(PendingIo::default()),
        }
    }

    /// Get stream ID
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Check if the stream has been closed (locally, remotely or by teardown)
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Local address of the underlying connection
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.session.local_addr()
    }

    /// Remote address of the underlying connection
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.session.remote_addr()
    }

    /// Read reassembled bytes.
    ///
    /// An empty `buf` checks liveness: `Ok(0)` while open, `BrokenStream`
    /// once closed. Otherwise waits for data and fails with `BrokenStream`
    /// when the stream is closed and everything buffered has been read.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, TunnelError> {
        if buf.is_empty() {
            if self.is_closed() {
                return Err(TunnelError::BrokenStream);
            }
            return Ok(0);
        }

        match self.inner.pipe.read(buf).await {
            0 => Err(TunnelError::BrokenStream),
            n => Ok(n),
        }
    }

    /// Frame `data` and hand it to the session for sending.
    ///
    /// Returns once the frames are on their way; remote receipt is the
    /// transport's business. Inputs larger than one frame are split into
    /// consecutive frames. If sending fails after some frames went out, the
    /// count of bytes already sent is returned instead of the error.
    pub async fn write(&self, data: &[u8]) -> Result<usize, TunnelError> {
        self.inner.write(data).await
    }

    /// Close the stream and tell the peer.
    ///
    /// Waits for in-flight writes, sends a padded closing frame, then tears
    /// the stream down. Teardown happens even when the closing frame cannot
    /// be sent; the send error is returned afterwards.
    pub async fn close(&self) -> Result<(), TunnelError> {
        self.inner.close().await
    }

    /// Close locally after the peer's closing frame. Sends nothing.
    pub fn passive_close(&self) {
        self.inner.passive_close();
    }

    /// Release local resources without touching the session's routing table.
    ///
    /// Only for session teardown, where the caller holds the table lock.
    pub fn close_teardown_only(&self) {
        self.inner.teardown();
    }

    /// Queue an inbound frame for reassembly.
    ///
    /// Waits while the reassembly queue is full. Frames for a stream whose
    /// worker has stopped are dropped.
    pub async fn deliver_frame(&self, frame: Frame) {
        if let Err(mpsc::error::SendError(frame)) = self.inner.frame_tx.send(frame).await {
            trace!(
                stream_id = frame.stream_id,
                seq = frame.seq,
                "dropping frame for finished stream"
            );
        }
    }

    #[cfg(test)]
    fn worker_stopped(&self) -> bool {
        self.inner.frame_tx.is_closed()
    }
}

impl Clone for Stream {
    fn clone(&self) -> Self {
        Self::from_inner(self.inner.clone())
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let n = ready!(self.inner.pipe.poll_read(cx, buf.initialize_unfilled()));
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let pending = this.pending.get_mut().unwrap_or_else(PoisonError::into_inner);

        // A pending write belongs to the buffer the caller retries with
        let write = pending.write.get_or_insert_with(|| {
            let inner = this.inner.clone();
            let data = Bytes::copy_from_slice(buf);
            let future: WriteFuture = Box::pin(async move { inner.write(&data).await });
            future
        });
        let result = ready!(write.as_mut().poll(cx));
        pending.write = None;
        Poll::Ready(result.map_err(io::Error::from))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Frames are handed to the session before poll_write completes
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let pending = this.pending.get_mut().unwrap_or_else(PoisonError::into_inner);

        let close = pending.close.get_or_insert_with(|| {
            let inner = this.inner.clone();
            let future: CloseFuture = Box::pin(async move { inner.close().await });
            future
        });
        let result = ready!(close.as_mut().poll(cx));
        pending.close = None;
        match result {
            Ok(()) | Err(TunnelError::AlreadyClosed) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(e.into())),
        }
    }
}

impl StreamInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_seq(&self) -> u32 {
        self.next_send_seq.fetch_add(1, Ordering::AcqRel)
    }

    async fn write(&self, data: &[u8]) -> Result<usize, TunnelError> {
        let _writing = self.write_lock.read().await;
        if self.is_closed() {
            return Err(TunnelError::BrokenStream);
        }

        let mut sent = 0;
        for chunk in data.chunks(MAX_PAYLOAD_SIZE) {
            let frame = Frame::data(self.id, self.next_seq(), Bytes::copy_from_slice(chunk));
            if let Err(e) = self.send_frame(&frame).await {
                if sent == 0 {
                    return Err(e);
                }
                debug!(stream_id = self.id, sent, "write cut short: {}", e);
                break;
            }
            sent += chunk.len();
        }

        Ok(sent)
    }

    async fn close(&self) -> Result<(), TunnelError> {
        let _closing = self.write_lock.write().await;
        if self.is_closed() {
            return Err(TunnelError::AlreadyClosed);
        }

        let teardown = CloseGuard { stream: self };

        let frame = Frame::closing(self.id, self.next_seq(), self.padding.generate());
        trace!(
            stream_id = self.id,
            seq = frame.seq,
            padding = frame.payload.len(),
            "sending closing frame"
        );
        let sent = self.send_frame(&frame).await;

        drop(teardown);
        debug!(stream_id = self.id, "stream closed locally");
        sent.map(|_| ())
    }

    async fn send_frame(&self, frame: &Frame) -> Result<usize, TunnelError> {
        let wire = self.session.obfuscate(frame)?;
        self.session.send_physical(wire).await
    }

    /// Mark closed, stop the worker, close the pipe. Returns false if another
    /// path already did.
    fn teardown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        self.pipe.close();
        true
    }

    fn passive_close(&self) {
        if self.teardown() {
            self.session.remove_stream(self.id);
            debug!(stream_id = self.id, "stream closed");
        }
    }
}

/// Runs teardown and routing removal when `close` leaves, however it leaves
struct CloseGuard<'a> {
    stream: &'a StreamInner,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.stream.passive_close();
    }
}

/// Reassembly worker: one per stream, sole owner of the sorter
async fn reassemble(
    mut sorter: FrameSorter,
    mut frames: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
    stream: Weak<StreamInner>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if sorter.push(frame) == SortOutcome::Finished {
            if let Some(stream) = stream.upgrade() {
                stream.passive_close();
            }
            break;
        }
    }

    trace!(
        next_recv_seq = sorter.next_recv_seq(),
        pending = sorter.pending_len(),
        "reassembly worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::{Obfuscator, RecordObfuscator};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLink {
        sent: Mutex<Vec<Frame>>,
        removed: Mutex<Vec<u32>>,
        fail_sends: AtomicBool,
        /// Fail every send once this many frames were sent
        fail_after: Mutex<Option<usize>>,
    }

    impl RecordingLink {
        fn sent(&self) -> Vec<Frame> {
            self.sent.lock().unwrap().clone()
        }

        fn removed(&self) -> Vec<u32> {
            self.removed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionLink for RecordingLink {
        fn obfuscate(&self, frame: &Frame) -> Result<Bytes, TunnelError> {
            Ok(RecordObfuscator::new().obfuscate(frame)?)
        }

        async fn send_physical(&self, wire: Bytes) -> Result<usize, TunnelError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
            }
            let frame = RecordObfuscator::new().deobfuscate(&wire)?;
            let mut sent = self.sent.lock().unwrap();
            if let Some(limit) = *self.fail_after.lock().unwrap() {
                if sent.len() >= limit {
                    return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
                }
            }
            sent.push(frame);
            Ok(wire.len())
        }

        fn remove_stream(&self, stream_id: u32) {
            self.removed.lock().unwrap().push(stream_id);
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            "127.0.0.1:1000".parse().ok()
        }

        fn remote_addr(&self) -> Option<SocketAddr> {
            "127.0.0.1:2000".parse().ok()
        }
    }

    fn new_stream(id: u32) -> (Stream, Arc<RecordingLink>) {
        let link = Arc::new(RecordingLink::default());
        let stream = Stream::new(id, link.clone(), &MuxConfig::default());
        (stream, link)
    }

    async fn wait_worker_stopped(stream: &Stream) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !stream.worker_stopped() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("reassembly worker still running");
    }

    async fn wait_closed(stream: &Stream) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !stream.is_closed() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("stream did not close");
    }

    #[tokio::test]
    async fn test_write_assigns_sequence_numbers() {
        let (stream, link) = new_stream(3);

        assert_eq!(stream.write(b"one").await.unwrap(), 3);
        assert_eq!(stream.write(b"two!").await.unwrap(), 4);

        let sent = link.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].stream_id, sent[0].seq, sent[0].closing), (3, 0, false));
        assert_eq!((sent[1].stream_id, sent[1].seq, sent[1].closing), (3, 1, false));
        assert_eq!(&sent[1].payload[..], b"two!");
    }

    #[tokio::test]
    async fn test_large_write_is_split() {
        let (stream, link) = new_stream(1);
        let data = vec![7u8; MAX_PAYLOAD_SIZE * 2 + 10];

        assert_eq!(stream.write(&data).await.unwrap(), data.len());

        let sent = link.sent();
        let lens: Vec<usize> = sent.iter().map(|f| f.payload.len()).collect();
        assert_eq!(lens, vec![MAX_PAYLOAD_SIZE, MAX_PAYLOAD_SIZE, 10]);
        let seqs: Vec<u32> = sent.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_write_after_close_fails_without_sending() {
        let (stream, link) = new_stream(1);
        stream.write(b"data").await.unwrap();
        stream.close().await.unwrap();
        let sent_before = link.sent().len();

        for _ in 0..3 {
            assert!(matches!(
                stream.write(b"more").await,
                Err(TunnelError::BrokenStream)
            ));
        }
        assert_eq!(link.sent().len(), sent_before);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (stream, link) = new_stream(9);

        stream.close().await.unwrap();
        assert!(matches!(stream.close().await, Err(TunnelError::AlreadyClosed)));
        stream.passive_close();
        stream.close_teardown_only();

        assert_eq!(link.removed(), vec![9]);
        assert_eq!(link.sent().iter().filter(|f| f.closing).count(), 1);
    }

    #[tokio::test]
    async fn test_closing_frame_is_padded_and_sequenced() {
        let (stream, link) = new_stream(4);
        stream.write(b"a").await.unwrap();
        stream.write(b"b").await.unwrap();
        stream.close().await.unwrap();

        let sent = link.sent();
        let close = sent.last().unwrap();
        assert!(close.closing);
        assert_eq!(close.seq, 2);
        assert!((300..500).contains(&close.payload.len()));
    }

    #[tokio::test]
    async fn test_zero_length_read_checks_liveness() {
        let (stream, _link) = new_stream(1);
        assert_eq!(stream.read(&mut []).await.unwrap(), 0);

        stream.close().await.unwrap();
        assert!(matches!(
            stream.read(&mut []).await,
            Err(TunnelError::BrokenStream)
        ));
    }

    #[tokio::test]
    async fn test_failed_close_still_tears_down() {
        let (stream, link) = new_stream(6);
        link.fail_sends.store(true, Ordering::SeqCst);

        assert!(matches!(stream.close().await, Err(TunnelError::Io(_))));
        assert!(stream.is_closed());
        assert_eq!(link.removed(), vec![6]);
        assert!(matches!(stream.close().await, Err(TunnelError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_inbound_frames_reassembled_until_close() {
        let (stream, link) = new_stream(2);

        stream
            .deliver_frame(Frame::closing(2, 2, Bytes::from(vec![0u8; 400])))
            .await;
        stream
            .deliver_frame(Frame::data(2, 1, Bytes::from_static(b"world")))
            .await;
        stream
            .deliver_frame(Frame::data(2, 0, Bytes::from_static(b"hello ")))
            .await;

        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            match stream.read(&mut buf).await {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(TunnelError::BrokenStream) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(out, b"hello world");

        wait_closed(&stream).await;
        assert_eq!(link.removed(), vec![2]);
        // The peer already knows; nothing goes back
        assert!(link.sent().is_empty());
        assert!(matches!(stream.write(b"x").await, Err(TunnelError::BrokenStream)));
    }

    #[tokio::test]
    async fn test_teardown_only_skips_routing_removal() {
        let (stream, link) = new_stream(8);
        stream.close_teardown_only();

        assert!(stream.is_closed());
        assert!(link.removed().is_empty());
        let mut buf = [0u8; 8];
        assert!(matches!(
            stream.read(&mut buf).await,
            Err(TunnelError::BrokenStream)
        ));
    }

    #[tokio::test]
    async fn test_close_never_overtakes_writes() {
        let (stream, link) = new_stream(5);

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let stream = stream.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        if stream.write(&[i as u8; 16]).await.is_err() {
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        tokio::task::yield_now().await;
        stream.close().await.unwrap();
        for writer in writers {
            writer.await.unwrap();
        }

        let sent = link.sent();
        let close = sent.last().unwrap();
        assert!(close.closing);
        assert_eq!(sent.iter().filter(|f| f.closing).count(), 1);
        assert!(sent.iter().all(|f| f.seq <= close.seq));
        assert_eq!(close.seq as usize, sent.len() - 1);
    }

    #[tokio::test]
    async fn test_async_read_reaches_eof() {
        use tokio::io::AsyncReadExt;

        let (mut stream, _link) = new_stream(2);
        stream
            .deliver_frame(Frame::data(2, 0, Bytes::from_static(b"payload")))
            .await;
        stream
            .deliver_frame(Frame::closing(2, 1, Bytes::from_static(b"pad")))
            .await;

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"payload");
    }

    #[tokio::test]
    async fn test_partial_write_reports_sent_bytes() {
        let (stream, link) = new_stream(1);
        *link.fail_after.lock().unwrap() = Some(1);
        let data = vec![1u8; MAX_PAYLOAD_SIZE * 2 + 10];

        assert_eq!(stream.write(&data).await.unwrap(), MAX_PAYLOAD_SIZE);
        assert_eq!(link.sent().len(), 1);

        // Nothing went out this time
        assert!(matches!(stream.write(b"again").await, Err(TunnelError::Io(_))));
    }

    #[tokio::test]
    async fn test_worker_stops_on_close() {
        let (stream, _link) = new_stream(1);
        assert!(!stream.worker_stopped());

        stream.close().await.unwrap();
        wait_worker_stopped(&stream).await;
    }

    #[tokio::test]
    async fn test_worker_stops_on_passive_close() {
        let (stream, link) = new_stream(2);
        stream.passive_close();

        wait_worker_stopped(&stream).await;
        assert_eq!(link.removed(), vec![2]);
    }

    #[tokio::test]
    async fn test_worker_stops_on_teardown_only() {
        let (stream, _link) = new_stream(3);
        stream.close_teardown_only();
        wait_worker_stopped(&stream).await;
    }

    #[tokio::test]
    async fn test_worker_stops_after_peer_close() {
        let (stream, _link) = new_stream(4);
        stream
            .deliver_frame(Frame::closing(4, 0, Bytes::from_static(b"pad")))
            .await;
        wait_worker_stopped(&stream).await;
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_teardown_with_full_queue() {
        let config = MuxConfig {
            inbound_queue_capacity: 1,
            ..MuxConfig::default()
        };
        let link = Arc::new(RecordingLink::default());
        let stream = Stream::new(5, link.clone(), &config);

        // The worker has not run yet on this thread; the queue fills up
        stream
            .inner
            .frame_tx
            .try_send(Frame::data(5, 1, Bytes::from_static(b"late")))
            .unwrap();
        assert!(matches!(
            stream
                .inner
                .frame_tx
                .try_send(Frame::data(5, 2, Bytes::from_static(b"later"))),
            Err(mpsc::error::TrySendError::Full(_))
        ));

        stream.close_teardown_only();
        wait_worker_stopped(&stream).await;

        // Delivery no longer waits for queue space
        tokio::time::timeout(
            Duration::from_secs(1),
            stream.deliver_frame(Frame::data(5, 0, Bytes::from_static(b"first"))),
        )
        .await
        .unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            stream.read(&mut buf).await,
            Err(TunnelError::BrokenStream)
        ));
    }

    #[tokio::test]
    async fn test_async_write_with_io_copy() {
        use tokio::io::AsyncWriteExt;

        let (mut stream, link) = new_stream(7);
        let data: Vec<u8> = (0..MAX_PAYLOAD_SIZE + 100).map(|i| i as u8).collect();

        let copied = tokio::io::copy(&mut &data[..], &mut stream).await.unwrap();
        assert_eq!(copied as usize, data.len());
        stream.shutdown().await.unwrap();
        assert!(stream.is_closed());
        // A second shutdown is not an error
        stream.shutdown().await.unwrap();

        let sent = link.sent();
        let (closing, frames): (Vec<Frame>, Vec<Frame>) = sent.into_iter().partition(|f| f.closing);
        assert_eq!(closing.len(), 1);
        let written: Vec<u8> = frames.iter().flat_map(|f| f.payload.to_vec()).collect();
        assert_eq!(written, data);
        assert!(matches!(
            stream.write_all(b"late").await.unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        ));
    }

    #[tokio::test]
    async fn test_addresses_come_from_session() {
        let (stream, _link) = new_stream(1);
        assert_eq!(stream.local_addr(), "127.0.0.1:1000".parse().ok());
        assert_eq!(stream.remote_addr(), "127.0.0.1:2000".parse().ok());
    }
}

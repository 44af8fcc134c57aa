//! In-memory byte queue between frame reassembly and stream readers

use super::TunnelError;
use bytes::{Buf, BytesMut};
use std::future::poll_fn;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

/// A closable, ordered byte queue whose reads wait for data.
///
/// Bytes come out in the order they were written. After [`close`], bytes
/// already queued stay readable; once they are drained every read returns 0.
///
/// [`close`]: BufferedPipe::close
#[derive(Debug, Default)]
pub struct BufferedPipe {
    inner: Mutex<PipeInner>,
}

#[derive(Debug, Default)]
struct PipeInner {
    buf: BytesMut,
    closed: bool,
    readers: Vec<Waker>,
}

impl BufferedPipe {
    /// Create an empty, open pipe
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PipeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes to the queue and wake waiting readers
    pub fn write(&self, data: &[u8]) -> Result<usize, TunnelError> {
        let readers = {
            let mut state = self.state();
            if state.closed {
                return Err(TunnelError::PipeClosed);
            }
            state.buf.extend_from_slice(data);
            std::mem::take(&mut state.readers)
        };

        for reader in readers {
            reader.wake();
        }
        Ok(data.len())
    }

    /// Copy queued bytes into `buf`, registering the task if none are queued.
    ///
    /// Resolves to 0 when the pipe is closed and drained, or when `buf` is
    /// empty.
    pub fn poll_read(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<usize> {
        let mut state = self.state();

        if !state.buf.is_empty() {
            let n = buf.len().min(state.buf.len());
            buf[..n].copy_from_slice(&state.buf[..n]);
            state.buf.advance(n);
            return Poll::Ready(n);
        }

        if state.closed || buf.is_empty() {
            return Poll::Ready(0);
        }

        if !state.readers.iter().any(|w| w.will_wake(cx.waker())) {
            state.readers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    /// Wait for at least one byte (or end of stream) and copy it into `buf`
    pub async fn read(&self, buf: &mut [u8]) -> usize {
        poll_fn(|cx| self.poll_read(cx, buf)).await
    }

    /// Close the pipe. Idempotent; wakes every waiting reader.
    pub fn close(&self) {
        let readers = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.readers)
        };

        for reader in readers {
            reader.wake();
        }
    }

    /// Number of bytes waiting to be read
    pub fn len(&self) -> usize {
        self.state().buf.len()
    }

    /// Check if no bytes are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the pipe has been closed
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

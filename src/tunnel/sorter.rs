//! Per-stream reordering of frames into contiguous sequence order
//!
//! Sequence numbers are 32 bits and wrap. Every arrival is placed on an
//! absolute 64-bit line (`rev << 32 | seq`) relative to the sequence number
//! the sorter expects next, so frames buffered before a wrap and frames
//! buffered after it order correctly in the same heap.

use super::{BufferedPipe, Frame};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::trace;

/// Returns true if `a` comes before `b` in wrapping sequence space.
///
/// `a` is before `b` when `a - b`, read as a signed 32-bit value, is
/// negative.
pub fn seq_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Place `seq` on the absolute sequence line.
///
/// `next_recv_seq` and `rev` describe the position the sorter expects next.
/// Returns `None` for sequence numbers behind that position, which have
/// already been delivered.
pub fn unwrap_seq(seq: u32, next_recv_seq: u32, rev: u32) -> Option<u64> {
    if seq_before(seq, next_recv_seq) {
        return None;
    }
    let ahead = u64::from(seq.wrapping_sub(next_recv_seq));
    Some(absolute_position(next_recv_seq, rev).wrapping_add(ahead))
}

fn absolute_position(seq: u32, rev: u32) -> u64 {
    (u64::from(rev) << 32) | u64::from(seq)
}

/// What a [`FrameSorter::push`] did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    /// The frame (and possibly buffered successors) reached the pipe
    Delivered,
    /// The frame is ahead of a gap and waits in the heap
    Buffered,
    /// The frame was already delivered and has been dropped
    Discarded,
    /// The closing frame has been reached; the pipe is closed
    Finished,
}

#[derive(Debug)]
struct Pending {
    position: u64,
    frame: Frame,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position.cmp(&other.position)
    }
}

/// Reorders one stream's frames and writes their payload to a pipe
#[derive(Debug)]
pub struct FrameSorter {
    /// Next sequence number to deliver
    next_recv_seq: u32,
    /// Number of times `next_recv_seq` has wrapped past zero
    rev: u32,
    /// Frames ahead of `next_recv_seq`, smallest position first
    pending: BinaryHeap<Reverse<Pending>>,
    pipe: Arc<BufferedPipe>,
    finished: bool,
}

impl FrameSorter {
    /// Create a sorter expecting sequence number 0
    pub fn new(pipe: Arc<BufferedPipe>) -> Self {
        Self::starting_at(0, pipe)
    }

    /// Create a sorter expecting `next_recv_seq` first
    pub fn starting_at(next_recv_seq: u32, pipe: Arc<BufferedPipe>) -> Self {
        Self {
            next_recv_seq,
            rev: 0,
            pending: BinaryHeap::new(),
            pipe,
            finished: false,
        }
    }

    /// Next sequence number the sorter will deliver
    pub fn next_recv_seq(&self) -> u32 {
        self.next_recv_seq
    }

    /// Wrap revision of `next_recv_seq`
    pub fn rev(&self) -> u32 {
        self.rev
    }

    /// Number of frames waiting for a gap to fill
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the closing frame has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Accept one frame in any order
    pub fn push(&mut self, frame: Frame) -> SortOutcome {
        if self.finished {
            return SortOutcome::Finished;
        }

        if frame.seq == self.next_recv_seq && self.pending.is_empty() {
            return self.deliver(frame);
        }

        let Some(position) = unwrap_seq(frame.seq, self.next_recv_seq, self.rev) else {
            trace!(
                stream_id = frame.stream_id,
                seq = frame.seq,
                expected = self.next_recv_seq,
                "discarding already delivered frame"
            );
            return SortOutcome::Discarded;
        };

        self.pending.push(Reverse(Pending { position, frame }));
        self.drain()
    }

    /// Deliver buffered frames for as long as they are contiguous
    fn drain(&mut self) -> SortOutcome {
        let mut outcome = SortOutcome::Buffered;

        while let Some(Reverse(head)) = self.pending.peek() {
            let expected = absolute_position(self.next_recv_seq, self.rev);
            if head.position > expected {
                break;
            }

            let Some(Reverse(head)) = self.pending.pop() else {
                break;
            };
            if head.position < expected {
                trace!(seq = head.frame.seq, "dropping duplicate buffered frame");
                continue;
            }

            outcome = self.deliver(head.frame);
            if outcome == SortOutcome::Finished {
                break;
            }
        }

        outcome
    }

    /// Hand an in-order frame to the pipe
    fn deliver(&mut self, frame: Frame) -> SortOutcome {
        if frame.closing {
            trace!(
                stream_id = frame.stream_id,
                seq = frame.seq,
                "closing frame reached"
            );
            self.finish();
            return SortOutcome::Finished;
        }

        if self.pipe.write(&frame.payload).is_err() {
            // Stream torn down underneath us
            self.finish();
            return SortOutcome::Finished;
        }

        self.advance();
        SortOutcome::Delivered
    }

    fn advance(&mut self) {
        self.next_recv_seq = self.next_recv_seq.wrapping_add(1);
        if self.next_recv_seq == 0 {
            self.rev = self.rev.wrapping_add(1);
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.pipe.close();
    }
}

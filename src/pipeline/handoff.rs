//! Single-slot frame handoff between the acquisition thread and the consumer.
//!
//! The producer overwrites whatever frame is still waiting; the consumer
//! polls with `try_lock` and simply skips an iteration when the lock is
//! contended, so a slow pipeline never blocks acquisition and a busy producer
//! never blocks the consumer loop.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::frame::Frame;

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Frame>,
    finished: bool,
    published: u64,
    overwritten: u64,
}

/// Result of a non-blocking poll of the slot.
#[derive(Debug)]
pub enum Poll {
    /// A fresh frame, now owned by the caller.
    Ready(Frame),
    /// Nothing new yet.
    Empty,
    /// The producer holds the lock right now.
    Contended,
    /// The producer has stopped and the slot is drained.
    Finished,
}

/// Counters describing how the handoff behaved over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandoffStats {
    pub published: u64,
    /// Frames replaced before the consumer took them.
    pub overwritten: u64,
}

/// Shared "latest frame" cell. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, replacing any unconsumed one. Returns `true` if a frame was overwritten.
    pub fn publish(&self, frame: Frame) -> bool {
        let mut state = self.inner.lock();
        state.published += 1;
        let replaced = state.frame.replace(frame).is_some();
        if replaced {
            state.overwritten += 1;
        }
        replaced
    }

    /// Take the waiting frame without blocking.
    pub fn try_take(&self) -> Poll {
        let Some(mut state) = self.inner.try_lock() else {
            return Poll::Contended;
        };
        match state.frame.take() {
            Some(frame) => Poll::Ready(frame),
            None if state.finished => Poll::Finished,
            None => Poll::Empty,
        }
    }

    /// Whether the previous frame has been taken.
    pub fn is_vacant(&self) -> bool {
        self.inner.lock().frame.is_none()
    }

    /// Signal that no more frames will be published.
    pub fn mark_finished(&self) {
        self.inner.lock().finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    pub fn stats(&self) -> HandoffStats {
        let state = self.inner.lock();
        HandoffStats {
            published: state.published,
            overwritten: state.overwritten,
        }
    }
}

/// Marks the slot finished when dropped, including on producer panic.
pub(crate) struct FinishOnDrop(pub(crate) FrameSlot);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

//! Pointer/gesture input queue
//!
//! Input sources (pointer handlers, gesture tracker, bots) push events through
//! a bounded crossbeam channel; the client drains everything once per frame.
//! Only `Press` events reach the hit resolver. `Move` events update the
//! cosmetic cursor.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::util::vec2::Vec2;

/// Input event in arena-local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Click, tap or gesture "pinch": hit-tested
    Press(Vec2),
    /// Continuous pointer/gesture position: cursor only
    Move(Vec2),
}

/// Bounded input queue drained by the frame loop
pub struct InputBuffer {
    sender: Sender<PointerEvent>,
    receiver: Receiver<PointerEvent>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a sender handle for an input source
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Try to submit an event (non-blocking). Returns false if the queue is full.
    #[inline]
    pub fn try_submit(&self, event: PointerEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    /// Drain all pending events for this frame
    pub fn drain(&self) -> Vec<PointerEvent> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        // A 60Hz pointer stream plus taps never gets near this between frames
        Self::new(256)
    }
}

/// Clonable sender handle for input sources
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<PointerEvent>,
}

impl InputSender {
    #[inline]
    pub fn press(&self, x: f32, y: f32) -> Result<(), InputBufferError> {
        self.send(PointerEvent::Press(Vec2::new(x, y)))
    }

    #[inline]
    pub fn move_to(&self, x: f32, y: f32) -> Result<(), InputBufferError> {
        self.send(PointerEvent::Move(Vec2::new(x, y)))
    }

    pub fn send(&self, event: PointerEvent) -> Result<(), InputBufferError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => InputBufferError::Full,
            TrySendError::Disconnected(_) => InputBufferError::Disconnected,
        })
    }
}

/// Input buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    #[error("input buffer is full")]
    Full,
    #[error("input buffer disconnected")]
    Disconnected,
}

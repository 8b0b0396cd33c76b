//! Replayable command queue
//!
//! An ordered sequence of outbound payloads with play/pause/stop/loop
//! semantics. Each `next()` call hands one item to the registered data
//! listeners. The queue has no clock of its own: whoever owns it decides
//! when to advance (the controller advances on every acknowledgment).
//!
//! # Invariants
//! - `executed()` never exceeds `len()`
//! - `clear()` empties the queue without touching the stopped/loop flags
//! - `stop()` rewinds the cursor and disables looping; `pause()` keeps it

use std::fmt;
use uuid::Uuid;

/// Handle returned by [`CommandQueue::on_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

type DataListener<T> = Box<dyn FnMut(&T) + Send>;

/// Ordered, replayable queue of outbound payloads
pub struct CommandQueue<T> {
    queue: Vec<T>,
    executed: usize,
    stopped: bool,
    looping: bool,
    listeners: Vec<(ListenerId, DataListener<T>)>,
}

impl<T: Clone> CommandQueue<T> {
    /// Create an empty, stopped queue
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            executed: 0,
            stopped: true,
            looping: false,
            listeners: Vec::new(),
        }
    }

    /// Append one item to the tail
    pub fn push(&mut self, item: T) {
        self.queue.push(item);
    }

    /// Append several items to the tail, in order
    pub fn push_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.queue.extend(items);
    }

    /// Drop every item and rewind the cursor
    pub fn clear(&mut self) {
        self.queue.clear();
        self.executed = 0;
    }

    /// Start (or resume) playback and dispatch the next item
    ///
    /// Returns the dispatched item, if any.
    pub fn play(&mut self, looping: bool) -> Option<T> {
        self.arm(looping);
        self.next()
    }

    /// Clear the stopped flag without dispatching anything
    pub fn arm(&mut self, looping: bool) {
        self.stopped = false;
        self.looping = looping;
    }

    /// Stop dispatching, keeping the cursor
    pub fn pause(&mut self) {
        self.stopped = true;
    }

    /// Stop dispatching, rewind the cursor and disable looping
    pub fn stop(&mut self) {
        self.stopped = true;
        self.looping = false;
        self.executed = 0;
    }

    /// Restart from the first item
    pub fn replay(&mut self, looping: bool) -> Option<T> {
        self.stop();
        self.play(looping)
    }

    /// Dispatch the item under the cursor to every data listener
    ///
    /// No-op while stopped. In loop mode an exhausted, non-empty queue wraps
    /// to the first item. Returns the dispatched item.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<T> {
        if self.stopped {
            return None;
        }

        if self.looping && !self.queue.is_empty() && self.executed >= self.queue.len() {
            self.executed = 0;
            return self.next();
        }

        let item = self.queue.get(self.executed)?.clone();
        for (_, listener) in self.listeners.iter_mut() {
            listener(&item);
        }
        self.executed += 1;

        Some(item)
    }

    /// Register a data listener
    pub fn on_data<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = ListenerId(Uuid::new_v4());
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a data listener
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Items dispatched in the current pass
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue holds no items
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if playback is stopped or paused
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Check if loop mode is on
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Queued items, in order
    pub fn items(&self) -> &[T] {
        &self.queue
    }
}

impl<T: Clone> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for CommandQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("queue", &self.queue)
            .field("executed", &self.executed)
            .field("stopped", &self.stopped)
            .field("looping", &self.looping)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

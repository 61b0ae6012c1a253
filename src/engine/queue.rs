// Tue Jan 13 2026 - Alex

use crate::engine::cancel::CancellationToken;
use crate::engine::error::{PipelineError, PipelineResult, QueueError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fixed set of bounded FIFO partitions presented as one logical
/// multi-producer, multi-consumer channel.
///
/// Items move under per-partition locks only. A separate wake-up signal
/// lets callers blocked on "all full" or "all empty" sleep until something
/// changes anywhere in the queue.
pub struct PartitionedQueue<T> {
    partitions: Vec<Partition<T>>,
    capacity: usize,
    cursor: AtomicUsize,
    poll_interval: Duration,
    signal: Signal,
}

struct Partition<T> {
    state: Mutex<PartitionState<T>>,
}

struct PartitionState<T> {
    items: VecDeque<T>,
    completed: bool,
    peak: usize,
}

enum Offer<T> {
    Placed(usize),
    Full(T),
    Closed(T),
}

impl<T> Partition<T> {
    // Capacity is a ceiling on residency, so nothing is reserved up front.
    fn new() -> Self {
        Self {
            state: Mutex::new(PartitionState {
                items: VecDeque::new(),
                completed: false,
                peak: 0,
            }),
        }
    }
}

impl<T> PartitionedQueue<T> {
    pub fn new(partitions: usize, capacity: usize) -> PipelineResult<Self> {
        Self::with_poll_interval(partitions, capacity, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        partitions: usize,
        capacity: usize,
        poll_interval: Duration,
    ) -> PipelineResult<Self> {
        if partitions == 0 {
            return Err(PipelineError::InvalidConfig(
                "partition count must be greater than 0".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "partition capacity must be greater than 0".to_string(),
            ));
        }
        if poll_interval.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "poll interval must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            partitions: (0..partitions).map(|_| Partition::new()).collect(),
            capacity,
            cursor: AtomicUsize::new(0),
            poll_interval,
            signal: Signal::new(),
        })
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Places `item` in the first open partition with room, without blocking.
    /// The item is handed back when nothing can accept it.
    pub fn try_add_to_any(&self, item: T) -> Result<usize, T> {
        match self.offer(item) {
            Offer::Placed(index) => {
                self.signal.notify();
                Ok(index)
            }
            Offer::Full(item) | Offer::Closed(item) => Err(item),
        }
    }

    /// Blocks until some partition accepts `item`.
    ///
    /// Cancellation is checked before every attempt, so nothing is accepted
    /// once the token is set.
    pub fn add_to_any(&self, item: T, token: &CancellationToken) -> Result<usize, QueueError> {
        let mut pending = item;
        loop {
            if token.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            let seen = self.signal.generation();
            match self.offer(pending) {
                Offer::Placed(index) => {
                    self.signal.notify();
                    return Ok(index);
                }
                Offer::Closed(_) => return Err(QueueError::Completed),
                Offer::Full(back) => {
                    pending = back;
                    self.signal.wait_since(seen, self.poll_interval);
                }
            }
        }
    }

    pub fn try_take_from_any(&self) -> Option<(usize, T)> {
        let taken = self.poll();
        if taken.is_some() {
            self.signal.notify();
        }
        taken
    }

    /// Removes one item from whichever partition has one ready.
    ///
    /// An item that is already available is returned even after
    /// cancellation; otherwise `Cancelled` is reported before any waiting.
    /// `Completed` means no partition will ever yield again.
    pub fn take_from_any(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<(usize, T), QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let seen = self.signal.generation();
            if let Some(taken) = self.poll() {
                self.signal.notify();
                return Ok(taken);
            }
            if self.is_fully_completed() {
                return Err(QueueError::Completed);
            }
            if token.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::TimedOut);
            }
            self.signal
                .wait_since(seen, (deadline - now).min(self.poll_interval));
        }
    }

    pub fn mark_partition_completed(&self, index: usize) -> Result<(), QueueError> {
        let partition = self
            .partitions
            .get(index)
            .ok_or(QueueError::InvalidPartition(index))?;
        partition.state.lock().completed = true;
        self.signal.notify();
        Ok(())
    }

    pub fn mark_all_completed(&self) {
        for partition in &self.partitions {
            partition.state.lock().completed = true;
        }
        self.signal.notify();
    }

    /// True once every partition is both completed and empty. Final: a
    /// completed partition never accepts another item.
    pub fn is_fully_completed(&self) -> bool {
        self.partitions.iter().all(|p| {
            let state = p.state.lock();
            state.completed && state.items.is_empty()
        })
    }

    pub fn is_partition_completed(&self, index: usize) -> Option<bool> {
        self.partitions.get(index).map(|p| p.state.lock().completed)
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.state.lock().items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn partition_len(&self, index: usize) -> Option<usize> {
        self.partitions.get(index).map(|p| p.state.lock().items.len())
    }

    /// Highest number of items ever resident in the partition at once.
    pub fn peak_len(&self, index: usize) -> Option<usize> {
        self.partitions.get(index).map(|p| p.state.lock().peak)
    }

    fn start_offset(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.partitions.len()
    }

    fn offer(&self, item: T) -> Offer<T> {
        let count = self.partitions.len();
        let start = self.start_offset();
        let mut any_open = false;

        for step in 0..count {
            let index = (start + step) % count;
            let mut state = self.partitions[index].state.lock();
            if state.completed {
                continue;
            }
            any_open = true;
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                state.peak = state.peak.max(state.items.len());
                return Offer::Placed(index);
            }
        }

        if any_open {
            Offer::Full(item)
        } else {
            Offer::Closed(item)
        }
    }

    fn poll(&self) -> Option<(usize, T)> {
        let count = self.partitions.len();
        let start = self.start_offset();

        for step in 0..count {
            let index = (start + step) % count;
            if let Some(item) = self.partitions[index].state.lock().items.pop_front() {
                return Some((index, item));
            }
        }
        None
    }
}

/// Generation counter used to park callers until the queue changes.
struct Signal {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    fn wait_since(&self, seen: u64, timeout: Duration) {
        let mut generation = self.generation.lock();
        if *generation != seen {
            return;
        }
        self.condvar.wait_for(&mut generation, timeout);
    }
}

// Fixed-capacity blocking FIFO shared by one producer and a pool of workers.
//
// push blocks while full, pop blocks while empty and open. close wakes every
// waiter; after that pop drains what is left and then returns None forever.

use crate::error::{Error, Result};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    Partial,
    Full,
    Closed,
}

struct Ring<T> {
    cells: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
    high_water: usize,
}

impl<T> Ring<T> {
    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn push_back(&mut self, item: T) {
        self.cells[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        self.high_water = self.high_water.max(self.count);
    }

    fn pop_front(&mut self) -> Option<T> {
        let item = self.cells[self.head].take()?;
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        Some(item)
    }
}

pub struct BoundedWorkQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedWorkQueue<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BoundedWorkQueue {
            ring: Mutex::new(Ring {
                cells: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
                high_water: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while the queue is full. Fails once the queue is closed.
    pub fn push(&self, item: T) -> Result<()> {
        let ring = self.lock();
        let mut ring = self
            .not_full
            .wait_while(ring, |r| r.count == r.capacity() && !r.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if ring.closed {
            return Err(Error::QueueClosed);
        }
        ring.push_back(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks while the queue is empty and open. `None` means no more work.
    pub fn pop(&self) -> Option<T> {
        let ring = self.lock();
        let mut ring = self
            .not_empty
            .wait_while(ring, |r| r.count == 0 && !r.closed)
            .unwrap_or_else(PoisonError::into_inner);
        let item = ring.pop_front();
        drop(ring);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn state(&self) -> QueueState {
        let ring = self.lock();
        if ring.closed {
            QueueState::Closed
        } else if ring.count == 0 {
            QueueState::Empty
        } else if ring.count == ring.capacity() {
            QueueState::Full
        } else {
            QueueState::Partial
        }
    }

    pub fn len(&self) -> usize {
        self.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Highest occupancy seen since creation.
    pub fn high_water(&self) -> usize {
        self.lock().high_water
    }
}

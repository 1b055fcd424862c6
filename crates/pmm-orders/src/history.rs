//! Bounded ring of archived terminal orders.

use std::collections::VecDeque;

use pmm_core::Order;

/// In-memory archive of terminal orders.
///
/// Oldest entries are evicted once the capacity is reached; nothing is
/// persisted across restarts.
#[derive(Debug)]
pub struct HistoryRing {
    ring: VecDeque<Order>,
    capacity: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn push(&mut self, order: Order) {
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(order);
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.ring.iter()
    }
}

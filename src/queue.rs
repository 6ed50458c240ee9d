use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

/// A raw received datagram plus everything the transmitter needs to parse
/// and reply to it. Parsing and Mode filtering happen after dequeue, not
/// before enqueue — keeping the receive path to a single `recv_from`.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub bytes: Vec<u8>,
    pub client: SocketAddr,
    pub rx_mono: Instant,
}

/// Bounded MPSC-style handoff between the UDP receiver and transmitter
/// threads. Full queues drop the oldest item rather than block the
/// receiver — a receiver stall would let the kernel's own UDP buffer back
/// up and start dropping client packets anyway, so there is nothing to be
/// gained by blocking here too.
pub struct WorkQueue {
    capacity: usize,
    state: Mutex<VecDeque<WorkItem>>,
    not_empty: Condvar,
}

impl WorkQueue {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        WorkQueue {
            capacity,
            state: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    /// Pushes `item`, dropping the oldest queued item first if at capacity.
    /// Returns `true` if an item was dropped to make room.
    pub fn push(&self, item: WorkItem) -> bool {
        let mut queue = self.state.lock().unwrap();
        let dropped = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(item);
        self.not_empty.notify_one();
        dropped
    }

    /// Blocks until an item is available or `timeout` elapses.
    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<WorkItem> {
        let mut queue = self.state.lock().unwrap();
        loop {
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            let (guard, result) = self.not_empty.wait_timeout(queue, timeout).unwrap();
            queue = guard;
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        WorkQueue::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_item() -> WorkItem {
        WorkItem {
            bytes: vec![0u8; 48],
            client: "127.0.0.1:123".parse().unwrap(),
            rx_mono: Instant::now(),
        }
    }

    #[test]
    fn fifo_order_is_preserved() {
        let queue = WorkQueue::new(4);
        let mut stamps = Vec::new();
        for _ in 0..3 {
            let item = sample_item();
            stamps.push(item.rx_mono);
            queue.push(item);
        }
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)).unwrap().rx_mono, stamps[0]);
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)).unwrap().rx_mono, stamps[1]);
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)).unwrap().rx_mono, stamps[2]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = WorkQueue::new(2);
        let mut stamps = Vec::new();
        for i in 0..3 {
            let item = sample_item();
            stamps.push(item.rx_mono);
            let dropped = queue.push(item);
            assert_eq!(dropped, i == 2);
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)).unwrap().rx_mono, stamps[1]);
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)).unwrap().rx_mono, stamps[2]);
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let queue = WorkQueue::new(4);
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }
}

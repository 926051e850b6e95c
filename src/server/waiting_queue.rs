//! Fixed-capacity FIFO ring buffer of pending clients

/// Default number of pending clients per room
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Bounded FIFO over a fixed slot array.
///
/// `rear` is the slot of the most recent enqueue; `front` the next slot to
/// dequeue. Neither operation blocks: a full queue hands the item back, an
/// empty one yields `None`.
#[derive(Debug)]
pub struct WaitingQueue<T> {
    slots: Box<[Option<T>]>,
    front: usize,
    rear: usize,
    len: usize,
}

impl<T> WaitingQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            front: 0,
            rear: capacity - 1,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Append at the rear. Returns the item back if the queue is full.
    pub fn enqueue(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.rear = (self.rear + 1) % self.slots.len();
        self.slots[self.rear] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Remove from the front
    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let item = self.slots[self.front].take();
        self.front = (self.front + 1) % self.slots.len();
        self.len -= 1;
        item
    }

    /// Keep only items matching `keep`, preserving their order
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for _ in 0..self.len {
            if let Some(item) = self.dequeue() {
                if keep(&item) {
                    // Cannot fail: one slot was just freed
                    let _ = self.enqueue(item);
                }
            }
        }
    }
}

impl<T> Default for WaitingQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = WaitingQueue::new(5);
        for i in 0..5 {
            queue.enqueue(i).unwrap();
        }
        assert!(queue.is_full());

        let drained: Vec<i32> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_overflow_reports_full_without_corruption() {
        let mut queue = WaitingQueue::new(DEFAULT_QUEUE_CAPACITY);
        for i in 0..DEFAULT_QUEUE_CAPACITY {
            queue.enqueue(i).unwrap();
        }

        assert_eq!(queue.enqueue(999), Err(999));
        assert_eq!(queue.len(), DEFAULT_QUEUE_CAPACITY);

        for i in 0..DEFAULT_QUEUE_CAPACITY {
            assert_eq!(queue.dequeue(), Some(i));
        }
    }

    #[test]
    fn test_wraparound() {
        let mut queue = WaitingQueue::new(3);
        queue.enqueue('a').unwrap();
        queue.enqueue('b').unwrap();
        assert_eq!(queue.dequeue(), Some('a'));
        queue.enqueue('c').unwrap();
        queue.enqueue('d').unwrap();
        assert!(queue.is_full());

        assert_eq!(queue.dequeue(), Some('b'));
        assert_eq!(queue.dequeue(), Some('c'));
        assert_eq!(queue.dequeue(), Some('d'));
    }

    #[test]
    fn test_retain_preserves_order() {
        let mut queue = WaitingQueue::new(4);
        queue.enqueue(1).unwrap();
        queue.dequeue();
        for i in 2..6 {
            queue.enqueue(i).unwrap();
        }

        queue.retain(|&i| i % 2 == 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), Some(5));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut queue = WaitingQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.enqueue("x").unwrap();
        assert!(queue.is_full());
    }
}

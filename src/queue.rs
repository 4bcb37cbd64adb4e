use std::collections::VecDeque;

use crate::models::Priority;

/// Two-class FIFO owned by a single worker. High priority goes to the head,
/// normal to the tail; arrival order is otherwise preserved.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_normal(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn enqueue_high(&mut self, item: T) {
        self.items.push_front(item);
    }

    pub fn enqueue(&mut self, item: T, priority: Priority) {
        match priority {
            Priority::Normal => self.enqueue_normal(item),
            Priority::High => self.enqueue_high(item),
        }
    }

    /// Remove and return up to `k` items from the head.
    pub fn dequeue_up_to(&mut self, k: usize) -> Vec<T> {
        let n = k.min(self.items.len());
        self.items.drain(..n).collect()
    }

    /// Move the first item matching `pred` to the head. Returns false when no
    /// queued item matches.
    pub fn promote(&mut self, pred: impl Fn(&T) -> bool) -> bool {
        match self.items.iter().position(pred) {
            Some(0) => true,
            Some(idx) => {
                if let Some(item) = self.items.remove(idx) {
                    self.items.push_front(item);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_priority_jumps_queued_normals() {
        let mut q = PriorityQueue::new();
        q.enqueue("A", Priority::Normal);
        q.enqueue("B", Priority::Normal);
        q.enqueue("C", Priority::High);
        assert_eq!(q.dequeue_up_to(5), vec!["C", "A", "B"]);
        assert!(q.is_empty());
    }

    #[test]
    fn drains_in_bounded_chunks() {
        let mut q = PriorityQueue::new();
        for i in 0..23 {
            q.enqueue_normal(i);
        }
        let mut sizes = Vec::new();
        loop {
            let batch = q.dequeue_up_to(5);
            if batch.is_empty() {
                break;
            }
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![5, 5, 5, 5, 3]);
    }

    #[test]
    fn normal_order_is_fifo() {
        let mut q = PriorityQueue::new();
        for i in 0..4 {
            q.enqueue_normal(i);
        }
        assert_eq!(q.dequeue_up_to(2), vec![0, 1]);
        q.enqueue_normal(4);
        assert_eq!(q.dequeue_up_to(10), vec![2, 3, 4]);
        assert!(q.dequeue_up_to(3).is_empty());
    }

    #[test]
    fn promote_moves_match_to_head() {
        let mut q = PriorityQueue::new();
        q.enqueue_normal("a");
        q.enqueue_normal("b");
        q.enqueue_normal("c");
        assert!(q.promote(|item| *item == "c"));
        assert!(!q.promote(|item| *item == "z"));
        assert_eq!(q.dequeue_up_to(3), vec!["c", "a", "b"]);
    }
}

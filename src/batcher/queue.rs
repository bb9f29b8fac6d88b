//! Three-tier FIFO queue of pending batch requests.

use std::collections::VecDeque;

use super::types::BatchRequest;
use crate::task::Priority;

/// Pending requests, ordered high → normal → low, FIFO within a tier.
#[derive(Default)]
pub struct PriorityQueue {
    high: VecDeque<BatchRequest>,
    normal: VecDeque<BatchRequest>,
    low: VecDeque<BatchRequest>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: BatchRequest) {
        match request.priority {
            Priority::High => self.high.push_back(request),
            Priority::Normal => self.normal.push_back(request),
            Priority::Low => self.low.push_back(request),
        }
    }

    /// Take the next request: highest non-empty tier, FIFO within it.
    pub fn pop(&mut self) -> Option<BatchRequest> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return everything, highest tier first.
    pub fn drain_all(&mut self) -> Vec<BatchRequest> {
        let mut all = Vec::with_capacity(self.len());
        all.extend(self.high.drain(..));
        all.extend(self.normal.drain(..));
        all.extend(self.low.drain(..));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn request(tag: &str, priority: Priority) -> BatchRequest {
        let (tx, _rx) = oneshot::channel();
        BatchRequest::new(tag.as_bytes().to_vec(), tag.to_string(), priority, tx)
    }

    #[test]
    fn pop_honors_tier_order() {
        let mut queue = PriorityQueue::new();
        queue.push(request("low", Priority::Low));
        queue.push(request("normal", Priority::Normal));
        queue.push(request("high", Priority::High));

        assert_eq!(queue.pop().unwrap().fingerprint, "high");
        assert_eq!(queue.pop().unwrap().fingerprint, "normal");
        assert_eq!(queue.pop().unwrap().fingerprint, "low");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn fifo_within_a_tier() {
        let mut queue = PriorityQueue::new();
        queue.push(request("first", Priority::Normal));
        queue.push(request("second", Priority::Normal));
        queue.push(request("third", Priority::Normal));

        assert_eq!(queue.pop().unwrap().fingerprint, "first");
        assert_eq!(queue.pop().unwrap().fingerprint, "second");
        assert_eq!(queue.pop().unwrap().fingerprint, "third");
    }

    #[test]
    fn len_spans_all_tiers() {
        let mut queue = PriorityQueue::new();
        assert!(queue.is_empty());

        queue.push(request("a", Priority::High));
        queue.push(request("b", Priority::Low));
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_empty());
    }

    #[test]
    fn drain_returns_everything_high_first() {
        let mut queue = PriorityQueue::new();
        queue.push(request("l", Priority::Low));
        queue.push(request("h", Priority::High));
        queue.push(request("n", Priority::Normal));

        let drained = queue.drain_all();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].fingerprint, "h");
        assert_eq!(drained[1].fingerprint, "n");
        assert_eq!(drained[2].fingerprint, "l");
        assert!(queue.is_empty());
    }
}

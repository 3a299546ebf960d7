//! Bounded job queue: FIFO within priority, with a concurrency cap that
//! only counts executing jobs. Jobs parked at the approval gate never hold
//! an execution slot.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use crate::issue::Priority;

/// Priority-ordered ready queue plus the executing set.
///
/// Not internally synchronized; the dispatcher wraps it in a mutex so the
/// enqueue path stays a single atomic insertion point.
#[derive(Debug)]
pub struct JobQueue {
    // Index 0 = critical ... 3 = low.
    ready: [VecDeque<Uuid>; 4],
    executing: HashSet<Uuid>,
    max_concurrent: usize,
}

fn lane(priority: Priority) -> usize {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
    }
}

impl JobQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            ready: Default::default(),
            executing: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn push(&mut self, id: Uuid, priority: Priority) {
        self.ready[lane(priority)].push_back(id);
    }

    pub fn depth(&self) -> usize {
        self.ready.iter().map(VecDeque::len).sum()
    }

    pub fn depth_by_priority(&self) -> [(Priority, usize); 4] {
        [
            (Priority::Critical, self.ready[0].len()),
            (Priority::High, self.ready[1].len()),
            (Priority::Medium, self.ready[2].len()),
            (Priority::Low, self.ready[3].len()),
        ]
    }

    pub fn executing_count(&self) -> usize {
        self.executing.len()
    }

    pub fn available_slots(&self) -> usize {
        self.max_concurrent.saturating_sub(self.executing.len())
    }

    /// Pop up to `available_slots` ready jobs, highest priority first, and
    /// mark them executing.
    pub fn take_ready(&mut self) -> Vec<Uuid> {
        // Snapshot before the loop: inserting into `executing` shrinks
        // available_slots as we take.
        let slots = self.available_slots();
        let mut taken = Vec::new();
        while taken.len() < slots {
            let Some(id) = self.pop_highest() else { break };
            self.executing.insert(id);
            taken.push(id);
        }
        taken
    }

    fn pop_highest(&mut self) -> Option<Uuid> {
        self.ready.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Release an execution slot once a job reaches a terminal state.
    pub fn finish(&mut self, id: Uuid) {
        self.executing.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_within_priority() {
        let mut q = JobQueue::new(10);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.push(a, Priority::Medium);
        q.push(b, Priority::Medium);
        assert_eq!(q.take_ready(), vec![a, b]);
    }

    #[test]
    fn test_priority_order() {
        let mut q = JobQueue::new(10);
        let low = Uuid::new_v4();
        let critical = Uuid::new_v4();
        let high = Uuid::new_v4();
        q.push(low, Priority::Low);
        q.push(critical, Priority::Critical);
        q.push(high, Priority::High);
        assert_eq!(q.take_ready(), vec![critical, high, low]);
    }

    #[test]
    fn test_concurrency_cap() {
        let mut q = JobQueue::new(2);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            q.push(*id, Priority::Medium);
        }
        let first = q.take_ready();
        assert_eq!(first.len(), 2);
        assert_eq!(q.executing_count(), 2);
        // No slots free: nothing more comes out.
        assert!(q.take_ready().is_empty());

        q.finish(first[0]);
        let second = q.take_ready();
        assert_eq!(second.len(), 1);
        assert_eq!(q.executing_count(), 2);
        assert_eq!(q.depth(), 2);
    }

    #[test]
    fn test_finish_frees_slot() {
        let mut q = JobQueue::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        q.push(a, Priority::High);
        q.push(b, Priority::High);
        assert_eq!(q.take_ready(), vec![a]);
        q.finish(a);
        assert_eq!(q.take_ready(), vec![b]);
    }

    #[test]
    fn test_zero_cap_is_clamped_to_one() {
        let q = JobQueue::new(0);
        assert_eq!(q.available_slots(), 1);
    }
}

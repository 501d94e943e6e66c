//! FIFO queue with head-of-line blocking.

use std::collections::VecDeque;
use std::fmt;

use super::{Attempt, BoxedSynapse, DrainMode};

/// What one [`SynapseQueue::fire`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireReport {
    /// Entries attempted
    pub attempted: usize,
    /// Entries that completed and were removed
    pub completed: usize,
    /// Whether the last attempt deferred (head left in place)
    pub deferred: bool,
}

/// Ordered, resumable work queue.
///
/// Entries are attempted strictly in order. A deferred head is never
/// skipped over.
pub struct SynapseQueue<C: ?Sized> {
    entries: VecDeque<BoxedSynapse<C>>,
    mode: DrainMode,
}

impl<C: ?Sized> Default for SynapseQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> SynapseQueue<C> {
    /// Create an empty queue draining one head per `fire`
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            mode: DrainMode::default(),
        }
    }

    /// Set the drain mode
    pub fn with_mode(mut self, mode: DrainMode) -> Self {
        self.mode = mode;
        self
    }

    /// Current drain mode
    pub fn mode(&self) -> DrainMode {
        self.mode
    }

    /// Append to the tail
    pub fn enqueue(&mut self, synapse: BoxedSynapse<C>) {
        tracing::trace!(synapse = synapse.label(), queued = self.entries.len() + 1, "enqueue");
        self.entries.push_back(synapse);
    }

    /// Append all entries of `other`, leaving it empty
    pub fn append(&mut self, other: &mut SynapseQueue<C>) {
        self.entries.append(&mut other.entries);
    }

    /// Attempt the head entry against `ctx`.
    ///
    /// In [`DrainMode::Single`] at most one entry is attempted. In
    /// [`DrainMode::Continuous`] attempts continue until the queue is empty
    /// or an entry defers.
    pub fn fire(&mut self, ctx: &mut C) -> FireReport {
        let mut report = FireReport::default();

        while let Some(mut head) = self.entries.pop_front() {
            report.attempted += 1;
            match head.attempt(ctx) {
                Attempt::Complete => {
                    report.completed += 1;
                    tracing::trace!(synapse = head.label(), "synapse complete");
                },
                Attempt::Deferred => {
                    tracing::trace!(synapse = head.label(), "synapse deferred");
                    self.entries.push_front(head);
                    report.deferred = true;
                    break;
                },
            }
            if self.mode == DrainMode::Single {
                break;
            }
        }

        report
    }

    /// Discard all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Head entry
    pub fn first(&self) -> Option<&BoxedSynapse<C>> {
        self.entries.front()
    }

    /// Labels of all entries, head first
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.label())
    }
}

impl<C: ?Sized> fmt::Debug for SynapseQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynapseQueue")
            .field("mode", &self.mode)
            .field("entries", &self.labels().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse::from_fn;

    /// Records attempts and controls whether entries may complete.
    #[derive(Default)]
    struct Tally {
        attempts: Vec<&'static str>,
        e1_ready: bool,
    }

    fn blocking_pair() -> SynapseQueue<Tally> {
        let mut queue = SynapseQueue::new();
        queue.enqueue(Box::new(from_fn("e1", |p: &mut Tally| {
            p.attempts.push("e1");
            if p.e1_ready {
                Attempt::Complete
            } else {
                Attempt::Deferred
            }
        })));
        queue.enqueue(Box::new(from_fn("e2", |p: &mut Tally| {
            p.attempts.push("e2");
            Attempt::Complete
        })));
        queue
    }

    #[test]
    fn test_fire_on_empty_is_noop() {
        let mut queue: SynapseQueue<Tally> = SynapseQueue::new();
        let report = queue.fire(&mut Tally::default());
        assert_eq!(report, FireReport::default());
    }

    #[test]
    fn test_deferred_head_blocks() {
        let mut queue = blocking_pair();
        let mut tally = Tally::default();

        for _ in 0..3 {
            let report = queue.fire(&mut tally);
            assert!(report.deferred);
        }
        assert_eq!(tally.attempts, ["e1", "e1", "e1"]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.first().unwrap().label(), "e1");

        tally.e1_ready = true;
        queue.fire(&mut tally);
        assert_eq!(queue.first().unwrap().label(), "e2");
        queue.fire(&mut tally);
        assert_eq!(tally.attempts, ["e1", "e1", "e1", "e1", "e2"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_mode_one_head_per_fire() {
        let mut queue = blocking_pair();
        let mut tally = Tally {
            e1_ready: true,
            ..Default::default()
        };
        let report = queue.fire(&mut tally);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_continuous_mode_drains_until_deferral() {
        let mut queue = blocking_pair().with_mode(DrainMode::Continuous);
        let mut tally = Tally {
            e1_ready: true,
            ..Default::default()
        };
        let report = queue.fire(&mut tally);
        assert_eq!(report.completed, 2);
        assert!(queue.is_empty());

        let mut queue = blocking_pair().with_mode(DrainMode::Continuous);
        let mut tally = Tally::default();
        let report = queue.fire(&mut tally);
        assert_eq!(report.attempted, 1);
        assert_eq!(tally.attempts, ["e1"]);
    }

    #[test]
    fn test_clear_and_append() {
        let mut queue = blocking_pair();
        let mut other = blocking_pair();
        queue.append(&mut other);
        assert_eq!(queue.len(), 4);
        assert!(other.is_empty());
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_mode_from_str() {
        assert_eq!("single".parse::<DrainMode>().unwrap(), DrainMode::Single);
        assert_eq!(
            "Continuous".parse::<DrainMode>().unwrap(),
            DrainMode::Continuous
        );
        assert!("sometimes".parse::<DrainMode>().is_err());
    }
}

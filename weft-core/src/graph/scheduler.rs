//! Update Scheduler
//!
//! Effects that opt into deferred execution (component render effects, for
//! one) are not re-run when notified. They are queued here instead, and the
//! whole queue is flushed once at the next flush boundary.
//!
//! # Guarantees
//!
//! - An effect is queued at most once per flush window, however many times it
//!   is notified.
//! - Jobs run in the order they were first queued.
//! - Jobs queued while a flush is running are picked up by a later pass of
//!   the same flush.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{Effect, EffectId};

#[derive(Default)]
struct QueueState {
    /// Pending jobs, deduplicated by effect id, in enqueue order.
    jobs: IndexMap<EffectId, Effect>,

    /// A flush has been requested and not completed yet.
    flush_pending: bool,

    /// A flush is executing right now.
    flushing: bool,
}

/// The pending job queue of one runtime.
#[derive(Default)]
pub(crate) struct JobQueue {
    state: Mutex<QueueState>,
}

/// What happened when a job was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// Queued; the caller must arrange a flush.
    RequestFlush,
    /// Queued behind an already requested flush.
    Queued,
    /// Already queued; nothing changed.
    Duplicate,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, effect: &Effect) -> Enqueued {
        let mut state = self.state.lock();
        if state.jobs.contains_key(&effect.id()) {
            return Enqueued::Duplicate;
        }
        state.jobs.insert(effect.id(), effect.clone());

        if state.flush_pending {
            Enqueued::Queued
        } else {
            state.flush_pending = true;
            Enqueued::RequestFlush
        }
    }

    /// Remove a queued job. The removed handle is returned so it is dropped
    /// outside the queue lock.
    pub fn remove(&self, id: EffectId) -> Option<Effect> {
        self.state.lock().jobs.shift_remove(&id)
    }

    /// Mark a flush as running. Returns `false` if one already is.
    pub fn begin_flush(&self) -> bool {
        let mut state = self.state.lock();
        if state.flushing {
            return false;
        }
        state.flushing = true;
        true
    }

    /// Take everything queued so far, in order.
    pub fn take_batch(&self) -> Vec<Effect> {
        let jobs = std::mem::take(&mut self.state.lock().jobs);
        jobs.into_values().collect()
    }

    pub fn finish_flush(&self) {
        let mut state = self.state.lock();
        state.flushing = false;
        state.flush_pending = !state.jobs.is_empty();
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().flush_pending
    }

    pub fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Runtime};

    fn lazy_effect(rt: &Runtime) -> Effect {
        rt.effect_with(|| {}, EffectOptions::lazy())
    }

    #[test]
    fn first_push_requests_a_flush() {
        let rt = Runtime::new();
        let queue = JobQueue::new();
        let a = lazy_effect(&rt);
        let b = lazy_effect(&rt);

        assert_eq!(queue.push(&a), Enqueued::RequestFlush);
        assert_eq!(queue.push(&b), Enqueued::Queued);
        assert_eq!(queue.push(&a), Enqueued::Duplicate);
        assert_eq!(queue.len(), 2);
        assert!(queue.is_pending());
    }

    #[test]
    fn batches_come_out_in_enqueue_order() {
        let rt = Runtime::new();
        let queue = JobQueue::new();
        let effects: Vec<Effect> = (0..4).map(|_| lazy_effect(&rt)).collect();

        for effect in effects.iter().rev() {
            queue.push(effect);
        }

        let ids: Vec<EffectId> = queue.take_batch().iter().map(Effect::id).collect();
        let expected: Vec<EffectId> = effects.iter().rev().map(Effect::id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn flush_state_clears_only_when_empty() {
        let rt = Runtime::new();
        let queue = JobQueue::new();
        let a = lazy_effect(&rt);

        queue.push(&a);
        assert!(queue.begin_flush());
        assert!(!queue.begin_flush());

        let _batch = queue.take_batch();
        queue.finish_flush();
        assert!(!queue.is_pending());
        assert!(!queue.is_flushing());
    }

    #[test]
    fn removed_jobs_do_not_run() {
        let rt = Runtime::new();
        let queue = JobQueue::new();
        let a = lazy_effect(&rt);
        let b = lazy_effect(&rt);

        queue.push(&a);
        queue.push(&b);
        assert!(queue.remove(a.id()).is_some());

        let batch = queue.take_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), b.id());
    }
}

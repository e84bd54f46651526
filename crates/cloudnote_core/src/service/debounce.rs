//! Trailing-edge debounce timers for note text edits.
//!
//! One timer per `(note, field)`. Re-arming replaces the pending timer, so
//! only the last edit of a burst fires.

use crate::model::note::NoteId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

/// Note field with its own debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditField {
    Title,
    Content,
}

impl EditField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
        }
    }
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct Timers {
    next_generation: u64,
    pending: HashMap<(NoteId, EditField), Timer>,
}

#[derive(Debug, Default)]
pub(crate) struct Debouncer {
    timers: Mutex<Timers>,
}

impl Debouncer {
    /// Arms a timer for `(note, field)`, cancelling the previous one.
    ///
    /// `spawn` receives the timer generation and must start the sleeping
    /// task. The registry stays locked until the handle is stored, so the
    /// task cannot claim its slot before it exists.
    pub(crate) fn arm(
        &self,
        note: NoteId,
        field: EditField,
        spawn: impl FnOnce(u64) -> AbortHandle,
    ) {
        let mut timers = self.lock();
        timers.next_generation += 1;
        let generation = timers.next_generation;
        let handle = spawn(generation);
        if let Some(previous) = timers
            .pending
            .insert((note, field), Timer { generation, handle })
        {
            previous.handle.abort();
        }
    }

    /// Called by a timer task once its delay elapsed.
    ///
    /// Returns `true` and forgets the timer when it is still current; a
    /// superseded or cancelled timer gets `false` and must not write.
    pub(crate) fn claim(&self, note: &NoteId, field: EditField, generation: u64) -> bool {
        let mut timers = self.lock();
        let key = (note.clone(), field);
        match timers.pending.get(&key) {
            Some(timer) if timer.generation == generation => {
                timers.pending.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Drops every pending timer of `note`. Returns how many were cancelled.
    pub(crate) fn cancel_note(&self, note: &NoteId) -> usize {
        let mut timers = self.lock();
        let before = timers.pending.len();
        timers.pending.retain(|(pending_note, _), timer| {
            let keep = pending_note != note;
            if !keep {
                timer.handle.abort();
            }
            keep
        });
        before - timers.pending.len()
    }

    /// Cancels every pending timer and returns what they would have saved.
    pub(crate) fn drain(&self) -> Vec<(NoteId, EditField)> {
        self.lock()
            .pending
            .drain()
            .map(|(key, timer)| {
                timer.handle.abort();
                key
            })
            .collect()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{Debouncer, EditField};
    use crate::model::note::NoteId;
    use std::future::pending;

    fn idle_handle() -> tokio::task::AbortHandle {
        tokio::spawn(pending::<()>()).abort_handle()
    }

    #[tokio::test]
    async fn rearming_supersedes_previous_generation() {
        let debouncer = Debouncer::default();
        let note = NoteId::new("n1");
        let mut generations = Vec::new();

        debouncer.arm(note.clone(), EditField::Title, |generation| {
            generations.push(generation);
            idle_handle()
        });
        debouncer.arm(note.clone(), EditField::Title, |generation| {
            generations.push(generation);
            idle_handle()
        });

        assert!(!debouncer.claim(&note, EditField::Title, generations[0]));
        assert!(debouncer.claim(&note, EditField::Title, generations[1]));
        assert!(!debouncer.has_pending());
    }

    #[tokio::test]
    async fn fields_are_independent_and_cancel_is_per_note() {
        let debouncer = Debouncer::default();
        let first = NoteId::new("n1");
        let second = NoteId::new("n2");

        debouncer.arm(first.clone(), EditField::Title, |_| idle_handle());
        debouncer.arm(first.clone(), EditField::Content, |_| idle_handle());
        debouncer.arm(second.clone(), EditField::Content, |_| idle_handle());

        assert_eq!(debouncer.cancel_note(&first), 2);
        assert!(debouncer.has_pending());
        assert_eq!(debouncer.cancel_note(&second), 1);
        assert!(!debouncer.has_pending());
    }

    #[tokio::test]
    async fn drain_returns_every_pending_key() {
        let debouncer = Debouncer::default();
        let note = NoteId::new("n1");
        debouncer.arm(note.clone(), EditField::Title, |_| idle_handle());
        debouncer.arm(note.clone(), EditField::Content, |_| idle_handle());

        let mut drained = debouncer.drain();
        drained.sort_by_key(|(_, field)| field.as_str());
        assert_eq!(
            drained,
            vec![(note.clone(), EditField::Content), (note, EditField::Title)]
        );
        assert!(!debouncer.has_pending());
    }
}

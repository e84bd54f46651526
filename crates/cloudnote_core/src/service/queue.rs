//! Per-entity write ordering and placeholder id aliasing.
//!
//! # Invariants
//! - A lane turn is taken synchronously by `reserve`; turns on one key run
//!   in reservation order, whatever order their tasks are polled in.
//! - Two turns holding the same key never overlap. Dropping a ticket hands
//!   the key to the next reservation.
//! - A multi-key reservation is placed on all of its lanes at once, so two
//!   reservations are ordered the same way on every lane they share.
//! - A placeholder id and the durable id that replaced it share one key, so
//!   writes issued before and after the create resolves stay ordered.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// FIFO lanes keyed by entity.
///
/// Each lane stores the release signal of its latest reservation; a new
/// reservation waits on that signal and becomes the new tail.
#[derive(Debug, Default)]
pub(crate) struct KeyedQueue {
    lanes: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

/// Place in line on one or more lanes, not yet started.
#[derive(Debug, Default)]
pub(crate) struct Reservation {
    predecessors: Vec<oneshot::Receiver<()>>,
    releases: Vec<oneshot::Sender<()>>,
}

/// Exclusive turn on the reserved lanes; released on drop.
#[derive(Debug)]
pub(crate) struct QueueTicket {
    _releases: Vec<oneshot::Sender<()>>,
}

impl KeyedQueue {
    /// Takes the next turn on every key in `keys`. Keys must be distinct.
    pub(crate) fn reserve<I>(&self, keys: I) -> Reservation
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed tail means its holder finished and nobody queued after it.
        lanes.retain(|_, tail| matches!(tail.try_recv(), Err(TryRecvError::Empty)));

        let mut reservation = Reservation::default();
        for key in keys {
            let (release, tail) = oneshot::channel();
            if let Some(previous) = lanes.insert(key.into(), tail) {
                reservation.predecessors.push(previous);
            }
            reservation.releases.push(release);
        }
        reservation
    }

    #[cfg(test)]
    async fn acquire(&self, key: &str) -> QueueTicket {
        self.reserve([key]).wait().await
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes.retain(|_, tail| matches!(tail.try_recv(), Err(TryRecvError::Empty)));
        lanes.len()
    }
}

impl Reservation {
    /// Waits until every earlier reservation on the same keys has finished.
    pub(crate) async fn wait(self) -> QueueTicket {
        for previous in self.predecessors {
            // Holders never send; the sender dropping is the release.
            let _ = previous.await;
        }
        QueueTicket {
            _releases: self.releases,
        }
    }
}

/// Placeholder to durable id mapping for one entity kind.
#[derive(Debug)]
pub(crate) struct AliasMap<Id> {
    durable: HashMap<Id, Id>,
    placeholder: HashMap<Id, Id>,
}

impl<Id> Default for AliasMap<Id> {
    fn default() -> Self {
        Self {
            durable: HashMap::new(),
            placeholder: HashMap::new(),
        }
    }
}

impl<Id: Clone + Eq + Hash> AliasMap<Id> {
    pub(crate) fn insert(&mut self, placeholder: Id, durable: Id) {
        self.placeholder.insert(durable.clone(), placeholder.clone());
        self.durable.insert(placeholder, durable);
    }

    /// Durable id for `id` when one is known, otherwise `id` itself.
    pub(crate) fn resolve(&self, id: &Id) -> Id {
        self.durable.get(id).unwrap_or(id).clone()
    }

    /// Stable key for `id`: the placeholder it was created under, if any.
    pub(crate) fn key(&self, id: &Id) -> Id {
        self.placeholder.get(id).unwrap_or(id).clone()
    }
}

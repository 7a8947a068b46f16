//! The current candidate snapshot, shared between the watcher and the
//! request path.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::candidate::Candidate;

/// An immutable, fully built candidate list.
pub type Snapshot = Vec<Candidate>;

/// Lock-free holder of the current [`Snapshot`].
///
/// Writers build a complete snapshot and swap it in; readers load the
/// `Arc` once and iterate it without holding anything, so a reader sees
/// either the old or the new list, never a mix.
#[derive(Debug)]
pub struct CandidateStore {
    current: ArcSwap<Snapshot>,
    installs: watch::Sender<u64>,
}

impl CandidateStore {
    pub fn new(initial: Snapshot) -> Self {
        let (installs, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(initial),
            installs,
        }
    }

    /// Atomically replace the whole snapshot.
    pub fn replace(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
        self.installs.send_modify(|generation| *generation += 1);
    }

    pub fn read_all(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Number of installs so far.
    pub fn generation(&self) -> u64 {
        *self.installs.borrow()
    }

    /// Notified with the new generation after every install.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.installs.subscribe()
    }
}

impl Default for CandidateStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

//! At-most-one in-flight fetch per key.
//!
//! The first caller for a key becomes the leader and runs the work. Callers that arrive while the
//! work is running wait for the leader's outcome instead of starting their own. If the leader is
//! cancelled, one of the waiters runs its own work instead. The marker for a key is removed once
//! the outcome is available, so a later miss starts a fresh fetch.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::FetchCause;

pub(crate) type Outcome = Result<Vec<u8>, FetchCause>;

/// Whether the caller ran the work itself or received another caller's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Leader,
    Follower,
}

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    calls: DashMap<String, Arc<OnceCell<Outcome>>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn run<W, Fut>(&self, key: &str, work: W) -> (Outcome, Role)
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        // the map guard must be released before awaiting
        let cell = Arc::clone(self.calls.entry(key.to_string()).or_default().value());

        let mut role = Role::Follower;
        let outcome = cell
            .get_or_init(|| {
                role = Role::Leader;
                work()
            })
            .await
            .clone();

        self.calls
            .remove_if(key, |_, current| Arc::ptr_eq(current, &cell));

        (outcome, role)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}

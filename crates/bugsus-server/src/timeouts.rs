//! Per-room phase deadlines.
//!
//! At most one timer is armed per (room, tag). Each arming gets a fresh
//! generation number; a firing timer must [`TimeoutCoordinator::claim`] its
//! generation under the registry lock before acting. The early-completion
//! path cancels the entry under the same lock, so whichever path reaches
//! the lock first wins and the other becomes a no-op.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Which deadline of a room a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseTag {
    CategoryVote,
    RoleReveal,
    WorkPeriod,
    Ejection,
    RoundSummary,
    GameOver,
}

struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct TimeoutCoordinator {
    armed: HashMap<(String, PhaseTag), Armed>,
    next_generation: u64,
}

impl TimeoutCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `on_fire` to run after `after`, replacing any timer already armed
    /// for the same room and tag. Returns the new generation.
    ///
    /// `on_fire` receives the generation it must claim.
    pub fn schedule<F, Fut>(&mut self, room: &str, tag: PhaseTag, after: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.cancel(room, tag) {
            tracing::debug!(room, ?tag, "Replaced armed timer");
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_fire(generation).await;
        });
        self.armed
            .insert((room.to_string(), tag), Armed { generation, handle });
        generation
    }

    /// Disarm without firing. Returns whether a timer was armed.
    pub fn cancel(&mut self, room: &str, tag: PhaseTag) -> bool {
        match self.armed.remove(&(room.to_string(), tag)) {
            Some(armed) => {
                armed.handle.abort();
                true
            },
            None => false,
        }
    }

    /// Take ownership of a firing timer. Succeeds once, and only if the
    /// timer was neither cancelled nor replaced since it was armed.
    pub fn claim(&mut self, room: &str, tag: PhaseTag, generation: u64) -> bool {
        let key = (room.to_string(), tag);
        match self.armed.get(&key) {
            Some(armed) if armed.generation == generation => {
                self.armed.remove(&key);
                true
            },
            _ => false,
        }
    }

    /// Disarm every timer of a room. Returns how many were armed.
    pub fn cancel_room(&mut self, room: &str) -> usize {
        let mut cancelled = 0;
        self.armed.retain(|(code, _), armed| {
            if code == room {
                armed.handle.abort();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    pub fn is_armed(&self, room: &str, tag: PhaseTag) -> bool {
        self.armed.contains_key(&(room.to_string(), tag))
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

impl Drop for TimeoutCoordinator {
    fn drop(&mut self) {
        for armed in self.armed.values() {
            armed.handle.abort();
        }
    }
}

//! In-memory session store with TTL semantics
//!
//! Matches the external store contract: idempotent upserts keyed by session
//! id, TTL refreshed on every write, lazy expiry on read, delete on normal
//! close. Recovery and monitoring processes may hit the same store
//! concurrently, so every operation is safe under re-delivery.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use call_agent_core::{CallSnapshot, Result, SessionStore};

struct Entry {
    snapshot: CallSnapshot,
    expires_at: Instant,
}

/// DashMap-backed store. TTL expiry is lazy (checked on read) plus an
/// explicit [`purge_expired`](InMemorySessionStore::purge_expired) sweep for
/// long-idle entries.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: DashMap<Uuid, Entry>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove entries past their TTL. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Live (non-expired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: Uuid) -> Result<Option<CallSnapshot>> {
        // Read guard must drop before the expired-entry removal below
        let live = self.entries.get(&session_id).map(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.snapshot.clone())
            } else {
                None
            }
        });
        match live {
            Some(Some(snapshot)) => Ok(Some(snapshot)),
            Some(None) => {
                self.entries.remove(&session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, snapshot: &CallSnapshot, ttl: Duration) -> Result<()> {
        self.entries.insert(
            snapshot.session_id,
            Entry {
                snapshot: snapshot.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.entries.remove(&session_id);
        Ok(())
    }
}

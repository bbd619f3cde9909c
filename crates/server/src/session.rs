//! Session registry and admission control
//!
//! One shared atomic counter guards the admission ceiling. Acquisition is a
//! compare-and-swap, so a rejected connection never perturbs the count, and
//! the permit releases exactly once no matter how many teardown paths run.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use call_agent_agent::CallEvent;

use crate::metrics as srv_metrics;
use crate::ServerError;

/// The single shared active-call counter.
pub struct AdmissionControl {
    active: AtomicUsize,
    ceiling: usize,
}

impl AdmissionControl {
    pub fn new(ceiling: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            ceiling,
        })
    }

    /// Reserve a slot. At the ceiling this fails without touching the
    /// counter, so active calls keep their full resource share.
    pub fn try_acquire(self: Arc<Self>) -> Option<AdmissionPermit> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.ceiling).then_some(n + 1)
            })
            .ok()?;
        srv_metrics::set_active_sessions(self.active());
        Some(AdmissionPermit {
            control: self,
            released: AtomicBool::new(false),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// A reserved admission slot. Released exactly once, explicitly or on drop.
pub struct AdmissionPermit {
    control: Arc<AdmissionControl>,
    released: AtomicBool,
}

impl AdmissionPermit {
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.control.active.fetch_sub(1, Ordering::SeqCst);
            srv_metrics::set_active_sessions(self.control.active());
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release();
    }
}

/// Registry entry for a live call.
pub struct SessionHandle {
    pub tenant: String,
    /// Administrative close channel into the controller
    pub events: mpsc::Sender<CallEvent>,
    pub last_activity: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Session registry plus admission control.
pub struct SessionManager {
    admission: Arc<AdmissionControl>,
    sessions: DashMap<Uuid, SessionHandle>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            admission: AdmissionControl::new(max_sessions),
            sessions: DashMap::new(),
            idle_timeout,
        })
    }

    /// Admission check for a fresh handshake. A rejection is counted in its
    /// own metric, distinct from failures.
    pub fn try_admit(&self) -> Result<AdmissionPermit, ServerError> {
        match Arc::clone(&self.admission).try_acquire() {
            Some(permit) => Ok(permit),
            None => {
                srv_metrics::record_admission_rejected();
                tracing::warn!(
                    ceiling = self.admission.ceiling(),
                    "admission rejected, at capacity"
                );
                Err(ServerError::AdmissionRejected)
            }
        }
    }

    pub fn insert(&self, session_id: Uuid, handle: SessionHandle) {
        self.sessions.insert(session_id, handle);
    }

    pub fn remove(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }

    pub fn touch(&self, session_id: Uuid) {
        if let Some(handle) = self.sessions.get(&session_id) {
            handle.touch();
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active(&self) -> usize {
        self.admission.active()
    }

    pub fn capacity(&self) -> usize {
        self.admission.ceiling()
    }

    /// Start the idle sweep task. Sessions idle past the timeout get an
    /// administrative hangup; their controllers run the normal teardown.
    /// Returns a shutdown sender for the task.
    pub fn start_sweeper(self: Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let idle: Vec<(Uuid, mpsc::Sender<CallEvent>)> = manager
                            .sessions
                            .iter()
                            .filter(|entry| entry.idle_for() > manager.idle_timeout)
                            .map(|entry| (*entry.key(), entry.events.clone()))
                            .collect();
                        for (session_id, events) in idle {
                            tracing::info!(%session_id, "closing idle session");
                            let _ = events.try_send(CallEvent::Hangup);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

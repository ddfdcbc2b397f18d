//! # Keyed collection of supervisors with idle cleaning.
//!
//! [`ServerCollection`] maps keys to shared supervisors (`Arc<Mutex<Supervisor>>`).
//! Callers lock a supervisor while they talk to it; the idle cleaner skips
//! servers that are currently locked.
//!
//! ## Architecture
//! ```text
//! lookup_or_add(key, factory) ──► HashMap<String, Arc<Mutex<Supervisor<S>>>>
//!                                        ▲
//! spawn_cleaner(interval) ── tick ── clean_idle()
//!        │                               └─► idle_deadline() <= now && !locked
//!        │                                     └─► remove ─► stop() ─► IdleCleaned
//!        └─ CancellationToken ◄── cleanup() ◄── run_until_signal()
//! ```
//!
//! ## Rules
//! - The collection lock is never held across a `stop()`.
//! - Servers with `max_idle_time = 0` are never cleaned.
//! - `cleanup()` cancels the cleaner for good; the collection stays usable for lookups.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::escalation::StopTier;
use super::server::Server;
use super::shutdown;
use super::supervisor::Supervisor;
use crate::error::ServerError;
use crate::events::{Bus, Event, EventKind};

/// Handle to a supervisor stored in a [`ServerCollection`].
pub type SharedSupervisor<S> = Arc<Mutex<Supervisor<S>>>;

/// Keyed set of supervisors.
pub struct ServerCollection<S: Server> {
    servers: Mutex<HashMap<String, SharedSupervisor<S>>>,
    token: CancellationToken,
    bus: Option<Bus>,
}

impl<S: Server> ServerCollection<S> {
    /// Creates an empty collection.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            servers: Mutex::new(HashMap::new()),
            token: CancellationToken::new(),
            bus: None,
        })
    }

    /// Creates an empty collection publishing on `bus`.
    pub fn with_bus(bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            servers: Mutex::new(HashMap::new()),
            token: CancellationToken::new(),
            bus: Some(bus),
        })
    }

    /// Returns the supervisor stored under `key`, or stores the one built by `factory`.
    ///
    /// A new supervisor is started if `factory` did not start it. The returned
    /// server's last activity is refreshed (unless another caller holds it).
    pub async fn lookup_or_add<F>(
        &self,
        key: &str,
        factory: F,
    ) -> Result<SharedSupervisor<S>, ServerError>
    where
        F: FnOnce() -> Result<Supervisor<S>, ServerError>,
    {
        let mut servers = self.servers.lock().await;
        if let Some(existing) = servers.get(key) {
            let handle = Arc::clone(existing);
            drop(servers);
            if let Ok(mut sup) = handle.try_lock() {
                sup.touch();
            }
            return Ok(handle);
        }

        let mut sup = factory()?;
        if !sup.is_started() {
            sup.start()?;
        }
        sup.touch();
        let handle = Arc::new(Mutex::new(sup));
        servers.insert(key.to_string(), Arc::clone(&handle));
        drop(servers);

        self.publish(Event::new(EventKind::ServerAdded).with_server(key));
        Ok(handle)
    }

    /// Returns the supervisor stored under `key`.
    pub async fn get(&self, key: &str) -> Option<SharedSupervisor<S>> {
        self.servers.lock().await.get(key).cloned()
    }

    /// Removes the supervisor stored under `key` and stops it.
    ///
    /// Returns `Ok(None)` if nothing was stored or the server was not running.
    pub async fn delete(&self, key: &str) -> Result<Option<StopTier>, ServerError> {
        let Some(handle) = self.servers.lock().await.remove(key) else {
            return Ok(None);
        };
        let tier = stop_if_started(&handle).await?;
        self.publish(Event::new(EventKind::ServerRemoved).with_server(key));
        Ok(tier)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.servers.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.servers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.lock().await.is_empty()
    }

    /// Returns sorted keys.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.servers.lock().await.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Stops and removes every idle, unlocked server. Returns the cleaned keys.
    pub async fn clean_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let idle: Vec<(String, SharedSupervisor<S>)> = {
            let mut servers = self.servers.lock().await;
            let keys: Vec<String> = servers
                .iter()
                .filter_map(|(key, handle)| {
                    let sup = handle.try_lock().ok()?;
                    let deadline = sup.idle_deadline()?;
                    (deadline <= now).then(|| key.clone())
                })
                .collect();
            keys.into_iter()
                .filter_map(|key| servers.remove_entry(&key))
                .collect()
        };

        let mut cleaned = Vec::with_capacity(idle.len());
        for (key, handle) in idle {
            let max_idle = handle.lock().await.max_idle_time();
            if let Err(e) = stop_if_started(&handle).await {
                self.publish(
                    Event::new(EventKind::ServerExited)
                        .with_server(key.as_str())
                        .with_reason(e.to_string()),
                );
            }
            self.publish(
                Event::new(EventKind::IdleCleaned)
                    .with_server(key.as_str())
                    .with_timeout(max_idle),
            );
            cleaned.push(key);
        }
        cleaned
    }

    /// Runs [`clean_idle`](Self::clean_idle) every `interval` until cancelled.
    pub fn spawn_cleaner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let me = Arc::clone(self);
        let token = self.token.clone();
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        me.clean_idle().await;
                    }
                }
            }
        })
    }

    /// Cancels the cleaner, stops every server and empties the collection.
    pub async fn cleanup(&self) {
        self.token.cancel();
        let drained: Vec<(String, SharedSupervisor<S>)> =
            self.servers.lock().await.drain().collect();

        for (key, handle) in drained {
            let _ = stop_if_started(&handle).await;
            self.publish(Event::new(EventKind::ServerRemoved).with_server(key.as_str()));
        }
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT, then [`cleanup`](Self::cleanup).
    pub async fn run_until_signal(&self) -> io::Result<()> {
        shutdown::wait_for_shutdown_signal().await?;
        self.publish(Event::new(EventKind::ShutdownRequested));
        self.cleanup().await;
        Ok(())
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }
}

async fn stop_if_started<S: Server>(
    handle: &SharedSupervisor<S>,
) -> Result<Option<StopTier>, ServerError> {
    let mut sup = handle.lock().await;
    match sup.stop().await {
        Ok(tier) => Ok(Some(tier)),
        Err(ServerError::NotStarted) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server::Handlers;

    struct Idle;

    impl Server for Idle {
        fn register(_: &mut Handlers<Self>) {}
    }

    #[tokio::test]
    async fn empty_collection_queries() {
        let servers = ServerCollection::<Idle>::new();
        assert!(servers.is_empty().await);
        assert!(!servers.contains("a").await);
        assert!(servers.get("a").await.is_none());
        assert_eq!(servers.delete("a").await.unwrap(), None);
        assert!(servers.clean_idle().await.is_empty());
    }

    #[tokio::test]
    async fn factory_errors_store_nothing() {
        let servers = ServerCollection::<Idle>::new();
        let res = servers
            .lookup_or_add("a", || Err(ServerError::hook("factory", "nope")))
            .await;
        assert!(matches!(res, Err(ServerError::Hook { .. })));
        assert!(servers.keys().await.is_empty());
    }
}

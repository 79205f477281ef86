//! etcd-backed coordination service.
//!
//! Sessions are etcd leases and mutexes use etcd's lock service with the
//! session lease attached, so an owner whose lease lapses loses the mutex on
//! the server side. The etcd client is async; calls are driven to completion
//! on a private tokio runtime.
//!
//! etcd locks are owned per lease, so holders sharing one session would all
//! be let in. A local gate serializes holders of the same key inside this
//! process before the server lock is requested.

use super::{CoordinationService, HolderId, SessionId};
use crate::error::{MarklockError, Result};
use etcd_client::{Client, ConnectOptions, LockOptions};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
struct GateEntry {
    session: SessionId,
    holder: HolderId,
    /// Ownership key returned by the server once the lock is granted.
    lock_key: Option<Vec<u8>>,
}

/// Coordination service talking to an etcd cluster.
pub struct EtcdCoordinator {
    runtime: Runtime,
    client: Client,
    endpoints: Vec<String>,
    gate: Mutex<HashMap<String, GateEntry>>,
    changed: Condvar,
}

impl std::fmt::Debug for EtcdCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdCoordinator")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl EtcdCoordinator {
    /// Connect to `endpoints` and check that the cluster answers within
    /// `dial_timeout`.
    pub fn connect(endpoints: &[String], dial_timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| {
                MarklockError::Session(format!("failed to start coordinator runtime: {}", e))
            })?;

        let options = ConnectOptions::new().with_connect_timeout(dial_timeout);

        let dialed = runtime.block_on(async {
            tokio::time::timeout(dial_timeout, async {
                let mut client = Client::connect(endpoints, Some(options)).await?;
                client.status().await?;
                Ok::<_, etcd_client::Error>(client)
            })
            .await
        });

        let client = match dialed {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return Err(MarklockError::Session(format!(
                    "failed to connect to coordinator at {}: {}",
                    endpoints.join(","),
                    e
                )));
            }
            Err(_) => {
                return Err(MarklockError::Session(format!(
                    "coordinator at {} did not answer within {:?}",
                    endpoints.join(","),
                    dial_timeout
                )));
            }
        };

        Ok(Self {
            runtime,
            client,
            endpoints: endpoints.to_vec(),
            gate: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
        })
    }

    fn gate(&self) -> MutexGuard<'_, HashMap<String, GateEntry>> {
        self.gate.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Wait for the local gate on `key`, then claim it for `holder`.
    fn enter_gate(
        &self,
        session: SessionId,
        key: &str,
        holder: HolderId,
        started: Instant,
        deadline: Instant,
    ) -> Result<()> {
        let mut gate = self.gate();
        loop {
            match gate.get(key) {
                None => break,
                Some(entry) if entry.holder == holder => {
                    return Err(MarklockError::InvalidState(format!(
                        "mutex '{}' is already held by this holder",
                        key
                    )));
                }
                Some(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(MarklockError::Timeout {
                    key: key.to_string(),
                    waited: now.duration_since(started),
                });
            }
            gate = self
                .changed
                .wait_timeout(gate, deadline - now)
                .unwrap_or_else(|poison| poison.into_inner())
                .0;
        }

        gate.insert(
            key.to_string(),
            GateEntry {
                session,
                holder,
                lock_key: None,
            },
        );
        Ok(())
    }

    fn leave_gate(&self, key: &str) {
        self.gate().remove(key);
        self.changed.notify_all();
    }
}

/// etcd lease TTLs are whole seconds.
fn lease_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_millis().div_ceil(1000).max(1);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn lease_id(session: SessionId) -> i64 {
    session.0 as i64
}

impl CoordinationService for EtcdCoordinator {
    fn grant_session(&self, ttl: Duration) -> Result<SessionId> {
        if ttl.is_zero() {
            return Err(MarklockError::Session(
                "session TTL must be greater than zero".to_string(),
            ));
        }

        let mut client = self.client.clone();
        let granted = self
            .block_on(client.lease_grant(lease_seconds(ttl), None))
            .map_err(|e| MarklockError::Session(format!("failed to grant lease: {}", e)))?;
        Ok(SessionId(granted.id() as u64))
    }

    fn keep_alive(&self, session: SessionId) -> Result<()> {
        let mut client = self.client.clone();
        let renewed = self.block_on(async move {
            let (mut keeper, mut stream) = client.lease_keep_alive(lease_id(session)).await?;
            keeper.keep_alive().await?;
            Ok::<_, etcd_client::Error>(stream.message().await?.map(|resp| resp.ttl()))
        });

        match renewed {
            Ok(Some(ttl)) if ttl > 0 => Ok(()),
            Ok(_) => Err(MarklockError::Session(format!("{} lease expired", session))),
            Err(e) => Err(MarklockError::Session(format!(
                "failed to renew {}: {}",
                session, e
            ))),
        }
    }

    fn revoke_session(&self, session: SessionId) -> Result<()> {
        let mut client = self.client.clone();
        let revoked = self.block_on(client.lease_revoke(lease_id(session)));

        // Server-side locks die with the lease either way.
        self.gate().retain(|_, entry| entry.session != session);
        self.changed.notify_all();

        revoked
            .map(|_| ())
            .map_err(|e| MarklockError::Session(format!("failed to revoke {}: {}", session, e)))
    }

    fn acquire(
        &self,
        session: SessionId,
        key: &str,
        holder: HolderId,
        max_wait: Duration,
    ) -> Result<u64> {
        let started = Instant::now();
        let deadline = started + max_wait;
        self.enter_gate(session, key, holder, started, deadline)?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut client = self.client.clone();
        let options = LockOptions::new().with_lease(lease_id(session));
        let locked = self.block_on(async {
            tokio::time::timeout(
                remaining,
                client.lock(key.as_bytes().to_vec(), Some(options)),
            )
            .await
        });

        match locked {
            Ok(Ok(resp)) => {
                let token = resp
                    .header()
                    .map(|header| header.revision().max(0) as u64)
                    .unwrap_or(0);
                if let Some(entry) = self.gate().get_mut(key) {
                    entry.lock_key = Some(resp.key().to_vec());
                }
                Ok(token)
            }
            Ok(Err(e)) => {
                self.leave_gate(key);
                Err(MarklockError::Acquisition(format!(
                    "failed to lock '{}': {}",
                    key, e
                )))
            }
            Err(_) => {
                self.leave_gate(key);
                Err(MarklockError::Timeout {
                    key: key.to_string(),
                    waited: started.elapsed(),
                })
            }
        }
    }

    fn release(&self, session: SessionId, key: &str, holder: HolderId) -> Result<()> {
        let lock_key = match self.gate().get(key) {
            Some(entry) if entry.holder == holder && entry.session == session => {
                entry.lock_key.clone()
            }
            Some(_) => {
                return Err(MarklockError::Release(format!(
                    "mutex '{}' is owned by another holder (lease lost?)",
                    key
                )));
            }
            None => {
                return Err(MarklockError::Release(format!(
                    "mutex '{}' is not held",
                    key
                )));
            }
        };

        let unlocked = match lock_key {
            Some(lock_key) => {
                let mut client = self.client.clone();
                self.block_on(client.unlock(lock_key)).map(|_| ())
            }
            None => Ok(()),
        };
        self.leave_gate(key);

        unlocked
            .map_err(|e| MarklockError::Release(format!("failed to unlock '{}': {}", key, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_seconds_round_up() {
        assert_eq!(lease_seconds(Duration::from_millis(1)), 1);
        assert_eq!(lease_seconds(Duration::from_millis(1000)), 1);
        assert_eq!(lease_seconds(Duration::from_millis(1001)), 2);
        assert_eq!(lease_seconds(Duration::from_secs(10)), 10);
    }

    #[test]
    fn test_unreachable_cluster_fails_within_dial_timeout() {
        let started = Instant::now();
        let err = EtcdCoordinator::connect(
            &["http://127.0.0.1:1".to_string()],
            Duration::from_millis(300),
        )
        .unwrap_err();

        assert!(matches!(err, MarklockError::Session(_)));
        assert!(err.to_string().contains("127.0.0.1:1"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

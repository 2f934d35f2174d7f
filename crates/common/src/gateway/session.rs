use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::wallet::{Identity, Wallet};
use super::GatewayError;
use crate::contract::Operation;
use crate::ledger::{Network, Proposal};

/// A connection to the network on behalf of one identity
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    network: Arc<dyn Network>,
    proposals: u64,
}

impl Session {
    fn new(identity: Identity, network: Arc<dyn Network>) -> Self {
        Self {
            identity,
            network,
            proposals: 0,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn network(&self) -> Arc<dyn Network> {
        self.network.clone()
    }

    /// Proposals created over the lifetime of the session
    pub fn proposals(&self) -> u64 {
        self.proposals
    }

    pub fn proposal(&mut self, operation: Operation, args: Vec<String>) -> Proposal {
        self.proposals += 1;
        Proposal::new(self.identity.client_identity(), operation, args)
    }
}

/// One session per identity, shared by every request made under it.
///
/// A request holds its identity's session exclusively through a
///  [`SessionLease`] while it builds a proposal.
#[derive(Debug, Clone)]
pub struct SessionPool {
    wallet: Arc<dyn Wallet>,
    network: Arc<dyn Network>,
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<Session>>>>>,
    active: Arc<AtomicUsize>,
}

impl SessionPool {
    pub fn new(wallet: Arc<dyn Wallet>, network: Arc<dyn Network>) -> Self {
        Self {
            wallet,
            network,
            slots: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    /// Wait for exclusive use of the session of `label`, opening it on
    ///  first use. Fails with `Authentication` for labels the wallet
    ///  does not hold.
    pub async fn lease(&self, label: &str) -> Result<SessionLease, GatewayError> {
        let identity = self
            .wallet
            .get(label)
            .await?
            .ok_or_else(|| GatewayError::Authentication(label.to_string()))?;

        let slot = self
            .slots
            .lock()
            .entry(label.to_string())
            .or_insert_with(|| {
                tracing::debug!(label, "opening session");
                Arc::new(AsyncMutex::new(Session::new(
                    identity.clone(),
                    self.network.clone(),
                )))
            })
            .clone();

        let mut session = slot.lock_owned().await;
        if session.identity != identity {
            tracing::info!(label, "identity changed in wallet, refreshing session");
            session.identity = identity;
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(SessionLease {
            session,
            active: self.active.clone(),
        })
    }

    /// Leases currently held
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Sessions opened so far
    pub fn sessions(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Exclusive use of a session, released when dropped
#[derive(Debug)]
pub struct SessionLease {
    session: OwnedMutexGuard<Session>,
    active: Arc<AtomicUsize>,
}

impl SessionLease {
    pub fn close(self) {}
}

impl Deref for SessionLease {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

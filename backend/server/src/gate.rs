//! # Bootstrap Gate
//!
//! Decides whether the one-time "initial admin" registration is still open
//! and performs it.
//!
//! ## States
//!
//! Derived from the store on every call, never cached:
//! - **Virgin**: no users, exactly one superuser, and that superuser is the
//!   installer placeholder
//! - **Initialized**: anything else
//!
//! ## Transition
//!
//! Virgin -> Initialized by saving one user and one superuser with the same
//! credentials and deleting the placeholder, all in one store transaction.
//! There is no way back.
//!
//! ## Locking
//!
//! State checks and the transition share one mutex held across the entire
//! check-then-write sequence, including the store commit. Two concurrent
//! registrations therefore cannot both observe Virgin.
use std::{sync::Arc, time::Duration};

use argon2::Argon2;
use serde::Serialize;
use tokio::{
    sync::{Mutex, MutexGuard},
    time::timeout,
};
use tracing::{error, info, warn};

use crate::{
    accounts::{AccountKind, Credentials, ProvisionedIdentity},
    auth::AuthContext,
    error::GateError,
    migrations::PLACEHOLDER_EMAIL,
    store::{Collection, Record, RecordStore, StoreError, Transaction},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    Virgin { placeholder: Record },
    Initialized(Initialized),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initialized {
    UsersExist,
    SuperuserCount(usize),
    ForeignSuperuser(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub can_bootstrap: bool,
}

pub struct BootstrapGate {
    store: Arc<dyn RecordStore>,
    hasher: Argon2<'static>,
    lock: Mutex<()>,
    lock_timeout: Option<Duration>,
}

fn store_failure(step: &'static str) -> impl FnOnce(StoreError) -> GateError {
    move |source| {
        error!("Bootstrap gate failed to {step}: {source}");
        GateError::Store { step, source }
    }
}

impl BootstrapGate {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            hasher: Argon2::default(),
            lock: Mutex::new(()),
            lock_timeout: None,
        }
    }

    pub fn with_hasher(mut self, hasher: Argon2<'static>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Bounds how long a call waits for the gate before failing with
    /// [`GateError::Busy`]. Unbounded by default.
    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>, GateError> {
        match self.lock_timeout {
            Some(limit) => timeout(limit, self.lock.lock()).await.map_err(|_| {
                warn!("Timed out after {limit:?} waiting for the bootstrap gate");
                GateError::Busy
            }),
            None => Ok(self.lock.lock().await),
        }
    }

    /// Must be called with the gate lock held.
    async fn inspect(&self, _guard: &MutexGuard<'_, ()>) -> Result<BootstrapState, GateError> {
        let users = self
            .store
            .count(Collection::Users)
            .await
            .map_err(store_failure("count users"))?;
        if users > 0 {
            return Ok(BootstrapState::Initialized(Initialized::UsersExist));
        }

        let mut superusers = self
            .store
            .find_all(Collection::Superusers)
            .await
            .map_err(store_failure("list superusers"))?;
        if superusers.len() != 1 {
            return Ok(BootstrapState::Initialized(Initialized::SuperuserCount(
                superusers.len(),
            )));
        }

        let placeholder = superusers.remove(0);
        if placeholder.email != PLACEHOLDER_EMAIL {
            return Ok(BootstrapState::Initialized(Initialized::ForeignSuperuser(
                placeholder.email,
            )));
        }

        Ok(BootstrapState::Virgin { placeholder })
    }

    pub async fn state(&self) -> Result<BootstrapState, GateError> {
        let guard = self.acquire().await?;
        self.inspect(&guard).await
    }

    /// `true` once the install has been initialized. Unexpected superuser
    /// setups also count as initialized.
    pub async fn check_exists(&self) -> Result<bool, GateError> {
        let state = self.state().await?;

        Ok(!matches!(state, BootstrapState::Virgin { .. }))
    }

    pub async fn create_first_user(
        &self,
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<(), GateError> {
        let credentials = Credentials::validate(email, password, password_confirm)?;

        let guard = self.acquire().await?;

        // Re-checked under the lock; an earlier check_exists may be stale.
        let placeholder = match self.inspect(&guard).await? {
            BootstrapState::Virgin { placeholder } => placeholder,
            BootstrapState::Initialized(Initialized::UsersExist) => {
                warn!("Rejected bootstrap for {email}: users already exist");
                return Err(GateError::Conflict("users already exist"));
            }
            BootstrapState::Initialized(Initialized::SuperuserCount(count)) => {
                warn!("Rejected bootstrap for {email}: {count} superusers");
                return Err(GateError::Conflict("unexpected superuser count"));
            }
            BootstrapState::Initialized(Initialized::ForeignSuperuser(found)) => {
                error!("Sole superuser {found} is not the placeholder {PLACEHOLDER_EMAIL}");
                return Err(GateError::Inconsistency { found });
            }
        };

        let user = ProvisionedIdentity::new(AccountKind::Normal, &credentials, &self.hasher)?;
        let superuser = ProvisionedIdentity::new(AccountKind::Elevated, &credentials, &self.hasher)?;

        let transaction = Transaction::new()
            .save(user.into_record())
            .save(superuser.into_record())
            .delete(Collection::Superusers, placeholder.id);

        self.store
            .commit(transaction)
            .await
            .map_err(store_failure("commit bootstrap transaction"))?;

        drop(guard);

        info!("Registered initial admin {}", credentials.email());

        Ok(())
    }

    /// Bootstrap is offered only to anonymous callers while registration is
    /// enabled. Store failures are returned, not folded into `false`.
    pub async fn is_authenticated(
        &self,
        auth: &impl AuthContext,
        registration_enabled: bool,
    ) -> Result<AuthStatus, GateError> {
        let authenticated = auth.is_authenticated();

        let can_bootstrap = if authenticated || !registration_enabled {
            false
        } else {
            !self.check_exists().await?
        };

        Ok(AuthStatus {
            authenticated,
            can_bootstrap,
        })
    }
}

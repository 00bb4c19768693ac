//! # Setup
//!
//! Operator commands run against a live store, outside the server.
//!
//! - `migrate`: seed the placeholder superuser on a fresh install
//! - `status`: report the bootstrap state and account counts
use std::sync::Arc;

use argon2::Argon2;
use tracing::info;

use stack::{
    gate::{BootstrapGate, BootstrapState, Initialized},
    migrations::ensure_placeholder_superuser,
    store::{Collection, RecordStore},
};

pub async fn migrate(store: Arc<dyn RecordStore>, hasher: &Argon2<'_>) -> anyhow::Result<()> {
    let created = ensure_placeholder_superuser(store.as_ref(), hasher).await?;
    info!(created, "Initial migration finished");

    if created {
        println!("Placeholder superuser created.");
    } else {
        println!("Superusers already present, nothing to do.");
    }

    Ok(())
}

pub fn describe(state: &BootstrapState) -> String {
    match state {
        BootstrapState::Virgin { .. } => "open: waiting for the initial admin".to_string(),
        BootstrapState::Initialized(Initialized::UsersExist) => {
            "closed: users already exist".to_string()
        }
        BootstrapState::Initialized(Initialized::SuperuserCount(count)) => {
            format!("closed: {count} superusers instead of the placeholder")
        }
        BootstrapState::Initialized(Initialized::ForeignSuperuser(email)) => {
            format!("closed: sole superuser is {email}, not the placeholder")
        }
    }
}

pub async fn status(store: Arc<dyn RecordStore>) -> anyhow::Result<()> {
    let users = store.count(Collection::Users).await?;
    let superusers = store.count(Collection::Superusers).await?;
    let state = BootstrapGate::new(store).state().await?;
    info!(users, superusers, "Bootstrap {}", describe(&state));

    println!("Users: {users}");
    println!("Superusers: {superusers}");
    println!("Bootstrap: {}", describe(&state));

    Ok(())
}

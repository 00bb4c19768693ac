//! # Initial Migration
//!
//! The store needs at least one superuser from the very first start, before a
//! real admin exists. A placeholder superuser with a fixed email and a random
//! credential fills that slot until the bootstrap gate replaces it.
//!
//! The placeholder always has the same id and is written insert-if-absent, so
//! seeds racing each other (two replicas starting, `setup migrate` during
//! startup) leave a single placeholder.
use argon2::Argon2;
use tracing::{debug, info};

use crate::{
    accounts::hash_password,
    error::MigrationError,
    store::{Collection, Record, RecordStore},
    utils::random_secret,
};

/// Email of the placeholder superuser. The bootstrap gate only recognizes a
/// fresh install by this address.
pub const PLACEHOLDER_EMAIL: &str = "__pbinstaller@example.com";

/// Record id of the placeholder superuser.
pub const PLACEHOLDER_ID: &str = "pbinstaller0000";

const PLACEHOLDER_SECRET_LEN: usize = 32;

/// Returns whether this call created the placeholder.
pub async fn ensure_placeholder_superuser(
    store: &dyn RecordStore,
    hasher: &Argon2<'_>,
) -> Result<bool, MigrationError> {
    if store.count(Collection::Superusers).await? > 0 {
        debug!("Superusers present, skipping placeholder");
        return Ok(false);
    }

    let password_hash = hash_password(hasher, &random_secret(PLACEHOLDER_SECRET_LEN))?;
    let mut placeholder = Record::new(Collection::Superusers, PLACEHOLDER_EMAIL, password_hash);
    placeholder.id = PLACEHOLDER_ID.to_string();

    if !store.insert(placeholder).await? {
        debug!("Placeholder superuser written by another seed");
        return Ok(false);
    }

    info!("Created placeholder superuser {PLACEHOLDER_EMAIL}");

    Ok(true)
}

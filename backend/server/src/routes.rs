use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    accounts::{verify_hash, verify_password},
    auth::Caller,
    error::AppError,
    state::AppState,
    store::{Collection, Record},
    utils::parse_json,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_confirm: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    /// Account kind to sign in as. Without it users are tried before
    /// superusers, since a bootstrapped admin has one of each.
    #[serde(default)]
    collection: Option<Collection>,
}

#[derive(Serialize)]
pub struct ExistsResponse {
    exists: bool,
}

#[derive(Serialize)]
pub struct BootstrapResponse {
    success: bool,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    collection: Collection,
}

fn ensure_registration_enabled(state: &AppState) -> Result<(), AppError> {
    if state.config.initial_admin_registration {
        Ok(())
    } else {
        Err(AppError::RegistrationDisabled)
    }
}

pub async fn exists_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    ensure_registration_enabled(&state)?;

    let exists = state.gate.check_exists().await?;

    Ok(Json(ExistsResponse { exists }))
}

pub async fn bootstrap_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    ensure_registration_enabled(&state)?;

    let payload: BootstrapRequest = parse_json(&body)?;
    state
        .gate
        .create_first_user(&payload.email, &payload.password, &payload.password_confirm)
        .await?;

    Ok((StatusCode::OK, Json(BootstrapResponse { success: true })))
}

pub async fn auth_status_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    if let Some(claims) = caller.claims() {
        debug!("Auth status for {} in {}", claims.sub, claims.collection);
    }

    let status = state
        .gate
        .is_authenticated(&caller, state.config.initial_admin_registration)
        .await?;

    Ok(Json(status))
}

async fn find_account(
    state: &AppState,
    email: &str,
    collection: Option<Collection>,
) -> Result<Option<Record>, AppError> {
    let collections = match collection {
        Some(collection) => vec![collection],
        None => Collection::ALL.to_vec(),
    };

    for collection in collections {
        if let Some(record) = state.store.find_by_email(collection, email).await? {
            return Ok(Some(record));
        }
    }

    Ok(None)
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload: LoginRequest = parse_json(&body)?;

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::InvalidCredentials);
    }

    let record = match find_account(&state, &payload.email, payload.collection).await? {
        Some(record) if verify_password(&record, &payload.password) => record,
        Some(_) => return Err(AppError::InvalidCredentials),
        None => {
            verify_hash(&state.dummy_hash, &payload.password);
            return Err(AppError::InvalidCredentials);
        }
    };

    let ttl = Duration::from_std(state.config.token_ttl).unwrap_or(Duration::days(14));
    let token = state.tokens.issue(&record, ttl)?;

    info!("{} signed in to {}", record.email, record.collection);

    Ok(Json(LoginResponse {
        token,
        collection: record.collection,
    }))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

//! HTTP routes
//!
//! Everything except `/health` requires a bearer token. The activation
//! endpoint is a thin shell around the orchestrator: deserialize the tagged
//! request, inject today's date, translate the outcome.

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::json;

use streambill_core::provisioning::ProvisioningClient;
use streambill_core::requests::ActivationRequest;
use streambill_core::{ActivationOutcome, CoreError};

use crate::auth::{require_auth, revocation, AuthUser, Claims};
use crate::error::ApiResult;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/activations", post(activate))
        .route("/api/policy/accept", post(accept_policy))
        .route("/api/credentials", get(credentials))
        .route("/api/credentials/rotate", post(rotate_credentials))
        .route("/api/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Run one activation (new or renewal, per the request's `kind` tag)
async fn activate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ActivationRequest>,
) -> ApiResult<(StatusCode, Json<ActivationOutcome>)> {
    let today = chrono::Utc::now().date_naive();
    tracing::info!(
        user_id = user.user_id,
        contact_id = request.body().contact_id,
        plan_id = request.body().plan_id,
        renewal = request.is_renewal(),
        "Activation requested"
    );

    let outcome = state.activation.activate(&request, today).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Record policy acceptance for the caller. First acceptance wins; repeat
/// calls succeed without touching the stored timestamp.
async fn accept_policy(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let account = state
        .vault
        .account(user.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("no account for user {}", user.user_id)))?;

    let newly_accepted = state.vault.mark_policy_accepted(user.user_id).await?;
    Ok(Json(json!({
        "accepted": true,
        "alreadyAccepted": !newly_accepted && account.policy_accepted_at.is_some(),
    })))
}

/// Reveal the caller's playback credentials
async fn credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let password = state.vault.reveal(user.user_id).await?;
    let login = format!("{}{}", state.config.ott.customer_prefix, user.user_id);
    Ok(Json(json!({
        "login": login,
        "password": password,
    })))
}

/// Generate a fresh playback password, push it to the provisioning platform,
/// then re-encrypt the vault record. The remote write goes first so the vault
/// never holds a credential the platform rejected.
async fn rotate_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .vault
        .account(user.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("no account for user {}", user.user_id)))?;

    let password = streambill_core::password::generate_password();
    let login = format!("{}{}", state.config.ott.customer_prefix, user.user_id);

    state
        .provisioning
        .update_password(&login, &password)
        .await?;
    state.vault.rotate(user.user_id, &password).await?;

    tracing::info!(user_id = user.user_id, "Playback credential rotated");
    Ok(Json(json!({
        "login": login,
        "password": password,
    })))
}

/// Revoke the caller's token
async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    let claims = Claims {
        sub: user.user_id,
        jti: user.jti.clone(),
        iat: 0,
        exp: user.exp,
    };
    revocation::revoke_token(&state.pool, &claims, "logout").await?;
    Ok(StatusCode::NO_CONTENT)
}

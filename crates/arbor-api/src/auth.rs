use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use arbor_crypto::password::{derive_key, hash_password, verify_password};
use arbor_db::models::UserRow;
use arbor_types::api::{LoginRequest, RegisterRequest};
use arbor_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::{AppState, now_timestamp, run_blocking, stored_uuid};

/// Salt used to burn one derivation when the email is unknown, so both
/// login rejections take the same time.
const DUMMY_SALT: &str = "00000000000000000000000000000000";

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    let user_name = req.user_name.trim().to_string();
    let user_email = normalize_email(&req.user_email);
    if user_name.chars().count() < 3 || user_name.chars().count() > 32 {
        return Err(ApiError::bad_request("userName must be 3 to 32 characters"));
    }
    if !is_plausible_email(&user_email) {
        return Err(ApiError::bad_request("userEmail is not a valid email address"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    // Check if the email is taken
    let db = state.clone();
    let lookup = user_email.clone();
    if run_blocking(move || db.db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("email already registered".into()));
    }

    let password = req.password;
    let digest = run_blocking(move || Ok(hash_password(&password)?)).await?;

    let user = UserRow {
        id: Uuid::new_v4().to_string(),
        user_name,
        user_email,
        password_hash: digest.hash,
        salt: digest.salt,
        created_at: now_timestamp(),
    };

    // A concurrent registration may have claimed the email since the check above
    let db = state.clone();
    let stored = user.clone();
    if !run_blocking(move || db.db.create_user(&stored)).await? {
        return Err(ApiError::Conflict("email already registered".into()));
    }

    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user_from_row(user))))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<User>> {
    let db = state.clone();
    let email = normalize_email(&req.user_email);
    let user = run_blocking(move || db.db.get_user_by_email(&email)).await?;

    // Verify password
    let password = req.password;
    let verified = run_blocking(move || match user {
        Some(user) => {
            let ok = verify_password(&password, &user.password_hash, &user.salt)?;
            Ok(ok.then_some(user))
        }
        None => {
            let _ = derive_key(&password, DUMMY_SALT);
            Ok(None)
        }
    })
    .await?;

    let Some(user) = verified else {
        warn!("Rejected login attempt");
        return Err(ApiError::InvalidCredentials);
    };

    info!("User {} logged in", user.id);
    Ok(Json(user_from_row(user)))
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn user_from_row(row: UserRow) -> User {
    User {
        id: stored_uuid(&row.id, "user id"),
        user_name: row.user_name,
        user_email: row.user_email,
    }
}

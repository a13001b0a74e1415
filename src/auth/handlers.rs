use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            GetUserResponse, LoginRequest, LoginResponse, LogoutResponse, RefreshRequest,
            RefreshResponse, RegisterRequest, RegisterResponse, ValidateTokenRequest,
            ValidateTokenResponse,
        },
        error::AuthError,
        extractors::AuthUser,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/validate", post(validate_token))
        .route("/auth/refresh", post(refresh))
        .route("/auth/users/:user_id", get(get_user))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AuthError> {
    let user = state
        .auth
        .register(&payload.email, &payload.password, &payload.name)
        .await?;
    Ok(Json(RegisterResponse {
        user_id: user.id,
        email: user.email,
        name: user.name,
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let (pair, user) = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        user: user.into(),
    }))
}

pub async fn logout(State(state): State<AppState>) -> Json<LogoutResponse> {
    Json(LogoutResponse {
        success: state.auth.logout(),
    })
}

/// Never fails: a rejected token is reported as `valid: false`.
#[instrument(skip(state, payload))]
pub async fn validate_token(
    State(state): State<AppState>,
    Json(payload): Json<ValidateTokenRequest>,
) -> Json<ValidateTokenResponse> {
    let user_id = state.auth.validate_token(&payload.token).ok();
    Json(ValidateTokenResponse {
        valid: user_id.is_some(),
        user_id,
    })
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let pair = state.auth.refresh(&payload.refresh_token)?;
    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        expires_in: pair.expires_in,
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<GetUserResponse>, AuthError> {
    let user = state.auth.get_user(&user_id).await?;
    Ok(Json(GetUserResponse { user: user.into() }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<GetUserResponse>, AuthError> {
    let user = state.auth.get_user(&user_id.to_string()).await?;
    Ok(Json(GetUserResponse { user: user.into() }))
}

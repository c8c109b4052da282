//! Auth routes: signup, login, token refresh, email confirmation, logout.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::{FormBody, JsonBody, PathParam};
use crate::repository::users::{self, NewUser, User, UserDraft};
use crate::repository::ValidationErrors;
use crate::services::auth::{self as auth_svc, AuthError};
use crate::services::email::mask_email;
use crate::services::roles::Role;
use crate::state::AppState;

pub const SIGNUP_DETAIL: &str = "User successfully created. Check your email for confirmation.";
pub const CHECK_EMAIL_MESSAGE: &str = "Check your email for confirmation.";

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user resolved from an `Authorization: Bearer` access token.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: User,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let app_state = AppState::from_ref(state);
        let email = app_state.tokens.decode_access_token(&token)?;
        let user = users::get_user_by_email(&app_state.pool, &email)
            .await?
            .ok_or_else(invalid_credentials)?;
        Ok(Self { user })
    }
}

/// Bearer token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &axum::http::HeaderMap) -> Result<String, ApiError> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_owned())
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_owned()))
}

fn invalid_credentials() -> ApiError {
    ApiError::from(AuthError::InvalidToken)
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub confirmed: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar: user.avatar,
            role: user.role,
            confirmed: user.confirmed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: UserResponse,
    pub detail: &'static str,
}

/// OAuth2 password-form body; `username` carries the email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestEmail {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/auth/signup`: create an account and mail the confirmation link.
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(draft): JsonBody<UserDraft>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let valid = draft.validate()?;
    if users::get_user_by_email(&state.pool, &valid.email).await?.is_some() {
        return Err(ApiError::Conflict("Account already exists".to_owned()));
    }

    let password_hash = auth_svc::hash_password(&valid.password)?;
    let user = users::create_user(
        &state.pool,
        &NewUser { username: valid.username, email: valid.email, password_hash },
    )
    .await?;
    tracing::info!(user_id = user.id, role = %user.role, "user signed up");

    dispatch_confirmation(&state, user.email.clone(), user.username.clone());
    Ok((StatusCode::CREATED, Json(SignupResponse { user: user.into(), detail: SIGNUP_DETAIL })))
}

/// `POST /api/auth/login`: exchange email + password for a token pair.
pub async fn login(State(state): State<AppState>, FormBody(form): FormBody<LoginForm>) -> Result<Json<TokenResponse>, ApiError> {
    let invalid_email = || ApiError::Unauthorized("Invalid email".to_owned());

    let email = auth_svc::normalize_email(&form.username).ok_or_else(invalid_email)?;
    let user = users::get_user_by_email(&state.pool, &email)
        .await?
        .ok_or_else(invalid_email)?;
    // Password first: confirmation state is only revealed to the owner.
    if !auth_svc::verify_password(&form.password, &user.password) {
        return Err(ApiError::Unauthorized("Invalid password".to_owned()));
    }
    if !user.confirmed {
        return Err(ApiError::Unauthorized("Email not confirmed".to_owned()));
    }

    let tokens = issue_pair(&state, &user).await?;
    tracing::info!(user_id = user.id, "login");
    Ok(Json(tokens))
}

/// `GET /api/auth/refresh_token`: rotate the pair using the stored refresh token.
/// Presenting any other refresh token revokes the stored one.
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let email = state.tokens.decode_refresh_token(&token)?;
    let user = users::get_user_by_email(&state.pool, &email)
        .await?
        .ok_or_else(invalid_credentials)?;

    if user.refresh_token.as_deref() != Some(token.as_str()) {
        users::update_token(&state.pool, user.id, None).await?;
        tracing::warn!(user_id = user.id, "refresh token mismatch; stored token revoked");
        return Err(ApiError::Unauthorized("Invalid refresh token".to_owned()));
    }

    Ok(Json(issue_pair(&state, &user).await?))
}

/// `GET /api/auth/confirmed_email/{token}`
pub async fn confirmed_email(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = state
        .tokens
        .email_from_token(&token)
        .map_err(|_| ApiError::Unprocessable("Invalid token for email verification".to_owned()))?;
    let user = users::get_user_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Verification error".to_owned()))?;

    if user.confirmed {
        return Ok(Json(MessageResponse { message: "Your email is already confirmed" }));
    }
    users::confirmed_email(&state.pool, &email).await?;
    tracing::info!(user_id = user.id, "email confirmed");
    Ok(Json(MessageResponse { message: "Email confirmed" }))
}

/// `POST /api/auth/request_email`: re-send the confirmation link. Answers the
/// same way whether or not the address is registered.
pub async fn request_email(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RequestEmail>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(email) = auth_svc::normalize_email(&body.email) else {
        let mut errors = ValidationErrors::default();
        errors.push("email", "must be a valid email address");
        return Err(errors.into());
    };

    if let Some(user) = users::get_user_by_email(&state.pool, &email).await? {
        if !user.confirmed {
            dispatch_confirmation(&state, user.email, user.username);
        }
    }
    Ok(Json(MessageResponse { message: CHECK_EMAIL_MESSAGE }))
}

/// `POST /api/auth/logout`: revoke the stored refresh token.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Result<StatusCode, ApiError> {
    users::update_token(&state.pool, auth.user.id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`
pub async fn me(auth: AuthUser) -> Json<UserResponse> {
    Json(auth.user.into())
}

// =============================================================================
// HELPERS
// =============================================================================

async fn issue_pair(state: &AppState, user: &User) -> Result<TokenResponse, ApiError> {
    let access_token = state.tokens.create_access_token(&user.email, None)?;
    let refresh_token = state.tokens.create_refresh_token(&user.email, None)?;
    users::update_token(&state.pool, user.id, Some(&refresh_token)).await?;
    Ok(TokenResponse { access_token, refresh_token, token_type: "bearer".to_owned() })
}

/// Send the confirmation email off the request path. Without SMTP the link
/// is logged so a developer can still confirm the account.
pub(crate) fn dispatch_confirmation(state: &AppState, email: String, username: String) {
    let host = state.public_base_url.clone();
    let Some(service) = state.email.clone() else {
        match state.tokens.create_email_token(&email) {
            Ok(token) => tracing::warn!(
                to = %mask_email(&email),
                link = %confirmation_link(&host, &token),
                "smtp not configured; confirmation email not sent"
            ),
            Err(e) => tracing::error!(error = %e, "email token signing failed"),
        }
        return;
    };

    tokio::spawn(async move {
        match service.send_confirmation(&email, &username, &host).await {
            Ok(()) => tracing::info!(to = %mask_email(&email), "confirmation email sent"),
            Err(e) => tracing::error!(error = %e, to = %mask_email(&email), "confirmation email failed"),
        }
    });
}

pub(crate) fn confirmation_link(host: &str, token: &str) -> String {
    format!("{}/api/auth/confirmed_email/{token}", host.trim_end_matches('/'))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

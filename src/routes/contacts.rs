//! Contact routes. Every handler authenticates, checks the caller's role and
//! validates its input. Only then do the read and create paths charge the
//! per-user rate limit, so rejected requests cost nothing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::repository::contacts::{self, Contact, ContactDraft, ContactFilter, format_birthday};
use crate::repository::{Page, ValidationErrors};
use crate::services::roles::{self, ensure_role};
use crate::state::AppState;

pub const EMPTY_SEARCH_DETAIL: &str = "Contacts with requested parameters not found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    /// `YYYY-MM-DD`
    pub birthday: String,
    pub additional_data: String,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            birthday: format_birthday(contact.birthday),
            first_name: contact.first_name,
            last_name: contact.last_name,
            email: contact.email,
            phone_number: contact.phone_number,
            additional_data: contact.additional_data,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validate `limit`/`offset`, applying defaults.
pub(crate) fn page_from(limit: Option<i64>, offset: Option<i64>) -> Result<Page, ApiError> {
    let limit = limit.unwrap_or(Page::DEFAULT_LIMIT);
    let offset = offset.unwrap_or(0);

    let mut errors = ValidationErrors::default();
    if !(1..=Page::MAX_LIMIT).contains(&limit) {
        errors.push("limit", format!("must be between 1 and {}", Page::MAX_LIMIT));
    }
    if offset < 0 {
        errors.push("offset", "must be greater than or equal to 0");
    }
    errors.into_result(Page { limit, offset }).map_err(ApiError::from)
}

pub(crate) fn check_contact_id(contact_id: i64) -> Result<i64, ApiError> {
    if contact_id < 1 {
        let mut errors = ValidationErrors::default();
        errors.push("contact_id", "must be greater than or equal to 1");
        return Err(errors.into());
    }
    Ok(contact_id)
}

fn responses(rows: Vec<Contact>) -> Json<Vec<ContactResponse>> {
    Json(rows.into_iter().map(ContactResponse::from).collect())
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/contacts`: list or search the caller's contacts.
pub async fn list_contacts(
    State(state): State<AppState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    ensure_role(auth.user.role, roles::CONTACTS_READ)?;
    let page = page_from(query.limit, query.offset)?;
    state.rate_limiter.check_and_record(auth.user.id)?;

    let filter = ContactFilter::new(
        query.first_name.as_deref(),
        query.last_name.as_deref(),
        query.email.as_deref(),
    );
    tracing::debug!(user_id = auth.user.id, filtered = !filter.is_empty(), ?page, "listing contacts");
    let rows = contacts::list_contacts(&state.pool, auth.user.id, &filter, page).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(EMPTY_SEARCH_DETAIL.to_owned()));
    }
    Ok(responses(rows))
}

/// `GET /api/contacts/birthdays`: contacts with a birthday in the next week.
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    ensure_role(auth.user.role, roles::CONTACTS_READ)?;
    let page = page_from(query.limit, query.offset)?;
    state.rate_limiter.check_and_record(auth.user.id)?;

    let today = OffsetDateTime::now_utc().date();
    let rows = contacts::upcoming_birthdays(&state.pool, auth.user.id, today, page).await?;
    if rows.is_empty() {
        return Err(ApiError::not_found());
    }
    Ok(responses(rows))
}

/// `GET /api/contacts/{contact_id}`
pub async fn get_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParam(contact_id): PathParam<i64>,
) -> Result<Json<ContactResponse>, ApiError> {
    ensure_role(auth.user.role, roles::CONTACTS_READ)?;
    let contact_id = check_contact_id(contact_id)?;
    state.rate_limiter.check_and_record(auth.user.id)?;

    let contact = contacts::get_contact(&state.pool, auth.user.id, contact_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(Json(contact.into()))
}

/// `POST /api/contacts`
pub async fn create_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(draft): JsonBody<ContactDraft>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiError> {
    ensure_role(auth.user.role, roles::CONTACTS_CREATE)?;
    let input = draft.validate()?;
    state.rate_limiter.check_and_record(auth.user.id)?;

    let contact = contacts::create_contact(&state.pool, auth.user.id, &input).await?;
    tracing::info!(user_id = auth.user.id, contact_id = contact.id, "contact created");
    Ok((StatusCode::CREATED, Json(contact.into())))
}

/// `PUT /api/contacts/{contact_id}`: full replace.
pub async fn update_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParam(contact_id): PathParam<i64>,
    JsonBody(draft): JsonBody<ContactDraft>,
) -> Result<Json<ContactResponse>, ApiError> {
    ensure_role(auth.user.role, roles::CONTACTS_UPDATE)?;
    let contact_id = check_contact_id(contact_id)?;
    let input = draft.validate()?;

    let contact = contacts::update_contact(&state.pool, auth.user.id, contact_id, &input)
        .await?
        .ok_or_else(ApiError::not_found)?;
    Ok(Json(contact.into()))
}

/// `DELETE /api/contacts/{contact_id}`
pub async fn remove_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParam(contact_id): PathParam<i64>,
) -> Result<StatusCode, ApiError> {
    ensure_role(auth.user.role, roles::CONTACTS_DELETE)?;
    let contact_id = check_contact_id(contact_id)?;

    contacts::remove_contact(&state.pool, auth.user.id, contact_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    tracing::info!(user_id = auth.user.id, contact_id, "contact removed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "contacts_test.rs"]
mod tests;

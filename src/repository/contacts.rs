//! Contacts repository.
//!
//! DESIGN
//! ======
//! Contacts are only ever addressed through `(user_id, contact_id)`; a row
//! owned by someone else is indistinguishable from a missing one. Names are
//! stored capitalized and emails lower-cased, and filters apply the same
//! normalization so lookups are effectively case-insensitive.
//!
//! Search filters combine with OR: a contact matching any supplied field is
//! returned once.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::macros::format_description;
use time::{Date, Duration};

use super::{Page, RepoError, ValidationErrors};

pub const BIRTHDAY_WINDOW_DAYS: i64 = 7;

const CONTACT_COLUMNS: &str = "id, first_name, last_name, email, phone_number, birthday, additional_data, user_id";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Contact {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: Date,
    pub additional_data: String,
    pub user_id: i64,
}

/// Request body for create and full update, as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: String,
    #[serde(default)]
    pub additional_data: String,
}

/// Validated, normalized contact fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: Date,
    pub additional_data: String,
}

impl ContactDraft {
    /// Check field bounds, parse the birthday and normalize case.
    ///
    /// # Errors
    ///
    /// Returns every violated rule at once.
    pub fn validate(&self) -> Result<ContactInput, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let first_name = capitalize(&self.first_name);
        let last_name = capitalize(&self.last_name);
        let email = self.email.trim().to_lowercase();
        let phone_number = self.phone_number.trim().to_owned();

        errors.check_len("first_name", &first_name, 3, 16);
        errors.check_len("last_name", &last_name, 3, 16);
        errors.check_len("email", &email, 10, 150);
        errors.check_len("phone_number", &phone_number, 9, 16);

        let birthday = parse_birthday(&self.birthday);
        if birthday.is_none() {
            errors.push("birthday", "must be a date in YYYY-MM-DD format");
        }

        let Some(birthday) = birthday else {
            return Err(errors);
        };
        errors.into_result(ContactInput {
            first_name,
            last_name,
            email,
            phone_number,
            birthday,
            additional_data: self.additional_data.clone(),
        })
    }
}

/// Optional search fields; blanks are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl ContactFilter {
    #[must_use]
    pub fn new(first_name: Option<&str>, last_name: Option<&str>, email: Option<&str>) -> Self {
        Self {
            first_name: non_blank(first_name).map(capitalize),
            last_name: non_blank(last_name).map(capitalize),
            email: non_blank(email).map(|v| v.trim().to_lowercase()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses().is_empty()
    }

    /// `(column, value)` pairs for every supplied field.
    #[must_use]
    pub fn clauses(&self) -> Vec<(&'static str, &str)> {
        [("first_name", &self.first_name), ("last_name", &self.last_name), ("email", &self.email)]
            .into_iter()
            .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
            .collect()
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `"tARAS"` -> `"Taras"`.
#[must_use]
pub fn capitalize(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[must_use]
pub fn parse_birthday(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).ok()
}

#[must_use]
pub fn format_birthday(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

// =============================================================================
// BIRTHDAYS
// =============================================================================

/// The birthday's calendar date in `year`. Feb 29 falls back to Feb 28.
fn anniversary(birthday: Date, year: i32) -> Option<Date> {
    Date::from_calendar_date(year, birthday.month(), birthday.day())
        .or_else(|_| Date::from_calendar_date(year, birthday.month(), birthday.day() - 1))
        .ok()
}

/// Whether the next occurrence of `birthday` lies within `[today, today + days]`.
#[must_use]
pub fn birthday_within(birthday: Date, today: Date, days: i64) -> bool {
    let Some(this_year) = anniversary(birthday, today.year()) else {
        return false;
    };
    let next = if this_year < today {
        match anniversary(birthday, today.year() + 1) {
            Some(date) => date,
            None => return false,
        }
    } else {
        this_year
    };
    next - today <= Duration::days(days)
}

// =============================================================================
// QUERIES
// =============================================================================

/// List the user's contacts, optionally narrowed by any of the filter fields.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_contacts(
    pool: &PgPool,
    user_id: i64,
    filter: &ContactFilter,
    page: Page,
) -> Result<Vec<Contact>, RepoError> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = "));
    builder.push_bind(user_id);

    let clauses = filter.clauses();
    if !clauses.is_empty() {
        builder.push(" AND (");
        {
            let mut separated = builder.separated(" OR ");
            for (column, value) in clauses {
                separated.push(format!("{column} = "));
                separated.push_bind_unseparated(value.to_owned());
            }
        }
        builder.push(")");
    }

    builder.push(" ORDER BY id LIMIT ");
    builder.push_bind(page.limit);
    builder.push(" OFFSET ");
    builder.push_bind(page.offset);

    let rows = builder
        .build_query_as::<Contact>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Fetch one contact owned by `user_id`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_contact(pool: &PgPool, user_id: i64, contact_id: i64) -> Result<Option<Contact>, RepoError> {
    let row = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND user_id = $2"
    ))
    .bind(contact_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Contacts whose birthday comes up in the next [`BIRTHDAY_WINDOW_DAYS`] days
/// (today inclusive). Paging applies to the matches, not the scanned rows.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn upcoming_birthdays(
    pool: &PgPool,
    user_id: i64,
    today: Date,
    page: Page,
) -> Result<Vec<Contact>, RepoError> {
    let rows = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = $1 ORDER BY id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(filter_upcoming(rows, today, page))
}

pub(crate) fn filter_upcoming(rows: Vec<Contact>, today: Date, page: Page) -> Vec<Contact> {
    let skip = usize::try_from(page.offset).unwrap_or(0);
    let take = usize::try_from(page.limit).unwrap_or(0);
    rows.into_iter()
        .filter(|c| birthday_within(c.birthday, today, BIRTHDAY_WINDOW_DAYS))
        .skip(skip)
        .take(take)
        .collect()
}

/// Insert a contact owned by `user_id`.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_contact(pool: &PgPool, user_id: i64, input: &ContactInput) -> Result<Contact, RepoError> {
    let row = sqlx::query_as::<_, Contact>(&format!(
        "INSERT INTO contacts (first_name, last_name, email, phone_number, birthday, additional_data, user_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {CONTACT_COLUMNS}"
    ))
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.email)
    .bind(&input.phone_number)
    .bind(input.birthday)
    .bind(&input.additional_data)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Replace every mutable field. `None` if the contact is missing or not owned.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn update_contact(
    pool: &PgPool,
    user_id: i64,
    contact_id: i64,
    input: &ContactInput,
) -> Result<Option<Contact>, RepoError> {
    let row = sqlx::query_as::<_, Contact>(&format!(
        "UPDATE contacts
         SET first_name = $3, last_name = $4, email = $5, phone_number = $6, birthday = $7, additional_data = $8
         WHERE id = $1 AND user_id = $2
         RETURNING {CONTACT_COLUMNS}"
    ))
    .bind(contact_id)
    .bind(user_id)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .bind(&input.email)
    .bind(&input.phone_number)
    .bind(input.birthday)
    .bind(&input.additional_data)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Delete and return the contact. `None` if missing or not owned.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn remove_contact(pool: &PgPool, user_id: i64, contact_id: i64) -> Result<Option<Contact>, RepoError> {
    let row = sqlx::query_as::<_, Contact>(&format!(
        "DELETE FROM contacts WHERE id = $1 AND user_id = $2 RETURNING {CONTACT_COLUMNS}"
    ))
    .bind(contact_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
#[path = "contacts_test.rs"]
mod tests;

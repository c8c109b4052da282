//! Users repository: accounts, refresh tokens, confirmation and roles.

use serde::Deserialize;
use sqlx::PgPool;

use super::{RepoError, ValidationErrors};
use crate::services::auth::{gravatar_url, normalize_email};
use crate::services::roles::Role;

/// Advisory lock key held while inserting users.
pub const SIGNUP_LOCK_KEY: i64 = 0x636f_6e74_6163_7473;

const USER_COLUMNS: &str = "id, username, email, password, avatar, refresh_token, role, confirmed";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// argon2 PHC hash.
    pub password: String,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Role,
    pub confirmed: bool,
}

/// Signup body as received.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDraft {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl UserDraft {
    /// Check bounds and normalize the email. The password stays plain; the
    /// caller hashes it before building a [`NewUser`].
    ///
    /// # Errors
    ///
    /// Returns every violated rule at once.
    pub fn validate(&self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let username = self.username.trim().to_owned();
        errors.check_len("username", &username, 5, 30);

        let email = match normalize_email(&self.email) {
            Some(email) => {
                errors.check_len("email", &email, 10, 150);
                email
            }
            None => {
                errors.push("email", "must be a valid email address");
                String::new()
            }
        };

        errors.check_len("password", &self.password, 6, 30);

        errors.into_result(Self { username, email, password: self.password.clone() })
    }
}

/// Row ready for insertion; `password_hash` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Look a user up by (normalized) email.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, RepoError> {
    let row = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns a database error if the query fails.
pub async fn get_user_by_id(pool: &PgPool, user_id: i64) -> Result<Option<User>, RepoError> {
    let row = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Insert a new account with a Gravatar avatar. The first account ever
/// created is promoted to admin; everyone after starts as a plain user.
///
/// Inserts are serialized on [`SIGNUP_LOCK_KEY`] so two concurrent first
/// signups cannot both see an empty table.
///
/// # Errors
///
/// [`RepoError::AlreadyExists`] if the email is taken, otherwise a database error.
pub async fn create_user(pool: &PgPool, new_user: &NewUser) -> Result<User, RepoError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SIGNUP_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password, avatar, role)
         VALUES ($1, $2, $3, $4,
                 CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'user'::role ELSE 'admin'::role END)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(gravatar_url(&new_user.email))
    .fetch_one(&mut *tx)
    .await
    .map_err(RepoError::from_insert)?;

    tx.commit().await?;
    Ok(user)
}

/// Store (or clear, with `None`) the user's current refresh token.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn update_token(pool: &PgPool, user_id: i64, token: Option<&str>) -> Result<(), RepoError> {
    sqlx::query("UPDATE users SET refresh_token = $2 WHERE id = $1")
        .bind(user_id)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark the email as confirmed. Returns whether a row was updated.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn confirmed_email(pool: &PgPool, email: &str) -> Result<bool, RepoError> {
    let result = sqlx::query("UPDATE users SET confirmed = TRUE WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Change a user's role. `None` if the user does not exist.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn update_role(pool: &PgPool, user_id: i64, role: Role) -> Result<Option<User>, RepoError> {
    let row = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(role)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;

//! Postgres pool setup.
//!
//! Migrations under `src/db/migrations` are embedded at compile time and
//! applied on every start, before the listener binds.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect with at most `max_connections` and bring the schema up to date.
///
/// # Errors
///
/// Fails when the server is unreachable or a migration does not apply.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}

/// Round-trip a trivial query. Backs the health check route.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    if one == 1 {
        Ok(())
    } else {
        Err(sqlx::Error::RowNotFound)
    }
}

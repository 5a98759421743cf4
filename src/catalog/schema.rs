use sqlx::PgPool;

use crate::error::Result;

/// Whether a schema exists in the database (spec §4.1 `schema_exists`).
pub async fn schema_exists(pool: &PgPool, name: &str) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = $1)",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

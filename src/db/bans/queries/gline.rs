//! G-line (global user@host ban) operations.

use super::super::models::Gline;
use crate::db::DbError;
use ts6_proto::wildcard_match;
use sqlx::SqlitePool;

/// Add a G-line.
pub async fn add_gline(
    pool: &SqlitePool,
    mask: &str,
    reason: Option<&str>,
    set_by: &str,
    duration: Option<i64>,
) -> Result<(), DbError> {
    let now = chrono::Utc::now().timestamp();
    let expires_at = duration.map(|d| now + d);

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO glines (mask, reason, set_by, set_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(mask)
    .bind(reason)
    .bind(set_by)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a G-line.
pub async fn remove_gline(pool: &SqlitePool, mask: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM glines WHERE mask = ?")
        .bind(mask)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Get all active G-lines (not expired).
pub async fn get_active_glines(pool: &SqlitePool) -> Result<Vec<Gline>, DbError> {
    let now = chrono::Utc::now().timestamp();

    let rows = sqlx::query_as::<_, (String, Option<String>, String, i64, Option<i64>)>(
        r#"
        SELECT mask, reason, set_by, set_at, expires_at
        FROM glines
        WHERE expires_at IS NULL OR expires_at > ?
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(mask, reason, set_by, set_at, expires_at)| Gline {
            mask,
            reason,
            set_by,
            set_at,
            expires_at,
        })
        .collect())
}

/// Check if a user@host matches any active G-line.
pub async fn matches_gline(pool: &SqlitePool, user_host: &str) -> Result<Option<Gline>, DbError> {
    let glines = get_active_glines(pool).await?;

    for gline in glines {
        if wildcard_match(&gline.mask, user_host) {
            return Ok(Some(gline));
        }
    }

    Ok(None)
}

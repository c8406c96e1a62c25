//! Vocabulary snapshot queries.

use crate::models::SubjectRow;
use sqlx::SqlitePool;
use tracing::debug;

/// Replaces the whole snapshot of `vocab_id` in one transaction.
pub async fn replace_snapshot(
    pool: &SqlitePool,
    vocab_id: &str,
    rows: &[SubjectRow],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM vocab_subjects WHERE vocab_id = ?1")
        .bind(vocab_id)
        .execute(&mut *tx)
        .await?;
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO vocab_subjects (vocab_id, position, uri, notation, labels_json, deprecated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(vocab_id)
        .bind(row.position)
        .bind(&row.uri)
        .bind(&row.notation)
        .bind(&row.labels_json)
        .bind(row.deprecated)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    debug!(vocab_id, subjects = rows.len(), "stored vocabulary snapshot");
    Ok(())
}

/// Returns the snapshot ordered by position, or `None` if it was never stored.
pub async fn load_snapshot(
    pool: &SqlitePool,
    vocab_id: &str,
) -> anyhow::Result<Option<Vec<SubjectRow>>> {
    let rows = sqlx::query_as::<_, SubjectRow>(
        r#"
        SELECT position, uri, notation, labels_json, deprecated
        FROM vocab_subjects
        WHERE vocab_id = ?1
        ORDER BY position
        "#,
    )
    .bind(vocab_id)
    .fetch_all(pool)
    .await?;
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(rows))
}

pub async fn delete_snapshot(pool: &SqlitePool, vocab_id: &str) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM vocab_subjects WHERE vocab_id = ?1")
        .bind(vocab_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn list_vocab_ids(pool: &SqlitePool) -> anyhow::Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT vocab_id FROM vocab_subjects ORDER BY vocab_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(position: i64, uri: &str) -> SubjectRow {
        SubjectRow {
            position,
            uri: uri.to_string(),
            notation: None,
            labels_json: r#"{"en":"label"}"#.to_string(),
            deprecated: false,
        }
    }

    #[tokio::test]
    async fn snapshot_is_replaced_wholesale() {
        let pool = crate::open("sqlite::memory:").await.unwrap();
        replace_snapshot(&pool, "yso", &[row(0, "http://a"), row(1, "http://b")])
            .await
            .unwrap();
        replace_snapshot(&pool, "yso", &[row(0, "http://c")])
            .await
            .unwrap();

        let rows = load_snapshot(&pool, "yso").await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uri, "http://c");
        assert!(load_snapshot(&pool, "other").await.unwrap().is_none());
        assert_eq!(list_vocab_ids(&pool).await.unwrap(), vec!["yso".to_string()]);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let pool = crate::open("sqlite::memory:").await.unwrap();
        replace_snapshot(&pool, "yso", &[row(0, "http://a")]).await.unwrap();
        assert!(delete_snapshot(&pool, "yso").await.unwrap());
        assert!(!delete_snapshot(&pool, "yso").await.unwrap());
    }
}

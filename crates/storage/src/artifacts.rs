//! Trained model artifact queries.

use crate::models::ModelRow;
use sqlx::SqlitePool;

pub async fn upsert(pool: &SqlitePool, row: &ModelRow) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO models (project_id, backend, trained_at, data_json)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(project_id) DO UPDATE SET
            backend=excluded.backend,
            trained_at=excluded.trained_at,
            data_json=excluded.data_json
        "#,
    )
    .bind(&row.project_id)
    .bind(&row.backend)
    .bind(&row.trained_at)
    .bind(&row.data_json)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch(pool: &SqlitePool, project_id: &str) -> anyhow::Result<Option<ModelRow>> {
    let row = sqlx::query_as::<_, ModelRow>(
        "SELECT project_id, backend, trained_at, data_json FROM models WHERE project_id = ?1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Timestamp of the current artifact without loading its payload.
pub async fn trained_at(pool: &SqlitePool, project_id: &str) -> anyhow::Result<Option<String>> {
    let ts = sqlx::query_scalar::<_, String>("SELECT trained_at FROM models WHERE project_id = ?1")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;
    Ok(ts)
}

pub async fn delete(pool: &SqlitePool, project_id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM models WHERE project_id = ?1")
        .bind(project_id)
        .execute(pool)
        .await?;
    Ok(())
}

//! Adapts core types onto the `storage` crate's tables.

use crate::error::{Result, SuggestError};
use crate::vocab::Subject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use storage::models::{ModelRow, SubjectRow};

/// A trained model state, versioned by the time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub backend: String,
    pub trained_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ModelArtifact {
    pub fn new(backend: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            backend: backend.into(),
            trained_at: Utc::now(),
            data,
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(database_url: &str) -> Result<Self> {
        Ok(Self::new(storage::open(database_url).await?))
    }

    pub async fn load_subjects(&self, vocab_id: &str) -> Result<Option<Vec<Subject>>> {
        let Some(rows) = storage::subjects::load_snapshot(&self.pool, vocab_id).await? else {
            return Ok(None);
        };
        let mut subjects = Vec::with_capacity(rows.len());
        for (expected, row) in rows.into_iter().enumerate() {
            if row.position != expected as i64 {
                return Err(SuggestError::Storage(format!(
                    "vocabulary '{vocab_id}' snapshot has a gap at position {expected}"
                )));
            }
            let labels: BTreeMap<String, String> = serde_json::from_str(&row.labels_json)
                .map_err(|e| SuggestError::Storage(e.to_string()))?;
            subjects.push(Subject {
                uri: row.uri,
                labels,
                notation: row.notation,
                deprecated: row.deprecated,
            });
        }
        Ok(Some(subjects))
    }

    pub async fn save_subjects(&self, vocab_id: &str, subjects: &[Subject]) -> Result<()> {
        let mut rows = Vec::with_capacity(subjects.len());
        for (pos, subject) in subjects.iter().enumerate() {
            rows.push(SubjectRow {
                position: pos as i64,
                uri: subject.uri.clone(),
                notation: subject.notation.clone(),
                labels_json: serde_json::to_string(&subject.labels)
                    .map_err(|e| SuggestError::Storage(e.to_string()))?,
                deprecated: subject.deprecated,
            });
        }
        storage::subjects::replace_snapshot(&self.pool, vocab_id, &rows).await?;
        Ok(())
    }

    pub async fn delete_subjects(&self, vocab_id: &str) -> Result<bool> {
        Ok(storage::subjects::delete_snapshot(&self.pool, vocab_id).await?)
    }

    pub async fn vocab_ids(&self) -> Result<Vec<String>> {
        Ok(storage::subjects::list_vocab_ids(&self.pool).await?)
    }

    pub async fn load_model(&self, project_id: &str) -> Result<Option<ModelArtifact>> {
        let Some(row) = storage::artifacts::fetch(&self.pool, project_id).await? else {
            return Ok(None);
        };
        Ok(Some(ModelArtifact {
            backend: row.backend,
            trained_at: parse_timestamp(&row.trained_at)?,
            data: serde_json::from_str(&row.data_json)
                .map_err(|e| SuggestError::Storage(e.to_string()))?,
        }))
    }

    pub async fn save_model(&self, project_id: &str, artifact: &ModelArtifact) -> Result<()> {
        let row = ModelRow {
            project_id: project_id.to_string(),
            backend: artifact.backend.clone(),
            trained_at: artifact.trained_at.to_rfc3339(),
            data_json: artifact.data.to_string(),
        };
        storage::artifacts::upsert(&self.pool, &row).await?;
        Ok(())
    }

    pub async fn model_trained_at(&self, project_id: &str) -> Result<Option<DateTime<Utc>>> {
        storage::artifacts::trained_at(&self.pool, project_id)
            .await?
            .map(|ts| parse_timestamp(&ts))
            .transpose()
    }

    pub async fn delete_model(&self, project_id: &str) -> Result<()> {
        storage::artifacts::delete(&self.pool, project_id).await?;
        Ok(())
    }
}

fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SuggestError::Storage(format!("bad timestamp '{ts}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn model_artifacts_round_trip_through_sqlite() {
        let store = Store::open("sqlite::memory:").await.unwrap();
        assert!(store.load_model("p").await.unwrap().is_none());

        let artifact = ModelArtifact::new("dummy", json!({"uri": "http://example.org/a"}));
        store.save_model("p", &artifact).await.unwrap();

        let loaded = store.load_model("p").await.unwrap().unwrap();
        assert_eq!(loaded.data, artifact.data);
        assert_eq!(loaded.trained_at.timestamp(), artifact.trained_at.timestamp());
        assert!(store.model_trained_at("p").await.unwrap().is_some());

        store.delete_model("p").await.unwrap();
        assert!(store.model_trained_at("p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subjects_keep_labels_notation_and_deprecation() {
        let store = Store::open("sqlite::memory:").await.unwrap();
        let mut b = Subject::new("http://example.org/b", "en", "B").with_label("fi", "Bee");
        b.deprecated = true;
        let subjects = vec![
            Subject::new("http://example.org/a", "en", "A").with_notation("1"),
            b,
        ];
        store.save_subjects("v", &subjects).await.unwrap();
        assert_eq!(store.load_subjects("v").await.unwrap().unwrap(), subjects);
        assert_eq!(store.vocab_ids().await.unwrap(), vec!["v".to_string()]);
    }
}

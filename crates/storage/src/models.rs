use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SubjectRow {
    pub position: i64,
    pub uri: String,
    pub notation: Option<String>,
    pub labels_json: String,
    pub deprecated: bool,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ModelRow {
    pub project_id: String,
    pub backend: String,
    pub trained_at: String,
    pub data_json: String,
}

use crate::stored_object;

stored_object!(VectorCollectionInfo, "vector_collection", {
    dimension: usize,
    metric: String
});

/// One embedded chunk as written to a vector collection. The same point is
/// written to both the per-file and the per-knowledge-collection sink with
/// different `tenant_id` values, so the struct itself is not tied to a
/// single table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    pub text: String,
    pub hash: String,
    pub file_id: String,
    pub file_name: String,
    pub start_offset: usize,
    pub chunk_index: usize,
    pub tenant_id: String,
    pub space_key: String,
    pub page_id: String,
    pub page_title: String,
    pub created_by: String,
    pub embedding_model: Option<String>,
    pub embedding: Vec<f32>,
}

impl VectorPoint {
    /// Point ids are derived from the file id and chunk index so a retried
    /// upsert overwrites the earlier point instead of duplicating it.
    pub fn point_id(file_id: &str, chunk_index: usize) -> String {
        format!("{file_id}-{chunk_index}")
    }

    /// Tenant key scoping a point to a single document.
    pub fn file_tenant(file_id: &str) -> String {
        format!("file-{file_id}")
    }
}

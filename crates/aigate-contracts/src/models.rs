use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const TASK_TEXT_GENERATION: &str = "Text Generation";
pub const TASK_TEXT_EMBEDDINGS: &str = "Text Embeddings";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    /// Backend model name, i.e. `id` without the `#task` suffix.
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(default)]
    pub in_use: bool,
}

impl ModelEntry {
    pub fn is_embedding_model(&self) -> bool {
        self.task_name.as_deref() == Some(TASK_TEXT_EMBEDDINGS)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, ToSchema)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

use serde::{Deserialize, Serialize};

/// A model advertised by a provider's `List()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub max_tokens: u32,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SuggestionEntry {
    pub steps: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

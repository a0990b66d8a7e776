use serde::{Deserialize, Serialize};

/// Chapter as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub name: String,
    /// Declared strength
    pub marines_count: i64,
    /// Marines currently assigned to the chapter
    pub members_count: i64,
}

/// Create/update payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInput {
    #[serde(default)]
    pub name: String,
    pub marines_count: Option<i64>,
}

/// Validated chapter ready for insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChapter {
    pub name: String,
    pub marines_count: i64,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Unit used to measure chunk size and chunk overlap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    Words,
    Characters,
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Words => f.write_str("words"),
            Self::Characters => f.write_str("characters"),
        }
    }
}

impl FromStr for LengthUnit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "words" | "word" => Ok(Self::Words),
            "characters" | "chars" | "character" => Ok(Self::Characters),
            other => Err(format!("unknown length unit '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub length_unit: LengthUnit,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            length_unit: LengthUnit::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub page_start: u32,
    pub page_end: u32,
    /// Byte offset of `text` inside the whitespace-normalized document text.
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// One answered question, persisted under the dataset's memory namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRecord {
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Commit record for a dataset's companion artifacts, written after both of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetManifest {
    pub dataset: String,
    pub index_key: String,
    pub index_sha256: String,
    pub meta_key: String,
    pub meta_sha256: String,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::LengthUnit;

    #[test]
    fn length_unit_parses_aliases() {
        assert_eq!("Words".parse::<LengthUnit>(), Ok(LengthUnit::Words));
        assert_eq!(" chars ".parse::<LengthUnit>(), Ok(LengthUnit::Characters));
        assert!("tokens".parse::<LengthUnit>().is_err());
    }
}

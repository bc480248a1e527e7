use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const DEFAULT_COLLECTION: &str = "Pdf_for_mira";

/// A word-aligned slice of extracted text, as emitted by the chunker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    pub chunk_id: u64,
    pub text: String,
    pub length: usize,
    pub word_count: usize,
}

/// The record written to the collection: a chunk plus where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkObject {
    #[serde(flatten)]
    pub chunk: TextChunk,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
}

impl ChunkObject {
    pub fn bare(chunk: TextChunk) -> Self {
        Self {
            chunk,
            source_file: None,
            uploaded_at: None,
            file_size_bytes: None,
        }
    }

    pub fn properties(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Keyword,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Restricts returned (and, for keyword search, searched) properties.
    #[serde(default)]
    pub properties: Vec<String>,
}

fn default_limit() -> usize {
    10
}

fn default_alpha() -> f64 {
    0.5
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            text: text.into(),
            mode,
            limit: default_limit(),
            alpha: default_alpha(),
            properties: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub uuid: String,
    pub properties: Map<String, Value>,
    pub distance: Option<f64>,
    pub certainty: Option<f64>,
    pub score: Option<f64>,
}

impl SearchHit {
    pub fn chunk_id(&self) -> Option<u64> {
        self.properties.get("chunk_id").and_then(Value::as_u64)
    }

    pub fn text(&self) -> Option<&str> {
        self.properties.get("text").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedSource {
    pub uuid: String,
    pub properties: Map<String, Value>,
    pub generated: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GenerativeResult {
    pub generated_text: Option<String>,
    pub sources: Vec<GeneratedSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredObject {
    pub uuid: Uuid,
    pub properties: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
}

/// An object queued for insertion. Without an `id` the store assigns one;
/// without a `vector` the collection's vectorizer embeds the properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewObject {
    pub properties: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
    pub id: Option<Uuid>,
}

impl From<&ChunkObject> for NewObject {
    fn from(object: &ChunkObject) -> Self {
        Self {
            properties: object.properties(),
            vector: None,
            id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchFailure {
    /// Position of the object in the submitted slice.
    pub index: usize,
    pub message: String,
}

/// Outcome of a batch import. Every count is tallied directly; objects left
/// over when the import was aborted are counted in `not_attempted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BatchInsertReport {
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub errors: Vec<BatchFailure>,
}

impl BatchInsertReport {
    pub fn aborted(&self) -> bool {
        self.not_attempted > 0
    }

    pub fn merge(&mut self, other: BatchInsertReport, offset: usize) {
        self.attempted += other.attempted;
        self.not_attempted += other.not_attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors
            .extend(other.errors.into_iter().map(|failure| BatchFailure {
                index: failure.index + offset,
                message: failure.message,
            }));
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    Text,
    Int,
    Number,
    Boolean,
    Date,
}

impl DataType {
    pub fn as_weaviate(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Int => "int",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
        }
    }

    /// Unknown names fall back to `Text`.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => DataType::Int,
            "number" | "float" => DataType::Number,
            "boolean" | "bool" => DataType::Boolean,
            "date" => DataType::Date,
            _ => DataType::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub data_type: DataType,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Vectorizer {
    #[default]
    Text2VecOpenAi,
    Text2VecCohere,
    None,
}

impl Vectorizer {
    pub fn module_name(&self) -> &'static str {
        match self {
            Vectorizer::Text2VecOpenAi => "text2vec-openai",
            Vectorizer::Text2VecCohere => "text2vec-cohere",
            Vectorizer::None => "none",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "text2vec-openai" => Vectorizer::Text2VecOpenAi,
            "text2vec-cohere" => Vectorizer::Text2VecCohere,
            _ => Vectorizer::None,
        }
    }
}

/// Generative module selected from the model name prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum GenerativeModel {
    OpenAi(String),
    Cohere(String),
}

impl GenerativeModel {
    pub fn from_model_name(model: &str) -> Option<Self> {
        if model.starts_with("gpt") {
            Some(GenerativeModel::OpenAi(model.to_string()))
        } else if model.starts_with("command") {
            Some(GenerativeModel::Cohere(model.to_string()))
        } else {
            None
        }
    }

    pub fn module_name(&self) -> &'static str {
        match self {
            GenerativeModel::OpenAi(_) => "generative-openai",
            GenerativeModel::Cohere(_) => "generative-cohere",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            GenerativeModel::OpenAi(model) | GenerativeModel::Cohere(model) => model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub properties: Vec<PropertySpec>,
    pub vectorizer: Vectorizer,
    pub generative: Option<GenerativeModel>,
}

impl CollectionSpec {
    /// Schema used for uploaded PDF chunks.
    pub fn for_chunks(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: vec![
                PropertySpec::new("text", DataType::Text),
                PropertySpec::new("chunk_id", DataType::Int),
                PropertySpec::new("length", DataType::Int),
                PropertySpec::new("word_count", DataType::Int),
                PropertySpec::new("source_file", DataType::Text),
                PropertySpec::new("uploaded_at", DataType::Date),
                PropertySpec::new("file_size_bytes", DataType::Int),
            ],
            vectorizer: Vectorizer::Text2VecOpenAi,
            generative: GenerativeModel::from_model_name("gpt-3.5-turbo"),
        }
    }
}

/// Result of pushing one PDF through extraction, chunking and insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessReport {
    pub source_file: String,
    pub file_size_bytes: u64,
    pub extracted_text_length: usize,
    pub failed_pages: Vec<u32>,
    pub total_chunks: usize,
    pub successful_uploads: usize,
    pub failed_uploads: usize,
    pub failures: Vec<BatchFailure>,
}

/// Totals over the chunks stored in a collection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct CollectionSummary {
    pub total_chunks: usize,
    pub total_words: u64,
    pub total_characters: u64,
    /// Distinct `source_file` values, sorted; chunks without one count as "Unknown".
    pub source_files: Vec<String>,
    /// Upload timestamp of the first chunk returned.
    pub uploaded_at: Option<String>,
}

impl CollectionSummary {
    pub fn from_hits(hits: &[SearchHit]) -> Self {
        let count = |hit: &SearchHit, name: &str| -> u64 {
            hit.properties.get(name).and_then(Value::as_u64).unwrap_or(0)
        };

        let source_files = hits
            .iter()
            .map(|hit| {
                hit.properties
                    .get("source_file")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string()
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            total_chunks: hits.len(),
            total_words: hits.iter().map(|hit| count(hit, "word_count")).sum(),
            total_characters: hits.iter().map(|hit| count(hit, "length")).sum(),
            source_files,
            uploaded_at: hits
                .first()
                .and_then(|hit| hit.properties.get("uploaded_at"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub fn average_words(&self) -> u64 {
        self.total_words.checked_div(self.total_chunks as u64).unwrap_or(0)
    }

    pub fn average_characters(&self) -> u64 {
        self.total_characters
            .checked_div(self.total_chunks as u64)
            .unwrap_or(0)
    }
}

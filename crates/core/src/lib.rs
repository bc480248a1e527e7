pub mod chunking;
pub mod config;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod retry;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, chunk_with, ChunkingConfig, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
pub use config::WeaviateConfig;
pub use error::{IngestError, StoreError};
pub use extractor::{extract_pdf_text, ExtractedText, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    discover_pdf_files, ingest_folder, is_pdf_name, process_pdf_bytes, process_pdf_file,
    store_extracted_text, FolderReport, SkippedPdf,
};
pub use models::{
    BatchFailure, BatchInsertReport, ChunkObject, CollectionSpec, CollectionSummary, DataType,
    GeneratedSource, GenerativeModel, GenerativeResult, NewObject, ProcessReport, PropertySpec,
    SearchHit, SearchMode, SearchQuery, StoredObject, TextChunk, Vectorizer, DEFAULT_COLLECTION,
};
pub use retry::RetryPolicy;
pub use stores::{validate_collection_name, BatchOptions, WeaviateClient};
pub use traits::ChunkStore;

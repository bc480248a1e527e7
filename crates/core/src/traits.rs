use crate::{BatchInsertReport, ChunkObject, GenerativeResult, SearchHit, SearchQuery, StoreError};
use async_trait::async_trait;

/// The operations the upload pipeline and the HTTP layer need from a
/// vector store holding chunk objects.
#[async_trait]
pub trait ChunkStore {
    async fn insert_chunks(
        &self,
        collection: &str,
        objects: &[ChunkObject],
    ) -> Result<BatchInsertReport, StoreError>;

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, StoreError>;

    async fn generate(
        &self,
        collection: &str,
        query: &str,
        prompt: &str,
        limit: usize,
    ) -> Result<GenerativeResult, StoreError>;
}

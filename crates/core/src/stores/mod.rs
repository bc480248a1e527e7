pub mod graphql;
pub mod weaviate;

pub use weaviate::{validate_collection_name, BatchOptions, WeaviateClient};

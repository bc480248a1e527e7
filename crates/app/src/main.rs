mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_weaviate_core::stores::weaviate::describe_property;
use pdf_weaviate_core::{
    chunk_with, ingest_folder, process_pdf_file, ChunkStore, ChunkingConfig, CollectionSpec,
    CollectionSummary, DataType, GenerativeModel, LopdfExtractor, PdfExtractor, PropertySpec,
    RetryPolicy, SearchHit, SearchMode, SearchQuery, Vectorizer, WeaviateClient, WeaviateConfig,
    DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION, DEFAULT_OVERLAP,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pdf-weaviate", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Weaviate cluster URL
    #[arg(long, env = "WEAVIATE_URL", global = true, default_value = "http://localhost:8080")]
    weaviate_url: String,

    /// Weaviate API key
    #[arg(long, env = "WEAVIATE_API_KEY", global = true, hide_env_values = true)]
    weaviate_api_key: Option<String>,

    /// OpenAI key forwarded to the vectorizer and generative modules
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Cohere key forwarded to the vectorizer and generative modules
    #[arg(long, env = "COHERE_API_KEY", global = true, hide_env_values = true)]
    cohere_api_key: Option<String>,

    /// HuggingFace key forwarded to the vectorizer module
    #[arg(long, env = "HUGGINGFACE_API_KEY", global = true, hide_env_values = true)]
    huggingface_api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "WEAVIATE_TIMEOUT_SECS", global = true, default_value = "120")]
    timeout_secs: u64,

    /// Attempts per request when Weaviate answers 5xx/429 or the connection fails
    #[arg(long, env = "WEAVIATE_MAX_ATTEMPTS", global = true, default_value = "3")]
    max_attempts: u32,

    /// Collection holding the PDF chunks
    #[arg(long, env = "WEAVIATE_COLLECTION", global = true, default_value = DEFAULT_COLLECTION)]
    collection: String,
}

#[derive(clap::Args, Clone, Copy)]
struct ChunkArgs {
    /// Character budget per chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Overlap setting; every 10 repeats one trailing word in the next chunk.
    #[arg(long, default_value_t = DEFAULT_OVERLAP)]
    overlap: usize,
}

impl ChunkArgs {
    fn config(self) -> anyhow::Result<ChunkingConfig> {
        Ok(ChunkingConfig::new(self.chunk_size, self.overlap)?)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Semantic,
    Keyword,
    Hybrid,
}

impl From<ModeArg> for SearchMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Semantic => SearchMode::Semantic,
            ModeArg::Keyword => SearchMode::Keyword,
            ModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP upload and search server.
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value = "5001")]
        port: u16,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Extract, chunk and store a single PDF.
    Upload {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Upload every PDF under a folder, skipping unreadable files.
    Ingest {
        #[arg(long)]
        folder: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Print the chunks of a PDF as JSON lines without contacting Weaviate.
    Chunk {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Query stored chunks.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, value_enum, default_value = "hybrid")]
        mode: ModeArg,
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Hybrid weighting: 0 is pure keyword, 1 is pure vector.
        #[arg(long, default_value = "0.5")]
        alpha: f64,
        /// Properties to return (and search, for keyword mode).
        #[arg(long = "property")]
        properties: Vec<String>,
    },
    /// Retrieve chunks and run a generative prompt over them.
    Generate {
        #[arg(long)]
        query: String,
        /// Per-object prompt; `{property}` placeholders are filled in.
        #[arg(long)]
        prompt: String,
        /// Task run once over all retrieved objects.
        #[arg(long)]
        task: Option<String>,
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// List stored chunks in chunk order.
    View {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Totals and averages over the stored chunks.
    Summary {
        #[arg(long, default_value = "1000")]
        limit: usize,
    },
    /// Fetch one stored object by id.
    Get {
        #[arg(long)]
        id: Uuid,
        #[arg(long, default_value_t = false)]
        include_vector: bool,
    },
    /// Manage collections.
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Check that the instance answers schema requests.
    Health,
}

#[derive(Subcommand)]
enum CollectionAction {
    List,
    Exists {
        name: String,
    },
    Schema {
        name: String,
    },
    /// Create a collection; without --property the PDF chunk schema is used.
    Create {
        name: String,
        /// `name:type` pairs, e.g. `title:text`.
        #[arg(long = "property")]
        properties: Vec<String>,
        #[arg(long, default_value = "text2vec-openai")]
        vectorizer: String,
        #[arg(long, default_value = "gpt-3.5-turbo")]
        generative_model: String,
    },
    Delete {
        name: String,
    },
}

impl Cli {
    fn weaviate_config(&self) -> WeaviateConfig {
        let mut config = WeaviateConfig::new(&self.weaviate_url);
        if let Some(api_key) = &self.weaviate_api_key {
            config = config.with_api_key(api_key);
        }
        config.openai_api_key = self.openai_api_key.clone();
        config.cohere_api_key = self.cohere_api_key.clone();
        config.huggingface_api_key = self.huggingface_api_key.clone();
        config.timeout_secs = self.timeout_secs;
        config
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-weaviate boot"
    );

    if let Command::Chunk { file, chunking } = &cli.command {
        let text = LopdfExtractor
            .extract_file(file)
            .with_context(|| format!("reading {}", file.display()))?
            .full_text();
        for chunk in chunk_with(&text, &chunking.config()?) {
            println!("{}", serde_json::to_string(&chunk)?);
        }
        return Ok(());
    }

    let client = WeaviateClient::connect(&cli.weaviate_config())
        .await?
        .with_retry_policy(cli.retry_policy());
    let collection = cli.collection.clone();

    match cli.command {
        Command::Chunk { .. } => {}
        Command::Serve {
            host,
            port,
            chunking,
        } => {
            client.ensure_chunk_collection(&collection).await?;
            let state = server::AppState {
                store: Arc::new(client),
                collection,
                chunking: chunking.config()?,
            };

            let listener = tokio::net::TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("binding {host}:{port}"))?;
            info!(address = %listener.local_addr()?, "upload server listening");
            axum::serve(listener, server::router(state)).await?;
        }
        Command::Upload { file, chunking } => {
            client.ensure_chunk_collection(&collection).await?;
            let report =
                process_pdf_file(&LopdfExtractor, &client, &collection, &file, &chunking.config()?)
                    .await?;

            println!(
                "{}: {} characters, {} chunks, {} stored, {} failed",
                report.source_file,
                report.extracted_text_length,
                report.total_chunks,
                report.successful_uploads,
                report.failed_uploads
            );
            if let Some(first) = report.failures.first() {
                println!("first failure: chunk #{} {}", first.index, first.message);
            }
        }
        Command::Ingest { folder, chunking } => {
            client.ensure_chunk_collection(&collection).await?;
            let report =
                ingest_folder(&LopdfExtractor, &client, &collection, &folder, &chunking.config()?)
                    .await?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder.display()
                );
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
            }

            println!(
                "{} files, {} chunks, {} stored, {} failed at {}",
                report.processed.len(),
                report.total_chunks(),
                report.successful_uploads(),
                report.failed_uploads(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            mode,
            limit,
            alpha,
            properties,
        } => {
            let search_query = SearchQuery {
                text: query,
                mode: mode.into(),
                limit,
                alpha,
                properties,
            };
            let hits = client.search(&collection, &search_query).await?;

            println!("query: {} ({} results)", search_query.text, hits.len());
            for hit in &hits {
                print_hit(hit);
            }
        }
        Command::Generate {
            query,
            prompt,
            task,
            limit,
        } => {
            let result = client
                .generative_search(&collection, &query, &prompt, task.as_deref(), limit)
                .await?;

            if let Some(text) = &result.generated_text {
                println!("generated:\n{text}");
            }
            for source in &result.sources {
                println!("[{}]", source.uuid);
                if let Some(generated) = &source.generated {
                    println!("  generated: {generated}");
                }
                println!(
                    "  text: {}",
                    describe_property(&source.properties, "text", DataType::Text)
                );
            }
        }
        Command::View { limit } => {
            let mut objects = client.fetch_objects(&collection, limit).await?;
            if objects.is_empty() {
                println!("no content found in {collection}");
                return Ok(());
            }
            objects.sort_by_key(|hit| hit.chunk_id().unwrap_or(0));

            println!("{} chunks in {collection}", objects.len());
            for (position, object) in objects.iter().enumerate() {
                let properties = &object.properties;
                println!(
                    "chunk {} (id {}) source={} words={} chars={}",
                    position + 1,
                    describe_property(properties, "chunk_id", DataType::Int),
                    describe_property(properties, "source_file", DataType::Text),
                    describe_property(properties, "word_count", DataType::Int),
                    describe_property(properties, "length", DataType::Int),
                );
                println!("{}", describe_property(properties, "text", DataType::Text));
            }
        }
        Command::Summary { limit } => {
            let objects = client.fetch_objects(&collection, limit).await?;
            if objects.is_empty() {
                println!("no content found in {collection}");
                return Ok(());
            }
            let summary = CollectionSummary::from_hits(&objects);
            print!("{}", render_summary(&collection, &summary));
        }
        Command::Get { id, include_vector } => {
            let object = client.get_object(&collection, id, include_vector).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        Command::Collections { action } => run_collection_action(&client, action).await?,
        Command::Health => {
            let healthy = client.health_check().await;
            println!("{}", if healthy { "healthy" } else { "unhealthy" });
            if !healthy {
                anyhow::bail!("weaviate at {} is unhealthy", client.base_url());
            }
        }
    }

    Ok(())
}

async fn run_collection_action(client: &WeaviateClient, action: CollectionAction) -> anyhow::Result<()> {
    match action {
        CollectionAction::List => {
            for name in client.list_collections().await? {
                println!("{name}");
            }
        }
        CollectionAction::Exists { name } => {
            println!("{}", client.collection_exists(&name).await?);
        }
        CollectionAction::Schema { name } => match client.collection_schema(&name).await? {
            Some(schema) => println!("{}", serde_json::to_string_pretty(&schema)?),
            None => anyhow::bail!("collection {name} does not exist"),
        },
        CollectionAction::Create {
            name,
            properties,
            vectorizer,
            generative_model,
        } => {
            let spec = if properties.is_empty() {
                CollectionSpec::for_chunks(&name)
            } else {
                CollectionSpec {
                    name: name.clone(),
                    properties: properties.iter().map(|raw| parse_property(raw)).collect(),
                    vectorizer: Vectorizer::parse(&vectorizer),
                    generative: GenerativeModel::from_model_name(&generative_model),
                }
            };
            client.create_collection(&spec).await?;
            println!("created {name}");
        }
        CollectionAction::Delete { name } => {
            client.delete_collection(&name).await?;
            println!("deleted {name}");
        }
    }
    Ok(())
}

fn parse_property(raw: &str) -> PropertySpec {
    match raw.split_once(':') {
        Some((name, data_type)) => PropertySpec::new(name.trim(), DataType::parse_lenient(data_type)),
        None => PropertySpec::new(raw.trim(), DataType::Text),
    }
}

fn render_summary(collection: &str, summary: &CollectionSummary) -> String {
    format!(
        "summary of {collection}\n\
         total chunks: {}\n\
         total words: {}\n\
         total characters: {}\n\
         source files: {}\n\
         upload date: {}\n\
         average words per chunk: {}\n\
         average characters per chunk: {}\n",
        summary.total_chunks,
        summary.total_words,
        summary.total_characters,
        summary.source_files.join(", "),
        summary.uploaded_at.as_deref().unwrap_or("Unknown"),
        summary.average_words(),
        summary.average_characters(),
    )
}

fn print_hit(hit: &SearchHit) {
    let mut metrics = Vec::new();
    if let Some(score) = hit.score {
        metrics.push(format!("score={score:.4}"));
    }
    if let Some(distance) = hit.distance {
        metrics.push(format!("distance={distance:.4}"));
    }
    if let Some(certainty) = hit.certainty {
        metrics.push(format!("certainty={certainty:.4}"));
    }

    println!(
        "[{}] chunk={} {}",
        hit.uuid,
        hit.chunk_id().map(|id| id.to_string()).unwrap_or_else(|| "N/A".to_string()),
        metrics.join(" ")
    );
    if let Some(text) = hit.text() {
        println!("  chunk_text:\n{text}");
    }
}

use crate::chunking::{chunk_with, ChunkingConfig};
use crate::extractor::{ExtractedText, PdfExtractor};
use crate::models::{ChunkObject, ProcessReport};
use crate::traits::ChunkStore;
use crate::IngestError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf_name(&entry.path().to_string_lossy()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Extracts, chunks and stores one PDF held in memory.
///
/// Extraction failures surface as `PdfParse`, bad chunking parameters as
/// `InvalidArgument`, and transport failures of the store as `Store`.
/// Objects the store rejected individually are counted in the report.
pub async fn process_pdf_bytes<E, S>(
    extractor: &E,
    store: &S,
    collection: &str,
    file_name: &str,
    bytes: &[u8],
    config: &ChunkingConfig,
) -> Result<ProcessReport, IngestError>
where
    E: PdfExtractor + Sync + ?Sized,
    S: ChunkStore + Sync + ?Sized,
{
    config.validate()?;
    let extracted = extractor.extract(bytes)?;
    store_extracted_text(store, collection, file_name, bytes.len() as u64, extracted, config).await
}

/// Chunks already extracted text and stores it with its source metadata.
pub async fn store_extracted_text<S>(
    store: &S,
    collection: &str,
    file_name: &str,
    file_size_bytes: u64,
    extracted: ExtractedText,
    config: &ChunkingConfig,
) -> Result<ProcessReport, IngestError>
where
    S: ChunkStore + Sync + ?Sized,
{
    config.validate()?;

    let text = extracted.full_text();
    let extracted_text_length = text.chars().count();
    info!(
        file = file_name,
        characters = extracted_text_length,
        pages = extracted.page_count(),
        failed_pages = extracted.failed_pages.len(),
        "extracted pdf text"
    );

    let uploaded_at = Utc::now();
    let objects = chunk_with(&text, config)
        .into_iter()
        .map(|chunk| ChunkObject {
            chunk,
            source_file: Some(file_name.to_string()),
            uploaded_at: Some(uploaded_at),
            file_size_bytes: Some(file_size_bytes),
        })
        .collect::<Vec<_>>();

    let mut report = ProcessReport {
        source_file: file_name.to_string(),
        file_size_bytes,
        extracted_text_length,
        failed_pages: extracted.failed_pages,
        total_chunks: objects.len(),
        successful_uploads: 0,
        failed_uploads: 0,
        failures: Vec::new(),
    };

    if objects.is_empty() {
        warn!(file = file_name, "pdf produced no chunks");
        return Ok(report);
    }

    let inserted = store.insert_chunks(collection, &objects).await?;
    report.successful_uploads = inserted.succeeded;
    report.failed_uploads = inserted.failed + inserted.not_attempted;
    report.failures = inserted.errors;

    if report.failed_uploads > 0 {
        warn!(
            file = file_name,
            failed = report.failed_uploads,
            not_attempted = inserted.not_attempted,
            first_error = report.failures.first().map(|f| f.message.as_str()).unwrap_or(""),
            "some chunks were not stored"
        );
    }

    info!(
        file = file_name,
        chunks = report.total_chunks,
        stored = report.successful_uploads,
        "processed pdf"
    );
    Ok(report)
}

pub async fn process_pdf_file<E, S>(
    extractor: &E,
    store: &S,
    collection: &str,
    path: &Path,
    config: &ChunkingConfig,
) -> Result<ProcessReport, IngestError>
where
    E: PdfExtractor + Sync + ?Sized,
    S: ChunkStore + Sync + ?Sized,
{
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();
    let bytes = tokio::fs::read(path).await?;
    process_pdf_bytes(extractor, store, collection, &file_name, &bytes, config).await
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct FolderReport {
    pub processed: Vec<ProcessReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl FolderReport {
    pub fn total_chunks(&self) -> usize {
        self.processed.iter().map(|report| report.total_chunks).sum()
    }

    pub fn successful_uploads(&self) -> usize {
        self.processed.iter().map(|report| report.successful_uploads).sum()
    }

    pub fn failed_uploads(&self) -> usize {
        self.processed.iter().map(|report| report.failed_uploads).sum()
    }
}

/// Processes every PDF under `folder`; files that fail are skipped with
/// their reason rather than aborting the run.
pub async fn ingest_folder<E, S>(
    extractor: &E,
    store: &S,
    collection: &str,
    folder: &Path,
    config: &ChunkingConfig,
) -> Result<FolderReport, IngestError>
where
    E: PdfExtractor + Sync + ?Sized,
    S: ChunkStore + Sync + ?Sized,
{
    config.validate()?;
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let mut processed = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match process_pdf_file(extractor, store, collection, &path, config).await {
            Ok(report) => processed.push(report),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(FolderReport {
        processed,
        skipped_files,
    })
}

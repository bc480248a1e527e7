use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Best-effort text of a whole document. Pages whose text layer could not
/// be decoded are listed in `failed_pages` and contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub pages: Vec<PageText>,
    pub failed_pages: Vec<u32>,
}

impl ExtractedText {
    /// Page texts concatenated in order, trimmed.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + self.failed_pages.len()
    }
}

pub trait PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, IngestError>;

    fn extract_file(&self, path: &Path) -> Result<ExtractedText, IngestError> {
        let bytes = std::fs::read(path)?;
        self.extract(&bytes)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut extracted = ExtractedText::default();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) => extracted.pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Err(error) => {
                    warn!(page = page_no, error = %error, "skipping page without readable text");
                    extracted.failed_pages.push(page_no);
                }
            }
        }

        debug!(
            pages = extracted.pages.len(),
            failed = extracted.failed_pages.len(),
            "pdf text extracted"
        );
        Ok(extracted)
    }
}

pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    Ok(LopdfExtractor.extract_file(path)?.full_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let result = LopdfExtractor.extract(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = LopdfExtractor.extract_file(Path::new("/definitely/not/here.pdf"));
        assert!(matches!(result, Err(IngestError::Io(_))));
    }

    #[test]
    fn full_text_concatenates_pages_and_trims() {
        let extracted = ExtractedText {
            pages: vec![
                PageText {
                    number: 1,
                    text: "  First page ".to_string(),
                },
                PageText {
                    number: 3,
                    text: "third page\n".to_string(),
                },
            ],
            failed_pages: vec![2],
        };

        assert_eq!(extracted.full_text(), "First page third page");
        assert_eq!(extracted.page_count(), 3);
    }
}

//! Turns a staged document file into plain text.
//!
//! Plain-text files are read as they are. PDFs go PDF → page images → vision
//! OCR, and standalone images go straight to vision OCR.

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::gateway::{GenerationGateway, bind_template};
use crate::prompts::DOCUMENT_OCR_PROMPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub status: ExtractionStatus,
    pub text: Option<String>,
    pub error: Option<String>,
}

impl ExtractionOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Success,
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Error,
            text: None,
            error: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from the file at `path`. Failures are reported in the
    /// outcome, never raised.
    async fn extract_text(&self, path: &Path) -> ExtractionOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    PlainText,
    Pdf,
    Image,
}

impl DocumentKind {
    fn detect(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "text" | "md" | "csv" => Some(DocumentKind::PlainText),
            "pdf" => Some(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" | "tif" | "tiff" => {
                Some(DocumentKind::Image)
            }
            _ => None,
        }
    }
}

/// Production extractor backed by the vision generation service.
pub struct DocumentTextExtractor {
    gateway: Arc<GenerationGateway>,
}

impl DocumentTextExtractor {
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self { gateway }
    }

    async fn extract(&self, path: &Path) -> anyhow::Result<String> {
        let kind = DocumentKind::detect(path)
            .ok_or_else(|| anyhow!("unsupported document type: {}", path.display()))?;

        if !tokio::fs::try_exists(path).await? {
            return Err(anyhow!("file not found: {}", path.display()));
        }

        let text = match kind {
            DocumentKind::PlainText => tokio::fs::read_to_string(path).await?,
            DocumentKind::Pdf => {
                let pages = render_pdf_pages(path.to_path_buf()).await?;
                if pages.is_empty() {
                    return Err(anyhow!("no pages rendered from PDF"));
                }
                let urls = pages
                    .iter()
                    .map(|page| image_to_base64(page).map(|b64| png_data_url(&b64)))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                self.transcribe(&urls).await?
            }
            DocumentKind::Image => {
                let bytes = tokio::fs::read(path).await?;
                let format = image::guess_format(&bytes)
                    .map_err(|e| anyhow!("unrecognised image data: {}", e))?;
                let url = format!(
                    "data:{};base64,{}",
                    format.to_mime_type(),
                    STANDARD.encode(&bytes)
                );
                self.transcribe(&[url]).await?
            }
        };

        Ok(text)
    }

    async fn transcribe(&self, image_urls: &[String]) -> anyhow::Result<String> {
        let page_count = image_urls.len().to_string();
        let prompt = bind_template(DOCUMENT_OCR_PROMPT, &[("page_count", page_count.as_str())])?;

        info!(pages = image_urls.len(), "sending pages to vision OCR");
        let text = self.gateway.describe_images(&prompt, image_urls).await?;
        info!(characters = text.len(), "vision OCR completed");
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract_text(&self, path: &Path) -> ExtractionOutcome {
        match self.extract(path).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(path = %path.display(), "no text extracted from document");
                ExtractionOutcome::error("no text extracted from document")
            }
            Ok(text) => ExtractionOutcome::success(text),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "text extraction failed");
                ExtractionOutcome::error(e.to_string())
            }
        }
    }
}

/// pdf2image shells out to poppler, so rendering runs on the blocking pool.
async fn render_pdf_pages(path: PathBuf) -> anyhow::Result<Vec<DynamicImage>> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<DynamicImage>> {
        let pdf = PDF::from_file(&path).map_err(|e| anyhow!("Failed to load PDF: {}", e))?;
        let pages = pdf
            .render(Pages::All, None)
            .map_err(|e| anyhow!("Failed to render PDF pages: {}", e))?;
        info!(pages = pages.len(), "rendered PDF pages");
        Ok(pages)
    })
    .await?
}

fn image_to_base64(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {}", e))?;
    Ok(STANDARD.encode(&buffer))
}

fn png_data_url(base64_png: &str) -> String {
    format!("data:image/png;base64,{}", base64_png)
}

//! Vision sub-pipeline: materializes a summary on every radiology file that
//! lacks one, ahead of the radiology analysis stage.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::gateway::GenerationGateway;
use crate::models::FileCategory;
use crate::prompts::RADIOLOGY_VISION_PROMPT;
use crate::store::{CaseStore, FileMetadata, StoreError};

pub struct VisionSubPipeline {
    gateway: Arc<GenerationGateway>,
    store: Arc<dyn CaseStore>,
}

impl VisionSubPipeline {
    pub fn new(gateway: Arc<GenerationGateway>, store: Arc<dyn CaseStore>) -> Self {
        Self { gateway, store }
    }

    /// Analyze the case's radiology files that have no summary yet and write the
    /// JSON result back as their `ai_summary`.
    ///
    /// A file's stored `file_url` is sent when present; otherwise its entry in
    /// `inline_images` (keyed by file id) is. Returns one message per file that
    /// could not be analyzed. Only a failure to list the case files is an error.
    pub async fn run(
        &self,
        case_id: &str,
        inline_images: &HashMap<String, String>,
    ) -> Result<Vec<String>, StoreError> {
        let files = self.store.get_case_files(case_id).await?;
        let mut errors = Vec::new();

        for file in files.iter().filter(|f| f.file_category == FileCategory::Radiology) {
            if file.ai_summary.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                continue;
            }
            let url = file
                .file_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .or_else(|| inline_images.get(&file.file_id).map(String::as_str));
            let Some(url) = url else {
                warn!(case_id = %case_id, file_name = %file.file_name, "radiology file has no public URL or image data");
                errors.push(format!("{}: no public URL or image data for vision analysis", file.file_name));
                continue;
            };

            let analysis = match self.gateway.invoke_vision(RADIOLOGY_VISION_PROMPT, url).await {
                Ok(Some(analysis)) => analysis,
                Ok(None) => {
                    warn!(case_id = %case_id, file_name = %file.file_name, "vision analysis returned no JSON");
                    continue;
                }
                Err(e) => {
                    warn!(case_id = %case_id, file_name = %file.file_name, error = %e, "vision analysis failed");
                    errors.push(format!("{}: {}", file.file_name, e));
                    continue;
                }
            };

            let metadata = FileMetadata {
                text_data: None,
                ai_summary: Some(analysis.to_string()),
            };
            if let Err(e) = self.store.update_case_file_metadata(&file.file_id, metadata).await {
                warn!(case_id = %case_id, file_name = %file.file_name, error = %e, "could not store vision summary");
                errors.push(format!("{}: {}", file.file_name, e));
                continue;
            }

            info!(case_id = %case_id, file_name = %file.file_name, "vision summary stored");
        }

        Ok(errors)
    }
}

/// Inline `data:` URL for uploaded image bytes. The media type is sniffed from
/// the bytes, falling back to the declared type when it names an image.
/// Returns `None` for empty uploads and for data that is not an image.
pub fn image_data_url(bytes: &[u8], declared_type: &str) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mime = match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) if declared_type.starts_with("image/") => declared_type.to_string(),
        Err(_) => return None,
    };
    Some(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The eight-byte PNG signature is enough for format sniffing.
    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn sniffed_format_wins_over_declared_type() {
        let url = image_data_url(PNG_SIGNATURE, "application/octet-stream").unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn declared_image_type_is_used_for_unrecognised_bytes() {
        let url = image_data_url(b"raw", "image/x-dicom").unwrap();
        assert!(url.starts_with("data:image/x-dicom;base64,"));
    }

    #[test]
    fn empty_or_non_image_uploads_have_no_data_url() {
        assert_eq!(image_data_url(&[], "image/png"), None);
        assert_eq!(image_data_url(b"plain text", "text/plain"), None);
    }
}

use tracing::{debug, error, warn};

use common::error::AppError;

use crate::merge::{self, PageOcr};
use crate::ocr::OcrEngine;
use crate::pdf;

/// Resolves the effective MIME type for an upload. A declared type wins;
/// otherwise the file extension decides, falling back to `text/plain`.
pub fn resolve_mime(declared: Option<&str>, file_name: &str) -> String {
    if let Some(mime_type) = declared {
        if !mime_type.trim().is_empty() {
            return mime_type.trim().to_owned();
        }
    }

    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or("text/plain")
        .to_owned()
}

/// Extracts the full text of a document according to its MIME type.
///
/// Plain text and markdown pass through as UTF-8. PDFs combine native text
/// with OCR of embedded images; everything else is rejected.
pub async fn extract_text(
    bytes: Vec<u8>,
    mime_type: &str,
    ocr: &dyn OcrEngine,
) -> Result<String, AppError> {
    match mime_type {
        "text/plain" | "text/markdown" => String::from_utf8(bytes)
            .map(|text| text.trim().to_owned())
            .map_err(|err| AppError::Extraction(format!("File is not valid UTF-8: {err}"))),
        "application/pdf" => merged_pdf_text(bytes, ocr).await,
        other => Err(AppError::Extraction(format!(
            "Unsupported MIME type: {other}"
        ))),
    }
}

/// Native PDF text merged with OCR of embedded images, page by page.
///
/// Native extraction failing is fatal. Image handling is not: a failed image
/// scan or a failed OCR call is logged and the document proceeds with
/// whatever text was recovered.
async fn merged_pdf_text(bytes: Vec<u8>, ocr: &dyn OcrEngine) -> Result<String, AppError> {
    let native_text = pdf::extract_pdf_text(bytes.clone()).await?;
    let native_pages = merge::split_into_pages(&native_text);

    let images_by_page = match pdf::extract_page_images(bytes).await {
        Ok(images) => images,
        Err(err) => {
            error!(error = %err, "Failed to scan PDF for embedded images; continuing with native text");
            Default::default()
        }
    };

    let mut ocr_pages = PageOcr::new();
    for (page, images) in &images_by_page {
        let mut entries = Vec::new();
        for image in images {
            match ocr.recognize(image).await {
                Ok(text) if text.is_empty() => {
                    debug!(page, "Embedded image produced no text");
                }
                Ok(text) => entries.push((image.y, text)),
                Err(err) => {
                    warn!(page, error = %err, "OCR failed for embedded image; skipping");
                }
            }
        }
        if !entries.is_empty() {
            entries.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            ocr_pages.insert(*page, entries);
        }
    }

    Ok(merge::merge_pages(&native_pages, &ocr_pages))
}

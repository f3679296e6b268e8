use std::collections::BTreeMap;

use lopdf::{content::Content, Dictionary, Document as PdfDocument, Object, ObjectId};
use tracing::{debug, warn};

use common::error::AppError;

/// An embedded image lifted out of a page, positioned for reading order.
/// `y` grows downward (PDF user space grows upward; the translation is
/// negated) so sorting ascending reads top to bottom.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub y: f32,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Runs `pdf-extract` over the raw bytes off the async executor.
pub async fn extract_pdf_text(pdf_bytes: Vec<u8>) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&pdf_bytes).map(|text| text.trim().to_owned())
    })
    .await?
    .map_err(|err| AppError::Extraction(format!("Failed to extract text from PDF: {err}")))
}

/// Walks every page's content stream and collects the embedded images with
/// their vertical positions. A page that cannot be parsed is logged and
/// skipped; image recovery is best-effort and never fatal to the document.
pub async fn extract_page_images(
    pdf_bytes: Vec<u8>,
) -> Result<BTreeMap<u32, Vec<PageImage>>, AppError> {
    tokio::task::spawn_blocking(move || collect_page_images(&pdf_bytes)).await?
}

fn collect_page_images(pdf_bytes: &[u8]) -> Result<BTreeMap<u32, Vec<PageImage>>, AppError> {
    let document = PdfDocument::load_mem(pdf_bytes)
        .map_err(|err| AppError::Extraction(format!("Failed to parse PDF: {err}")))?;

    let mut by_page = BTreeMap::new();
    for (page_number, page_id) in document.get_pages() {
        match page_images(&document, page_id) {
            Ok(images) if !images.is_empty() => {
                by_page.insert(page_number, images);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    page = page_number,
                    error = %err,
                    "Failed to inspect page for embedded images; skipping"
                );
            }
        }
    }

    Ok(by_page)
}

fn page_images(document: &PdfDocument, page_id: ObjectId) -> Result<Vec<PageImage>, AppError> {
    let xobjects = page_xobjects(document, page_id)?;
    if xobjects.is_empty() {
        return Ok(Vec::new());
    }

    let content_data = document
        .get_page_content(page_id)
        .map_err(|err| AppError::Extraction(format!("Failed to read page content: {err}")))?;
    let content = Content::decode(&content_data)
        .map_err(|err| AppError::Extraction(format!("Failed to decode page content: {err}")))?;

    // Approximate placement tracking: accumulate the translation component of
    // `cm` matrices, with a q/Q save stack. Good enough to order images
    // vertically; full matrix math is not needed for reading order.
    let mut translate_y = 0.0f32;
    let mut saved: Vec<f32> = Vec::new();
    let mut images = Vec::new();

    for operation in &content.operations {
        match operation.operator.as_str() {
            "q" => saved.push(translate_y),
            "Q" => translate_y = saved.pop().unwrap_or(0.0),
            "cm" => {
                if let Some(ty) = operation.operands.get(5).and_then(operand_to_f32) {
                    translate_y += ty;
                }
            }
            "Do" => {
                let Some(name) = operation.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                let Some(object_id) = xobjects.get(name) else {
                    continue;
                };
                if let Some(image) = image_from_xobject(document, *object_id, -translate_y) {
                    images.push(image);
                }
            }
            _ => {}
        }
    }

    images.sort_by(|a, b| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal));
    Ok(images)
}

/// Maps XObject names to their object ids, following the `Parent` chain when
/// resources are inherited from the page tree.
fn page_xobjects(
    document: &PdfDocument,
    page_id: ObjectId,
) -> Result<BTreeMap<Vec<u8>, ObjectId>, AppError> {
    let mut names = BTreeMap::new();

    let mut node = Some(page_id);
    while let Some(node_id) = node {
        let dict = document
            .get_dictionary(node_id)
            .map_err(|err| AppError::Extraction(format!("Failed to read page node: {err}")))?;

        if let Ok(resources_obj) = dict.get(b"Resources") {
            if let Some(resources) = resolve_dict(document, resources_obj) {
                if let Ok(xobjects_obj) = resources.get(b"XObject") {
                    if let Some(xobjects) = resolve_dict(document, xobjects_obj) {
                        for (name, value) in xobjects.iter() {
                            if let Ok(object_id) = value.as_reference() {
                                names.entry(name.clone()).or_insert(object_id);
                            }
                        }
                    }
                }
            }
            break;
        }

        node = dict
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok());
    }

    Ok(names)
}

fn resolve_dict<'a>(document: &'a PdfDocument, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => document
            .get_object(*id)
            .ok()
            .and_then(|resolved| resolved.as_dict().ok()),
        _ => None,
    }
}

fn image_from_xobject(document: &PdfDocument, object_id: ObjectId, y: f32) -> Option<PageImage> {
    let object = document.get_object(object_id).ok()?;
    let stream = object.as_stream().ok()?;

    let subtype = stream.dict.get(b"Subtype").ok()?.as_name().ok()?;
    if subtype != b"Image" {
        return None;
    }

    if !has_dct_filter(&stream.dict) {
        // Raw samples of non-JPEG encodings are not a renderable payload for
        // the OCR engine, so they are skipped rather than mis-labelled.
        debug!(object = ?object_id, "Skipping embedded image with unsupported encoding");
        return None;
    }

    Some(PageImage {
        y,
        bytes: stream.content.clone(),
        mime: "image/jpeg",
    })
}

fn has_dct_filter(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"DCTDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| matches!(f, Object::Name(name) if name == b"DCTDecode")),
        _ => false,
    }
}

fn operand_to_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

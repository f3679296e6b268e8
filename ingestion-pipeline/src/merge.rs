use std::collections::{BTreeMap, BTreeSet};

/// Separator written between pages of merged output.
pub const PAGE_BREAK_SEPARATOR: &str = "\n\n=== Page Break ===\n\n";

/// OCR results for one page: `(vertical position, recognized text)` per
/// embedded image, ordered top to bottom.
pub type PageOcr = BTreeMap<u32, Vec<(f32, String)>>;

/// Splits extracted document text into 1-indexed pages by scanning for
/// page-marker lines (`Page N` / `[Page N]`). Marker lines are separators,
/// not content; leading or consecutive markers never produce empty pages.
pub fn split_into_pages(text: &str) -> BTreeMap<u32, String> {
    let mut pages = BTreeMap::new();
    let mut current_page: u32 = 1;
    let mut current_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_page_marker(line) {
            if !current_lines.is_empty() {
                pages.insert(current_page, current_lines.join("\n"));
                current_lines.clear();
                current_page += 1;
            }
        } else {
            current_lines.push(line);
        }
    }

    if !current_lines.is_empty() {
        pages.insert(current_page, current_lines.join("\n"));
    }

    pages
}

fn is_page_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("Page ") || trimmed.starts_with("[Page ")
}

/// Merges native page text with per-page OCR text into one stream.
///
/// Every page number present in either source emits, in ascending order:
/// native text first, then the page's OCR texts joined by newlines. A page
/// carrying only OCR text still appears. Pages are joined with
/// [`PAGE_BREAK_SEPARATOR`].
pub fn merge_pages(native: &BTreeMap<u32, String>, ocr: &PageOcr) -> String {
    let all_pages: BTreeSet<u32> = native.keys().chain(ocr.keys()).copied().collect();
    let mut merged_pages = Vec::with_capacity(all_pages.len());

    for page in all_pages {
        let mut parts: Vec<&str> = Vec::new();

        if let Some(text) = native.get(&page) {
            parts.push(text.as_str());
        }

        let ocr_joined;
        if let Some(entries) = ocr.get(&page) {
            let texts: Vec<&str> = entries
                .iter()
                .map(|(_, text)| text.as_str())
                .filter(|text| !text.is_empty())
                .collect();
            if !texts.is_empty() {
                ocr_joined = texts.join("\n");
                parts.push(&ocr_joined);
            }
        }

        if !parts.is_empty() {
            merged_pages.push(parts.join("\n"));
        }
    }

    merged_pages.join(PAGE_BREAK_SEPARATOR)
}

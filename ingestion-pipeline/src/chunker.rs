use common::error::AppError;

/// Splits text into overlapping character windows, snapping window ends back
/// to the last space so words are never cut in half. Consecutive chunks share
/// `overlap` characters of context.
///
/// Text shorter than `size` yields exactly one chunk. `overlap >= size` would
/// stall the window and is rejected up front.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, AppError> {
    let chars: Vec<char> = text.chars().collect();
    let spans = split_spans(&chars, size, overlap)?;

    Ok(spans
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect::<String>().trim().to_owned())
        .collect())
}

/// Window boundaries over the char sequence. Separated from the string
/// assembly so the coverage invariant (no gaps, forward progress, full span)
/// is directly checkable.
fn split_spans(
    chars: &[char],
    size: usize,
    overlap: usize,
) -> Result<Vec<(usize, usize)>, AppError> {
    if size == 0 {
        return Err(AppError::Validation("chunk size must be non-zero".into()));
    }
    if overlap >= size {
        return Err(AppError::Validation(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
        )));
    }

    let len = chars.len();
    if len == 0 {
        return Ok(vec![(0, 0)]);
    }

    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + size).min(len);

        // Word-boundary snapping: only when the window stops mid-word, and
        // never further back than the window start.
        if end < len && chars[end] != ' ' {
            if let Some(offset) = chars[start..end].iter().rposition(|c| *c == ' ') {
                if offset > 0 {
                    end = start + offset;
                }
            }
        }

        spans.push((start, end));

        if end >= len {
            break;
        }

        // Overlap the next window, but always move forward.
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    Ok(spans)
}

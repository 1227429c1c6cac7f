//! Splitting long replies under the Telegram message-length limit.
//!
//! Chunks break at a paragraph boundary when one fits, then at the last
//! whitespace, and only mid-word when a single word exceeds the limit. The
//! boundary character stays at the end of the leading chunk, so concatenating
//! the chunks restores the original text exactly.

/// Split `text` into ordered chunks of at most `limit` chars each.
///
/// Returns no chunks for empty input and one chunk for anything that already
/// fits.
pub fn split_reply(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        let Some((window_end, _)) = remaining.char_indices().nth(limit) else {
            // The rest fits in one chunk.
            chunks.push(remaining.to_string());
            return chunks;
        };

        let window = &remaining[..window_end];
        let cut = find_cut(window);
        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }
}

/// Byte offset to cut a window that is exactly one chunk wide.
fn find_cut(window: &str) -> usize {
    // Prefer a paragraph break, keeping it with the leading chunk.
    if let Some(idx) = window.rfind("\n\n") {
        return idx + 2;
    }

    // Then the last whitespace.
    let mut last_ws = None;
    for (idx, c) in window.char_indices() {
        if c.is_whitespace() {
            last_ws = Some(idx + c.len_utf8());
        }
    }
    if let Some(cut) = last_ws {
        return cut;
    }

    // One unbroken word wider than the limit: hard cut.
    window.len()
}

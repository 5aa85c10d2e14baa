//! Semantic chunking of tool descriptions.
//!
//! Long descriptions are segmented along semantic boundaries before embedding so each vector
//! captures a coherent span. Behaviour:
//!
//! - Fast path: a budget of `0`, or text within the budget, passes through verbatim.
//! - Boundary selection: the first separator of `"\n\n"` → `"\n"` → `". "` that occurs in the
//!   text wins; the text is split there with the separator re-attached to the preceding part.
//! - Greedy merge: segments accumulate into a buffer until adding one would exceed the budget;
//!   the buffer is emitted and the next one is seeded with a continuation prefix
//!   `"{tool_name}: ... "` plus the tail of the previous buffer.
//! - Hard split: a single segment larger than the budget is sliced into budget-sized pieces,
//!   each carrying the continuation prefix and a tail overlap of its predecessor.
//!
//! Every chunk after the first begins with the continuation prefix, so the embedding model
//! always sees the tool name. Budgets count characters, not bytes.

/// One bounded slice of a tool description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position within the chunk set.
    pub index: usize,
    /// Total number of chunks produced for the description.
    pub total: usize,
    /// Text submitted to the embedding service.
    pub text: String,
}

const SEPARATORS: [&str; 3] = ["\n\n", "\n", ". "];

/// Split `text` into bounded, overlapping chunks.
pub fn chunk(text: &str, tool_name: &str, max_chunk_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    if max_chunk_chars == 0 || char_len(text) <= max_chunk_chars {
        return vec![Chunk {
            index: 0,
            total: 1,
            text: text.to_string(),
        }];
    }

    let prefix = format!("{tool_name}: ... ");
    let segments = split_segments(text);

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    // Tracks whether `current` holds anything beyond a continuation seed.
    let mut dirty = false;

    for segment in segments {
        if char_len(&segment) > max_chunk_chars {
            if dirty {
                pieces.push(std::mem::take(&mut current));
            }
            hard_split(&segment, &prefix, max_chunk_chars, overlap_chars, &mut pieces);
            current = continuation(&prefix, pieces.last().map(String::as_str), overlap_chars);
            dirty = false;
            continue;
        }

        if dirty && char_len(&current) + char_len(&segment) > max_chunk_chars {
            pieces.push(current.clone());
            current = continuation(&prefix, Some(&current), overlap_chars);
        }
        current.push_str(&segment);
        dirty = true;
    }
    if dirty {
        pieces.push(current);
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { index, total, text })
        .collect()
}

/// Seed for the next buffer: the prefix plus the tail of the previously emitted chunk.
fn continuation(prefix: &str, previous: Option<&str>, overlap_chars: usize) -> String {
    let mut seed = prefix.to_string();
    if overlap_chars > 0 {
        if let Some(previous) = previous {
            seed.push_str(char_tail(previous, overlap_chars));
        }
    }
    seed
}

/// Slice an oversized segment into budget-sized pieces.
fn hard_split(
    segment: &str,
    prefix: &str,
    max_chunk_chars: usize,
    overlap_chars: usize,
    pieces: &mut Vec<String>,
) {
    for slice in char_slices(segment, max_chunk_chars) {
        if pieces.is_empty() {
            pieces.push(slice.to_string());
        } else {
            let mut piece = continuation(prefix, pieces.last().map(String::as_str), overlap_chars);
            piece.push_str(slice);
            pieces.push(piece);
        }
    }
}

/// Split on the first separator that occurs, keeping it attached to the preceding part.
fn split_segments(text: &str) -> Vec<String> {
    let Some(separator) = SEPARATORS.iter().find(|sep| text.contains(**sep)) else {
        return vec![text.to_string()];
    };

    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(position) = rest.find(separator) {
        let end = position + separator.len();
        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Last `count` characters of `text`, respecting char boundaries.
fn char_tail(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= count {
        return text;
    }
    let skip = total - count;
    match text.char_indices().nth(skip) {
        Some((byte, _)) => &text[byte..],
        None => text,
    }
}

/// Consecutive slices of at most `size` characters.
fn char_slices(text: &str, size: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (byte, _) in text.char_indices() {
        if count == size {
            slices.push(&text[start..byte]);
            start = byte;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        slices.push(&text[start..]);
    }
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through_verbatim() {
        let chunks = chunk("Read a file from disk", "read_file", 500, 100);
        assert_eq!(
            chunks,
            vec![Chunk {
                index: 0,
                total: 1,
                text: "Read a file from disk".into()
            }]
        );
    }

    #[test]
    fn zero_budget_disables_chunking() {
        let text = "x".repeat(10_000);
        let chunks = chunk(&text, "big_tool", 0, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn paragraph_separator_wins_over_line_separator() {
        let text = format!("{}\n\n{}\nmore", "a".repeat(40), "b".repeat(40));
        let chunks = chunk(&text, "tool", 50, 0);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn sentence_separator_used_when_no_newlines() {
        let text = format!("{}. {}. {}", "a".repeat(30), "b".repeat(30), "c".repeat(30));
        let chunks = chunk(&text, "tool", 40, 0);
        assert!(chunks.len() > 1);
        assert!(chunks[0].text.ends_with(". "));
    }

    #[test]
    fn continuation_chunks_carry_the_tool_name_prefix() {
        let text = (0..20)
            .map(|i| format!("sentence number {i} padding padding"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk(&text, "list_issues", 80, 10);
        assert!(chunks.len() > 1);
        for piece in &chunks[1..] {
            assert!(
                piece.text.starts_with("list_issues: ... "),
                "chunk {} missing prefix: {}",
                piece.index,
                piece.text
            );
        }
    }

    #[test]
    fn indexes_and_totals_are_coherent() {
        let text = "line one\nline two\nline three\nline four\nline five";
        let chunks = chunk(&text.repeat(4), "tool", 30, 5);
        let total = chunks.len();
        for (expected, piece) in chunks.iter().enumerate() {
            assert_eq!(piece.index, expected);
            assert_eq!(piece.total, total);
        }
    }

    #[test]
    fn adjacent_chunks_share_an_overlap_tail() {
        let text = (0..30)
            .map(|i| format!("entry {i:02} with some detail"))
            .collect::<Vec<_>>()
            .join("\n");
        let overlap = 12;
        let chunks = chunk(&text, "tool", 60, overlap);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .text
                .chars()
                .rev()
                .take(overlap)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(
                pair[1].text.contains(&tail),
                "tail {tail:?} missing from {:?}",
                pair[1].text
            );
        }
    }

    #[test]
    fn oversized_segment_is_hard_split() {
        let text = "x".repeat(3_000);
        let chunks = chunk(&text, "big_tool", 500, 50);
        assert!(chunks.len() >= 6);
        assert_eq!(chunks[0].text, "x".repeat(500));
        for piece in &chunks[1..] {
            assert!(piece.text.starts_with("big_tool: ... "));
        }
    }

    #[test]
    fn hard_split_respects_multibyte_boundaries() {
        let text = "é".repeat(120);
        let chunks = chunk(&text, "tool", 50, 10);
        assert!(chunks.len() >= 3);
        let rebuilt: usize = chunks
            .iter()
            .map(|piece| piece.text.matches('é').count())
            .sum();
        assert!(rebuilt >= 120);
    }

    #[test]
    fn zero_overlap_still_prefixes_continuations() {
        let text = "first line\nsecond line\nthird line\nfourth line";
        let chunks = chunk(&text.repeat(3), "tool", 40, 0);
        assert!(chunks.len() > 1);
        for piece in &chunks[1..] {
            assert!(piece.text.starts_with("tool: ... "));
        }
    }
}

//! Splits a final reply text into provider-sized pieces on sensible
//! boundaries: newline first, then word, falling back to a hard split only
//! when a single word itself exceeds the cap.

/// Telephony provider cap (characters).
pub const TELEPHONY_MAX_LEN: usize = 1600;

/// Web provider cap (characters).
pub const WEB_MAX_LEN: usize = 4000;

/// Splits `text` into chunks no longer than `max_len`. Never returns an
/// empty chunk; returns an empty vector only for empty input.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let candidate_len = if current.is_empty() {
            line.len()
        } else {
            current.len() + 1 + line.len()
        };
        if candidate_len <= max_len {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = line.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let mut result = Vec::new();
    for piece in lines {
        if piece.len() <= max_len {
            result.push(piece);
        } else {
            result.extend(force_split(&piece, max_len));
        }
    }
    result
}

/// Force-splits an overlong line on word boundaries, hard-splitting at
/// `max_len` only when a single word exceeds it.
fn force_split(s: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = s;
    while rest.len() > max_len {
        let boundary = floor_char_boundary(rest, max_len);
        let window = &rest[..boundary];
        // A space found at index 0 can't give a non-empty piece, so treat it
        // the same as "no space found": fall back to a hard split at the cap.
        let split_at = match window.rfind(' ').or_else(|| window.rfind('\n')) {
            Some(0) | None => boundary,
            Some(at) => at,
        };
        let (piece, remainder) = rest.split_at(split_at);
        pieces.push(piece.trim_end().to_string());
        rest = remainder.trim_start_matches(' ');
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk("", 10).is_empty());
    }

    #[test]
    fn splits_on_newline_boundary_before_word_boundary() {
        let text = "one two\nthree four";
        let chunks = chunk(text, 8);
        assert!(chunks.iter().all(|c| c.len() <= 8));
        assert_eq!(chunks, vec!["one two".to_string(), "three".to_string(), "four".to_string()]);
    }

    #[test]
    fn never_splits_mid_word_unless_word_exceeds_cap() {
        let text = "supercalifragilisticexpialidocious is long";
        let chunks = chunk(text, 10);
        assert!(chunks.iter().all(|c| c.len() <= 10));
        // the oversized word itself gets hard-split, but no other word does.
        assert!(chunks.iter().any(|c| c == "is" || c == "long"));
    }

    #[test]
    fn respects_provider_caps() {
        let text = "x".repeat(5000);
        let chunks = chunk(&text, WEB_MAX_LEN);
        assert!(chunks.iter().all(|c| c.len() <= WEB_MAX_LEN));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 5000);
    }

    #[test]
    fn never_emits_an_empty_chunk() {
        let text = "a\n\n\nb";
        let chunks = chunk(text, 3);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }
}

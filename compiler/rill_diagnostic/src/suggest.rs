//! "Did you mean?" suggestions.
//!
//! Fuzzy matching for identifier suggestions using Levenshtein edit
//! distance, consulted when an assignment targets an unknown name.

/// Calculate Levenshtein edit distance between two strings.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Two-row optimization instead of the full matrix.
    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a.chars().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b.chars().enumerate() {
            let cost = usize::from(a_char != b_char);

            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Threshold scaled to the input length, so short names don't attract
/// unrelated suggestions.
fn default_threshold(name_len: usize) -> usize {
    match name_len {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        6..=10 => 3,
        n => (n / 2).min(5),
    }
}

/// Find the most similar name from candidates.
///
/// Returns the candidate with the smallest edit distance, if any candidate
/// is within the length-scaled threshold.
pub fn suggest_similar<'a>(
    name: &str,
    candidates: impl Iterator<Item = &'a str>,
) -> Option<&'a str> {
    let threshold = default_threshold(name.chars().count());
    let mut best: Option<(usize, &'a str)> = None;
    for candidate in candidates {
        let dist = edit_distance(name, candidate);
        if dist <= threshold && best.is_none_or(|(d, _)| dist < d) {
            best = Some((dist, candidate));
        }
    }
    best.map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("hello", "hello"), 0);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_suggest_similar() {
        let candidates = ["length", "height", "width"];
        assert_eq!(
            suggest_similar("lenght", candidates.iter().copied()),
            Some("length")
        );
        assert_eq!(suggest_similar("zzz", candidates.iter().copied()), None);
    }

    #[test]
    fn test_suggest_short_names_conservative() {
        // A 2-char input only tolerates one edit, so distant names stay quiet.
        let candidates = ["count", "total"];
        assert_eq!(suggest_similar("cn", candidates.iter().copied()), None);
    }

    #[test]
    fn test_suggest_prefers_closest() {
        let candidates = ["counter", "count"];
        assert_eq!(
            suggest_similar("coun", candidates.iter().copied()),
            Some("count")
        );
    }
}

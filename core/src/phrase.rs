//! Phrase normalisation shared by the HTML annotator and the document finder.

/// Lowercased, whitespace-separated words of a finding's `original` text.
pub fn target_words(original: &str) -> Vec<String> {
    original.split_whitespace().map(str::to_lowercase).collect()
}

/// Case-insensitive comparison of a document word with a lowercased target.
pub fn words_equal(word: &str, target_lower: &str) -> bool {
    if word.len() == target_lower.len() && word.eq_ignore_ascii_case(target_lower) {
        return true;
    }
    word.to_lowercase() == target_lower
}

/// Lowercase every char to exactly one char, keeping indices aligned with
/// the input. Chars whose lowercase form expands keep only its first char.
pub fn fold(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

pub fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Trimmed search phrase, or `None` when nothing is left to search for.
pub fn normalize_phrase(original: &str) -> Option<&str> {
    let trimmed = original.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_words_collapse_spacing_and_case() {
        assert_eq!(target_words("  Quick \n  Fox "), vec!["quick", "fox"]);
        assert!(target_words(" \t ").is_empty());
    }

    #[test]
    fn words_compare_without_case() {
        assert!(words_equal("QUICK", "quick"));
        assert!(words_equal("Ärger", "ärger"));
        assert!(!words_equal("quick,", "quick"));
    }

    #[test]
    fn fold_keeps_length() {
        let text = "İstanbul ABC";
        assert_eq!(fold(text).len(), text.chars().count());
        assert_eq!(fold("ABC"), vec!['a', 'b', 'c']);
    }

    #[test]
    fn normalize_trims() {
        assert_eq!(normalize_phrase("  net 30 "), Some("net 30"));
        assert_eq!(normalize_phrase("   "), None);
    }
}

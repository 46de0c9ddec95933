//! Term extraction for lexical matching.

use std::collections::BTreeSet;

/// Words too common to carry intent.
const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could", "do",
    "for", "from", "get", "has", "have", "help", "how", "i", "if", "in", "into", "is", "it", "its",
    "me", "my", "need", "of", "on", "or", "our", "please", "so", "some", "that", "the", "their",
    "them", "then", "this", "to", "use", "using", "want", "we", "what", "when", "which", "will",
    "with", "would", "you", "your",
];

/// Lowercased, stemmed terms of `text`, stop words removed.
pub fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

/// Terms of a label such as a tag or id: the whole label plus its
/// `-`/`_`-separated parts.
pub fn label_terms(label: &str) -> BTreeSet<String> {
    let mut out = terms(label);
    let whole = label.trim().to_lowercase();
    if !whole.is_empty() {
        out.insert(whole);
    }
    out
}

/// Strip a few English inflections so "commits", "committing" and "commit"
/// meet. Deliberately conservative: short words are left alone.
pub fn stem(word: &str) -> String {
    let len = word.len();
    if len > 5 && word.ends_with("ing") {
        return undouble(&word[..len - 3]);
    }
    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..len - 3]);
    }
    if len > 4 && word.ends_with("ed") {
        return undouble(&word[..len - 2]);
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..len - 1].to_owned();
    }
    word.to_owned()
}

fn undouble(stem: &str) -> String {
    let bytes = stem.as_bytes();
    let n = bytes.len();
    if n > 2
        && bytes[n - 1].is_ascii_alphabetic()
        && bytes[n - 1] == bytes[n - 2]
        && !matches!(bytes[n - 1], b'l' | b's' | b'z')
    {
        stem[..n - 1].to_owned()
    } else {
        stem.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_drop_stop_words_and_punctuation() {
        let t = terms("Please help me write the Git commit-message!");
        let got: Vec<&str> = t.iter().map(String::as_str).collect();
        assert_eq!(got, vec!["commit", "git", "message", "write"]);
    }

    #[test]
    fn test_stemming_joins_inflections() {
        assert_eq!(stem("commits"), "commit");
        assert_eq!(stem("committing"), "commit");
        assert_eq!(stem("reviewed"), "review");
        assert_eq!(stem("dependencies"), "dependency");
        assert_eq!(stem("status"), "status");
        assert_eq!(stem("class"), "class");
        assert_eq!(stem("bug"), "bug");
    }

    #[test]
    fn test_label_terms_keep_the_whole_label() {
        let t = label_terms("git-commit");
        assert!(t.contains("git-commit"));
        assert!(t.contains("git"));
        assert!(t.contains("commit"));
    }

    #[test]
    fn test_empty_text_has_no_terms() {
        assert!(terms("  ... ").is_empty());
        assert!(terms("the and of").is_empty());
    }
}

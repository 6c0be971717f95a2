//! Small utility helpers used across modules.

/// Lowercase word tokens; punctuation and whitespace act as separators.
/// Keeps `_` so identifiers like `unwrap_or` survive as a single token.
pub fn tokenize(s: &str) -> Vec<String> {
  s.split(|c: char| !(c.is_alphanumeric() || c == '_'))
    .filter(|t| !t.is_empty())
    .map(|t| t.to_lowercase())
    .collect()
}

/// True if `phrase` occurs in `haystack` as a whole token sequence.
/// Both sides go through `tokenize`, so matching ignores case and punctuation.
pub fn contains_phrase(haystack: &[String], phrase: &str) -> bool {
  let needle = tokenize(phrase);
  if needle.is_empty() || needle.len() > haystack.len() {
    return false;
  }
  haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// A keyword entry may list synonyms separated by `|`; any one of them matches.
pub fn matches_keyword(haystack: &[String], entry: &str) -> bool {
  entry.split('|').any(|alt| contains_phrase(haystack, alt))
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with full transcripts.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

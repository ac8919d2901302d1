//! Hallucination guard (spec.md §4.4.2).
//!
//! Scans the *entire* output string — never just a prefix. Truncating this
//! scan is explicitly called out in the spec as a known defect class, so
//! there is no early-exit length cap here.

/// Returns the first forbidden token found anywhere in `output`, if any.
pub fn find_forbidden_token<'a>(output: &str, forbidden_tokens: &'a [String]) -> Option<&'a str> {
    forbidden_tokens
        .iter()
        .find(|token| !token.is_empty() && output.contains(token.as_str()))
        .map(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_forbidden_token_anywhere_in_output() {
        let long_prefix = "x".repeat(10_000);
        let output = format!("{long_prefix}```python\nprint(1)\n```");
        let forbidden = vec!["```".to_string()];
        assert_eq!(find_forbidden_token(&output, &forbidden), Some("```"));
    }

    #[test]
    fn clean_output_finds_nothing() {
        let forbidden = vec!["```".to_string(), "TODO".to_string()];
        assert_eq!(find_forbidden_token("just a normal sentence.", &forbidden), None);
    }

    #[test]
    fn empty_forbidden_list_never_matches() {
        assert_eq!(find_forbidden_token("anything at all", &[]), None);
    }
}

//! Lenient JSON extraction for LLM-generate output (spec.md §4.4.2).
//!
//! Adapted from the teacher's `executor::parser::ResponseParser::extract_json`,
//! but scanning for a genuinely *balanced* `{...}` block rather than a naive
//! first-`{`/last-`}` span, since the spec calls out this exact distinction.

/// Strip surrounding Markdown code fences, then extract the first balanced
/// `{...}` block from whatever prose remains around it.
pub fn extract_structured_object(text: &str) -> Option<&str> {
    let fenced = strip_code_fence(text);
    find_balanced_object(fenced)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    for fence in ["```json", "```JSON", "```"] {
        if let Some(rest) = trimmed.strip_prefix(fence) {
            let rest = rest.trim_start();
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
    }

    // Fences may be embedded in surrounding prose rather than wrapping the
    // whole response.
    if let Some(start) = trimmed.find("```json").or_else(|| trimmed.find("```JSON")) {
        let after_open = &trimmed[start..];
        let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_open[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    trimmed
}

/// Scan `text` for the first `{` and return the substring up to its
/// matching `}`, respecting nested braces and braces inside string
/// literals, rather than trusting the *last* `}` in the text.
fn find_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..=i]);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

//! Splitting selector and value lists.
//!
//! Separators inside quotes, parentheses or after a backslash do not split.

/// Split `s` on any of `separators`, trimming each part.
///
/// Empty parts are dropped, except a trailing one when `last` is set.
pub fn split(s: &str, separators: &[char], last: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escape = false;

    for c in s.chars() {
        let mut split = false;
        if escape {
            escape = false;
        } else if c == '\\' {
            escape = true;
        } else if let Some(q) = quote {
            if c == q {
                quote = None;
            }
        } else if c == '"' || c == '\'' {
            quote = Some(c);
        } else if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && separators.contains(&c) {
            split = true;
        }

        if split {
            if !current.is_empty() {
                parts.push(current.trim().to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }

    if last || !current.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Split a value on whitespace: `1px solid rgb(0, 0, 0)` → `1px`, `solid`, `rgb(0, 0, 0)`.
pub fn space(s: &str) -> Vec<String> {
    split(s, &[' ', '\n', '\t'], false)
}

/// Split a selector or value on commas: `a, b:is(c, d)` → `a`, `b:is(c, d)`.
pub fn comma(s: &str) -> Vec<String> {
    split(s, &[','], true)
}

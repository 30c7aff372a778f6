//! Positioned stylesheet errors.

use std::fmt;

/// Where an error sits in the input this crate parsed, before any previous map is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInput {
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
}

/// A syntax error with a line/column position and the surrounding source.
///
/// When the input carried a previous source map, `file`, `line` and `column` point into the
/// original source and [`CssSyntaxError::input`] keeps the position in the parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSyntaxError {
    pub reason: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
    /// Text of the stylesheet the position refers to.
    pub css: Option<String>,
    /// Name of the transformation unit that raised the error.
    pub plugin: Option<String>,
    pub input: Option<ErrorInput>,
}

impl CssSyntaxError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            file: None,
            line: None,
            column: None,
            end_line: None,
            end_column: None,
            css: None,
            plugin: None,
            input: None,
        }
    }

    /// Render the lines around the error with a marker under the column.
    ///
    /// ```text
    ///   1 | a {
    /// > 2 |   content: "
    ///     |            ^
    ///   3 | }
    /// ```
    pub fn show_source_code(&self) -> String {
        let (Some(css), Some(line)) = (self.css.as_deref(), self.line) else {
            return String::new();
        };
        let column = self.column.unwrap_or(1) as usize;
        let line = line as usize;

        let lines: Vec<&str> = css
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();
        let start = line.saturating_sub(3);
        let end = (line + 2).min(lines.len());
        let width = end.to_string().len();

        let mut out = Vec::with_capacity(end.saturating_sub(start) + 1);
        for (i, text) in lines[start.min(end)..end].iter().enumerate() {
            let number = start + 1 + i;
            let gutter = format!(" {number:>width$} | ");
            if number == line {
                out.push(format!(">{gutter}{text}"));
                let spacing: String = text
                    .chars()
                    .take(column.saturating_sub(1))
                    .map(|c| if c == '\t' { '\t' } else { ' ' })
                    .collect();
                let blank_gutter: String = gutter
                    .chars()
                    .map(|c| if c.is_ascii_digit() { ' ' } else { c })
                    .collect();
                out.push(format!(" {blank_gutter}{spacing}^"));
            } else {
                out.push(format!(" {gutter}{text}"));
            }
        }
        out.join("\n")
    }
}

impl fmt::Display for CssSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(plugin) = &self.plugin {
            write!(f, "{plugin}: ")?;
        }
        f.write_str(self.file.as_deref().unwrap_or("<css input>"))?;
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, ":{line}:{column}")?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl std::error::Error for CssSyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn positioned() -> CssSyntaxError {
        CssSyntaxError {
            line: Some(2),
            column: Some(12),
            css: Some("a {\n  content: \"\n}".to_string()),
            ..CssSyntaxError::new("Unclosed string")
        }
    }

    #[test]
    fn message_uses_placeholder_without_file() {
        assert_eq!(
            positioned().to_string(),
            "<css input>:2:12: Unclosed string"
        );
    }

    #[test]
    fn message_is_prefixed_by_plugin() {
        let err = CssSyntaxError {
            plugin: Some("fixer".into()),
            file: Some("/a.css".into()),
            ..positioned()
        };
        assert_eq!(err.to_string(), "fixer: /a.css:2:12: Unclosed string");
    }

    #[test]
    fn source_excerpt_marks_column() {
        let code = positioned().show_source_code();
        let lines: Vec<&str> = code.lines().collect();
        assert_eq!(lines[0], "  1 | a {");
        assert_eq!(lines[1], "> 2 |   content: \"");
        assert_eq!(lines[2], "    |            ^");
        assert_eq!(lines[3], "  3 | }");
    }
}

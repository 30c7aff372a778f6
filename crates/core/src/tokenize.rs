//! Stylesheet tokenizer.
//!
//! Splits text into a flat sequence of [`Token`]s with no gaps: spaces, comments and
//! punctuation are tokens too, so concatenating the text of every token reproduces the input.
//!
//! - Offsets are byte offsets into the input; `end` is exclusive.
//! - Parenthesized groups without quotes, slashes, escapes or newlines become a single
//!   [`TokenKind::Brackets`] token; anything else yields a lone [`TokenKind::OpenParen`].
//! - Unquoted `url(...)` contents are consumed verbatim up to the closing `)`.
//! - Unclosed strings, comments and `url(` groups are errors, unless errors are ignored for
//!   the whole tokenizer or for a single [`Tokenizer::next_token`] call.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Space,
    Word,
    String,
    AtWord,
    Brackets,
    Comment,
    OpenParen,
    CloseParen,
    OpenSquare,
    CloseSquare,
    OpenCurly,
    CloseCurly,
    Semicolon,
    Colon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, css: &'a str) -> &'a str {
        &css[self.start..self.end]
    }

    /// Byte offset of the token's last character.
    pub fn last(&self, css: &str) -> usize {
        css[self.start..self.end]
            .char_indices()
            .next_back()
            .map(|(i, _)| self.start + i)
            .unwrap_or(self.start)
    }

    /// The decoded value of string and numeric word tokens.
    pub fn decoded(&self, css: &str) -> Option<Decoded> {
        let text = self.text(css);
        match self.kind {
            TokenKind::String => Some(Decoded::String(unquote(text))),
            TokenKind::Word => parse_number(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// String contents without quotes, with escapes resolved.
    String(String),
    Number { value: f64, unit: String },
}

/// An unterminated string, comment or bracket at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unclosed {what}")]
pub struct Unclosed {
    pub what: &'static str,
    pub offset: usize,
}

/// A pull tokenizer with a push-back stack for the parser's lookahead.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    css: &'a str,
    ignore_errors: bool,
    pos: usize,
    /// Word tokens seen so far; each `(` pops one to spot `url(`.
    words: Vec<(usize, usize)>,
    returned: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(css: &'a str, ignore_errors: bool) -> Self {
        Self {
            css,
            ignore_errors,
            pos: 0,
            words: Vec::new(),
            returned: Vec::new(),
        }
    }

    /// Byte offset of the next untokenized character.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn end_of_file(&self) -> bool {
        self.returned.is_empty() && self.pos >= self.css.len()
    }

    /// Push a token back; it is returned by the next call to [`Self::next_token`].
    pub fn back(&mut self, token: Token) {
        self.returned.push(token);
    }

    pub fn next_token(&mut self, ignore_unclosed: bool) -> Result<Option<Token>, Unclosed> {
        if let Some(token) = self.returned.pop() {
            return Ok(Some(token));
        }
        let bytes = self.css.as_bytes();
        let len = bytes.len();
        let pos = self.pos;
        if pos >= len {
            return Ok(None);
        }
        let tolerant = self.ignore_errors || ignore_unclosed;

        let (kind, end) = match bytes[pos] {
            b' ' | b'\n' | b'\t' | b'\r' | b'\x0c' => {
                let mut next = pos + 1;
                while next < len && is_space(bytes[next]) {
                    next += 1;
                }
                (TokenKind::Space, next)
            }
            b'[' => (TokenKind::OpenSquare, pos + 1),
            b']' => (TokenKind::CloseSquare, pos + 1),
            b'{' => (TokenKind::OpenCurly, pos + 1),
            b'}' => (TokenKind::CloseCurly, pos + 1),
            b':' => (TokenKind::Colon, pos + 1),
            b';' => (TokenKind::Semicolon, pos + 1),
            b')' => (TokenKind::CloseParen, pos + 1),
            b'(' => self.paren(pos, tolerant)?,
            quote @ (b'\'' | b'"') => {
                let mut next = pos;
                let end = loop {
                    match find_byte(bytes, quote, next + 1) {
                        Some(found) => {
                            next = found;
                            if !is_escaped(bytes, found) {
                                break char_end(self.css, found);
                            }
                        }
                        None if tolerant => break len,
                        None => {
                            return Err(Unclosed {
                                what: "string",
                                offset: pos,
                            });
                        }
                    }
                };
                (TokenKind::String, end)
            }
            b'@' => {
                let end = (pos + 1..len)
                    .find(|&i| is_at_end(bytes[i]))
                    .unwrap_or(len);
                (TokenKind::AtWord, end)
            }
            b'\\' => {
                let mut next = pos;
                let mut escape = true;
                while next + 1 < len && bytes[next + 1] == b'\\' {
                    next += 1;
                    escape = !escape;
                }
                let mut end = next + 1;
                if escape && end < len && !matches!(bytes[end], b'/' | b' ' | b'\n' | b'\t' | b'\r' | b'\x0c') {
                    if bytes[end].is_ascii_hexdigit() {
                        while end < len && bytes[end].is_ascii_hexdigit() {
                            end += 1;
                        }
                        if end < len && bytes[end] == b' ' {
                            end += 1;
                        }
                    } else {
                        end = char_end(self.css, end);
                    }
                }
                (TokenKind::Word, end)
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => match self.css[pos + 2..].find("*/") {
                Some(found) => (TokenKind::Comment, pos + 2 + found + 2),
                None if tolerant => (TokenKind::Comment, len),
                None => {
                    return Err(Unclosed {
                        what: "comment",
                        offset: pos,
                    });
                }
            },
            _ => {
                let end = (pos + 1..len)
                    .find(|&i| is_word_end(bytes, i))
                    .unwrap_or(len);
                self.words.push((pos, end));
                (TokenKind::Word, end)
            }
        };

        self.pos = end;
        Ok(Some(Token {
            kind,
            start: pos,
            end,
        }))
    }

    fn paren(&mut self, pos: usize, tolerant: bool) -> Result<(TokenKind, usize), Unclosed> {
        let bytes = self.css.as_bytes();
        let prev = self
            .words
            .pop()
            .map(|(s, e)| &self.css[s..e])
            .unwrap_or("");
        let n = bytes.get(pos + 1).copied();

        if prev == "url" && !matches!(n, Some(b'\'' | b'"' | b' ' | b'\n' | b'\t' | b'\x0c' | b'\r')) {
            let mut next = pos;
            loop {
                match find_byte(bytes, b')', next + 1) {
                    Some(found) => {
                        next = found;
                        if !is_escaped(bytes, found) {
                            break;
                        }
                    }
                    None if tolerant => return Ok((TokenKind::OpenParen, pos + 1)),
                    None => {
                        return Err(Unclosed {
                            what: "bracket",
                            offset: pos,
                        });
                    }
                }
            }
            return Ok((TokenKind::Brackets, next + 1));
        }

        match find_byte(bytes, b')', pos + 1) {
            Some(close) if !has_bad_bracket(&bytes[pos + 1..=close]) => {
                Ok((TokenKind::Brackets, close + 1))
            }
            _ => Ok((TokenKind::OpenParen, pos + 1)),
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, Unclosed>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token(false).transpose()
    }
}

/// Tokenize all of `css`.
pub fn tokenize(css: &str, ignore_errors: bool) -> Result<Vec<Token>, Unclosed> {
    Tokenizer::new(css, ignore_errors).collect()
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\t' | b'\r' | b'\x0c')
}

fn is_at_end(b: u8) -> bool {
    matches!(
        b,
        b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' | b'"' | b'#' | b'\'' | b'(' | b')' | b'/' | b';'
            | b'[' | b'\\' | b']' | b'{' | b'}'
    )
}

fn is_word_end(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' | b'!' | b'"' | b'#' | b'\'' | b'(' | b')' | b':'
        | b';' | b'@' | b'[' | b'\\' | b']' | b'{' | b'}' => true,
        b'/' => bytes.get(i + 1) == Some(&b'*'),
        _ => false,
    }
}

fn has_bad_bracket(content: &[u8]) -> bool {
    content
        .iter()
        .any(|b| matches!(b, b'\r' | b'\n' | b'"' | b'\'' | b'(' | b'/' | b'\\'))
}

fn find_byte(bytes: &[u8], needle: u8, from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|i| from + i)
}

/// Whether the byte at `at` is preceded by an odd number of backslashes.
fn is_escaped(bytes: &[u8], at: usize) -> bool {
    bytes[..at].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

/// Exclusive end of the character starting at `at`.
fn char_end(css: &str, at: usize) -> usize {
    css[at..]
        .chars()
        .next()
        .map(|c| at + c.len_utf8())
        .unwrap_or(css.len())
}

fn unquote(text: &str) -> String {
    let quote = text.chars().next();
    let inner = match quote {
        Some(q @ ('"' | '\'')) => {
            let rest = &text[1..];
            rest.strip_suffix(q).unwrap_or(rest)
        }
        _ => text,
    };
    unescape(inner)
}

/// Resolve CSS escapes: `\` + up to six hex digits (and one optional space), an escaped
/// newline (removed), or any other escaped character.
pub(crate) fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            None => out.push('\\'),
            Some('\n') => {
                chars.next();
            }
            Some(h) if h.is_ascii_hexdigit() => {
                let mut hex = String::new();
                while hex.len() < 6 {
                    match chars.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            hex.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                if matches!(chars.peek(), Some(' ' | '\t' | '\n')) {
                    chars.next();
                }
                let code = u32::from_str_radix(&hex, 16).unwrap_or(0xfffd);
                out.push(char::from_u32(code).filter(|&c| c != '\0').unwrap_or('\u{fffd}'));
            }
            Some(other) => {
                out.push(other);
                chars.next();
            }
        }
    }
    out
}

fn parse_number(text: &str) -> Option<Decoded> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > frac_start {
            digits += j - frac_start;
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    let value: f64 = text[..i].parse().ok()?;
    let unit = &text[i..];
    let valid_unit = unit == "%"
        || unit
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    valid_unit.then(|| Decoded::Number {
        value,
        unit: unit.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(css: &str) -> Vec<(TokenKind, &str)> {
        tokenize(css, false)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text(css)))
            .collect()
    }

    fn kinds_tolerant(css: &str) -> Vec<(TokenKind, &str)> {
        tokenize(css, true)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text(css)))
            .collect()
    }

    #[test]
    fn covers_input_without_gaps() {
        let css = "a { color: red; /* c */ }\n@media (x) { b{} }";
        let tokens = tokenize(css, false).unwrap();
        let joined: String = tokens.iter().map(|t| t.text(css)).collect();
        assert_eq!(joined, css);
        for pair in tokens.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn splits_punctuation_and_words() {
        use TokenKind::*;
        assert_eq!(
            kinds("a{b:c;}"),
            vec![
                (Word, "a"),
                (OpenCurly, "{"),
                (Word, "b"),
                (Colon, ":"),
                (Word, "c"),
                (Semicolon, ";"),
                (CloseCurly, "}"),
            ]
        );
    }

    #[test]
    fn brackets_group_simple_parens() {
        use TokenKind::*;
        assert_eq!(
            kinds("calc(1px+2px)"),
            vec![(Word, "calc"), (Brackets, "(1px+2px)")]
        );
        assert_eq!(
            kinds("f(\"a\")"),
            vec![
                (Word, "f"),
                (OpenParen, "("),
                (String, "\"a\""),
                (CloseParen, ")")
            ]
        );
    }

    #[test]
    fn url_contents_are_verbatim() {
        use TokenKind::*;
        assert_eq!(
            kinds("url(a/b;c{d}.png)"),
            vec![(Word, "url"), (Brackets, "(a/b;c{d}.png)")]
        );
        assert_eq!(
            kinds(r"url(a\)b)"),
            vec![(Word, "url"), (Brackets, r"(a\)b)")]
        );
    }

    #[test]
    fn at_word_stops_at_delimiters() {
        use TokenKind::*;
        assert_eq!(
            kinds("@media{"),
            vec![(AtWord, "@media"), (OpenCurly, "{")]
        );
        assert_eq!(
            kinds("@import\"x\""),
            vec![(AtWord, "@import"), (String, "\"x\"")]
        );
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        use TokenKind::*;
        assert_eq!(kinds(r#""a\"b""#), vec![(String, r#""a\"b""#)]);
    }

    #[test]
    fn word_ends_before_comment() {
        use TokenKind::*;
        assert_eq!(
            kinds("a/*x*/b/c"),
            vec![(Word, "a"), (Comment, "/*x*/"), (Word, "b/c")]
        );
    }

    #[test]
    fn backslash_escapes_form_words() {
        use TokenKind::*;
        assert_eq!(kinds(r"\31 0"), vec![(Word, r"\31 "), (Word, "0")]);
        assert_eq!(kinds(r"\é"), vec![(Word, r"\é")]);
    }

    #[test]
    fn unclosed_constructs_report_offsets() {
        assert_eq!(
            tokenize("a \"b", false),
            Err(Unclosed {
                what: "string",
                offset: 2
            })
        );
        assert_eq!(
            tokenize("/* x", false),
            Err(Unclosed {
                what: "comment",
                offset: 0
            })
        );
        assert_eq!(
            tokenize("url(x", false),
            Err(Unclosed {
                what: "bracket",
                offset: 3
            })
        );
    }

    #[test]
    fn tolerant_mode_closes_at_end() {
        let css = "/* x";
        let tokens = tokenize(css, true).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text(css), "/* x");

        let css = "a \"bc";
        let strings: Vec<&str> = tokenize(css, true)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TokenKind::String)
            .map(|t| t.text(css))
            .collect();
        assert_eq!(strings, ["\"bc"]);
        assert_eq!(kinds_tolerant(css).last(), Some(&(TokenKind::String, "\"bc")));
    }

    #[test]
    fn back_returns_token_again() {
        let mut tokenizer = Tokenizer::new("a b", false);
        let first = tokenizer.next_token(false).unwrap().unwrap();
        tokenizer.back(first);
        assert!(!tokenizer.end_of_file());
        assert_eq!(tokenizer.next_token(false).unwrap(), Some(first));
        assert_eq!(tokenizer.position(), 1);
    }

    #[test]
    fn decodes_strings_and_numbers() {
        let css = r#""a\"b\41" -1.5em 10% 1e3 red"#;
        let tokens: Vec<Token> = tokenize(css, false)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind != TokenKind::Space)
            .collect();
        assert_eq!(
            tokens[0].decoded(css),
            Some(Decoded::String("a\"bA".into()))
        );
        assert_eq!(
            tokens[1].decoded(css),
            Some(Decoded::Number {
                value: -1.5,
                unit: "em".into()
            })
        );
        assert_eq!(
            tokens[2].decoded(css),
            Some(Decoded::Number {
                value: 10.0,
                unit: "%".into()
            })
        );
        assert_eq!(
            tokens[3].decoded(css),
            Some(Decoded::Number {
                value: 1000.0,
                unit: String::new()
            })
        );
        assert_eq!(tokens[4].decoded(css), None);
    }
}

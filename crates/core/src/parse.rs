//! Stylesheet parser.
//!
//! A single pass over the token stream that classifies token runs into rules, at-rules,
//! declarations and comments. Everything that is pure formatting is stored in the node's
//! [`Raws`](crate::Raws) so the tree stringifies back to the exact input.

use std::sync::Arc;

use crate::{
    Error,
    input::{Input, Position, Source},
    node::{NodeData, NodeId, RawValue, Root},
    tokenize::{Token, TokenKind, Tokenizer},
};

/// Parse the text of `input` into a tree whose nodes reference `input`.
pub(crate) fn parse_input(input: &Arc<Input>) -> Result<Root, Error> {
    Parser::new(input).parse()
}

struct Parser<'a> {
    input: Arc<Input>,
    css: &'a str,
    tokenizer: Tokenizer<'a>,
    root: Root,
    current: NodeId,
    spaces: String,
    semicolon: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a Arc<Input>) -> Self {
        let css = input.css();
        let mut root = Root::new();
        let id = root.id();
        root.arena[id].source = Some(Source {
            input: input.clone(),
            start: Some(Position {
                offset: 0,
                line: 1,
                column: 1,
            }),
            end: None,
        });
        Self {
            input: input.clone(),
            css,
            tokenizer: Tokenizer::new(css, false),
            current: id,
            root,
            spaces: String::new(),
            semicolon: false,
        }
    }

    fn parse(mut self) -> Result<Root, Error> {
        while !self.tokenizer.end_of_file() {
            let Some(token) = self.next_token()? else {
                break;
            };
            match token.kind {
                TokenKind::Space => self.spaces.push_str(self.text(token)),
                TokenKind::Semicolon => self.free_semicolon(token),
                TokenKind::CloseCurly => self.end(token)?,
                TokenKind::Comment => self.comment(token),
                TokenKind::AtWord => self.at_rule(token)?,
                TokenKind::OpenCurly => self.empty_rule(token),
                _ => self.other(token)?,
            }
        }
        self.end_file()?;
        Ok(self.root)
    }

    fn text(&self, token: Token) -> &'a str {
        token.text(self.css)
    }

    fn joined(&self, tokens: &[Token]) -> String {
        tokens.iter().map(|&t| self.text(t)).collect()
    }

    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        let next = self.tokenizer.next_token(false);
        next.map_err(|unclosed| {
            Error::Syntax(self.input.error_at(unclosed.to_string(), unclosed.offset, None))
        })
    }

    fn error(&self, reason: &str, start: usize, end: usize) -> Error {
        Error::Syntax(self.input.error_at(reason, start, Some(end)))
    }

    /// Start position of a node at byte `offset`.
    fn position(&self, offset: usize) -> Position {
        self.input.position(offset)
    }

    /// End position of a node whose last character starts at `last`.
    fn end_position(&self, last: usize) -> Position {
        let mut position = self.input.position(last);
        position.offset = last + self.css[last..].chars().next().map_or(1, char::len_utf8);
        position
    }

    fn set_end(&mut self, id: NodeId, end: Position) {
        if let Some(source) = self.root.arena[id].source.as_mut() {
            source.end = Some(end);
        }
    }

    /// Attach a new node to the current container.
    fn init(&mut self, data: NodeData, offset: usize) -> NodeId {
        let is_comment = matches!(data, NodeData::Comment { .. });
        let start = self.position(offset);
        let id = self.root.alloc(data);
        let current = self.current;

        let node = &mut self.root.arena[id];
        node.parent = Some(current);
        node.raws.before = Some(std::mem::take(&mut self.spaces));
        node.source = Some(Source {
            input: self.input.clone(),
            start: Some(start),
            end: None,
        });
        if let Some(list) = self.root.arena[current].nodes.as_mut() {
            list.push(id);
        }

        if !is_comment {
            self.semicolon = false;
        }
        id
    }

    fn comment(&mut self, token: Token) {
        let id = self.init(
            NodeData::Comment {
                text: String::new(),
            },
            token.start,
        );
        let end = self.end_position(token.last(self.css));
        self.set_end(id, end);

        let full = self.text(token);
        let inner = full
            .strip_prefix("/*")
            .and_then(|s| s.strip_suffix("*/"))
            .unwrap_or(&full[full.len().min(2)..]);

        let node = &mut self.root.arena[id];
        if inner.trim().is_empty() {
            node.raws.left = Some(inner.to_string());
            node.raws.right = Some(String::new());
        } else {
            let trimmed_start = inner.trim_start();
            let text = trimmed_start.trim_end();
            node.raws.left = Some(inner[..inner.len() - trimmed_start.len()].to_string());
            node.raws.right = Some(trimmed_start[text.len()..].to_string());
            node.data = NodeData::Comment {
                text: text.to_string(),
            };
        }
    }

    fn empty_rule(&mut self, token: Token) {
        let id = self.init(
            NodeData::Rule {
                selector: String::new(),
            },
            token.start,
        );
        self.root.arena[id].raws.between = Some(String::new());
        self.current = id;
    }

    fn other(&mut self, start: Token) -> Result<(), Error> {
        let mut end = false;
        let mut colon = false;
        let mut bracket: Option<Token> = None;
        let mut brackets: Vec<TokenKind> = Vec::new();
        let custom_property = self.text(start).starts_with("--");

        let mut tokens = Vec::new();
        let mut next = Some(start);
        while let Some(token) = next {
            let kind = token.kind;
            tokens.push(token);

            if kind == TokenKind::OpenParen || kind == TokenKind::OpenSquare {
                bracket.get_or_insert(token);
                brackets.push(if kind == TokenKind::OpenParen {
                    TokenKind::CloseParen
                } else {
                    TokenKind::CloseSquare
                });
            } else if custom_property && colon && kind == TokenKind::OpenCurly {
                bracket.get_or_insert(token);
                brackets.push(TokenKind::CloseCurly);
            } else if brackets.is_empty() {
                match kind {
                    TokenKind::Semicolon if colon => return self.decl(tokens, custom_property),
                    TokenKind::Semicolon => break,
                    TokenKind::OpenCurly => {
                        self.rule(tokens);
                        return Ok(());
                    }
                    TokenKind::CloseCurly => {
                        tokens.pop();
                        self.tokenizer.back(token);
                        end = true;
                        break;
                    }
                    TokenKind::Colon => colon = true,
                    _ => {}
                }
            } else if brackets.last() == Some(&kind) {
                brackets.pop();
                if brackets.is_empty() {
                    bracket = None;
                }
            }

            next = self.next_token()?;
        }

        if self.tokenizer.end_of_file() {
            end = true;
        }
        if !brackets.is_empty() {
            if let Some(bracket) = bracket {
                return Err(self.error("Unclosed bracket", bracket.start, bracket.start + 1));
            }
        }

        if end && colon {
            if !custom_property {
                while let Some(&last) = tokens.last() {
                    if last.kind != TokenKind::Space && last.kind != TokenKind::Comment {
                        break;
                    }
                    tokens.pop();
                    self.tokenizer.back(last);
                }
            }
            self.decl(tokens, custom_property)
        } else {
            Err(self.unknown_word(&tokens))
        }
    }

    fn rule(&mut self, mut tokens: Vec<Token>) {
        tokens.pop();
        let id = self.init(
            NodeData::Rule {
                selector: String::new(),
            },
            tokens[0].start,
        );
        let between = self.spaces_and_comments_from_end(&mut tokens);
        let (selector, raw) = self.raw(&tokens, false);

        let node = &mut self.root.arena[id];
        node.raws.between = Some(between);
        node.raws.selector = raw;
        node.data = NodeData::Rule { selector };
        self.current = id;
    }

    fn decl(&mut self, mut tokens: Vec<Token>, custom_property: bool) -> Result<(), Error> {
        let id = self.init(
            NodeData::Decl {
                prop: String::new(),
                value: String::new(),
                important: false,
            },
            tokens[0].start,
        );

        let Some(&last) = tokens.last() else {
            return Ok(());
        };
        if last.kind == TokenKind::Semicolon {
            self.semicolon = true;
            tokens.pop();
        }
        let end_at = if last.kind != TokenKind::Space {
            Some(last.last(self.css))
        } else {
            tokens
                .iter()
                .rev()
                .find(|t| t.kind != TokenKind::Space)
                .map(|t| t.last(self.css))
        };
        if let Some(end_at) = end_at {
            let end = self.end_position(end_at);
            self.set_end(id, end);
        }

        let mut before = self.root.arena[id].raws.before.take().unwrap_or_default();
        while tokens.first().is_some_and(|t| t.kind != TokenKind::Word) {
            if tokens.len() == 1 {
                return Err(self.unknown_word(&tokens));
            }
            before.push_str(self.text(tokens.remove(0)));
        }
        if let Some(first) = tokens.first() {
            let start = self.position(first.start);
            if let Some(source) = self.root.arena[id].source.as_mut() {
                source.start = Some(start);
            }
        }

        let prop_token = tokens.first().copied();
        let mut prop = String::new();
        while let Some(&token) = tokens.first() {
            if matches!(
                token.kind,
                TokenKind::Colon | TokenKind::Space | TokenKind::Comment
            ) {
                break;
            }
            prop.push_str(self.text(token));
            tokens.remove(0);
        }

        let mut between = String::new();
        while !tokens.is_empty() {
            let token = tokens.remove(0);
            if token.kind == TokenKind::Colon {
                between.push_str(self.text(token));
                break;
            }
            let text = self.text(token);
            if token.kind == TokenKind::Word
                && text.bytes().any(|b| b.is_ascii_alphanumeric() || b == b'_')
            {
                return Err(self.unknown_word(&[token]));
            }
            between.push_str(text);
        }

        if prop.starts_with('_') || prop.starts_with('*') {
            before.push_str(&prop[..1]);
            prop.remove(0);
        }

        let mut first_spaces = Vec::new();
        while tokens
            .first()
            .is_some_and(|t| matches!(t.kind, TokenKind::Space | TokenKind::Comment))
        {
            first_spaces.push(tokens.remove(0));
        }
        if tokens.is_empty() && !custom_property {
            if let Some(token) = prop_token {
                return Err(self.error("Declaration without value", token.start, token.end));
            }
        }

        let mut important = false;
        let mut important_raw = None;
        for i in (0..tokens.len()).rev() {
            let token = tokens[i];
            let lower = self.text(token).to_lowercase();
            if lower == "!important" {
                important = true;
                let tail = self.joined(&tokens[i..]);
                tokens.truncate(i);
                let string = self.spaces_from_end(&mut tokens) + &tail;
                if string != " !important" {
                    important_raw = Some(string);
                }
                break;
            } else if lower == "important" {
                let mut cache = tokens.clone();
                let mut string = String::new();
                for j in (1..=i).rev() {
                    let kind = cache[j].kind;
                    if string.trim().starts_with('!') && kind != TokenKind::Space {
                        break;
                    }
                    if let Some(popped) = cache.pop() {
                        string = format!("{}{string}", self.text(popped));
                    }
                }
                if string.trim().starts_with('!') {
                    important = true;
                    important_raw = Some(string);
                    tokens = cache;
                }
            }
            if token.kind != TokenKind::Space && token.kind != TokenKind::Comment {
                break;
            }
        }

        let has_word = tokens
            .iter()
            .any(|t| t.kind != TokenKind::Space && t.kind != TokenKind::Comment);
        if has_word {
            between.push_str(&self.joined(&first_spaces));
            first_spaces.clear();
        }
        first_spaces.extend(tokens.iter().copied());
        let (value, raw) = self.raw(&first_spaces, custom_property);

        let check = value.contains(':') && !custom_property;
        let node = &mut self.root.arena[id];
        node.raws.before = Some(before);
        node.raws.between = Some(between);
        node.raws.important = important_raw;
        node.raws.value = raw;
        node.data = NodeData::Decl {
            prop,
            value,
            important,
        };

        if check {
            self.check_missed_semicolon(&tokens)?;
        }
        Ok(())
    }

    fn at_rule(&mut self, token: Token) -> Result<(), Error> {
        let name = &self.text(token)[1..];
        if name.is_empty() {
            return Err(self.error("At-rule without name", token.start, token.end));
        }
        let id = self.init(
            NodeData::AtRule {
                name: name.to_string(),
                params: String::new(),
            },
            token.start,
        );

        let mut last = false;
        let mut open = false;
        let mut params: Vec<Token> = Vec::new();
        let mut brackets: Vec<TokenKind> = Vec::new();

        while !self.tokenizer.end_of_file() {
            let Some(token) = self.next_token()? else {
                break;
            };
            let kind = token.kind;

            if kind == TokenKind::OpenParen || kind == TokenKind::OpenSquare {
                brackets.push(if kind == TokenKind::OpenParen {
                    TokenKind::CloseParen
                } else {
                    TokenKind::CloseSquare
                });
            } else if kind == TokenKind::OpenCurly && !brackets.is_empty() {
                brackets.push(TokenKind::CloseCurly);
            } else if brackets.last() == Some(&kind) {
                brackets.pop();
            }

            if brackets.is_empty() {
                match kind {
                    TokenKind::Semicolon => {
                        let end = self.end_position(token.start);
                        self.set_end(id, end);
                        self.semicolon = true;
                        break;
                    }
                    TokenKind::OpenCurly => {
                        open = true;
                        break;
                    }
                    TokenKind::CloseCurly => {
                        if let Some(prev) = params.iter().rev().find(|t| t.kind != TokenKind::Space) {
                            let end = self.end_position(prev.last(self.css));
                            self.set_end(id, end);
                        }
                        self.end(token)?;
                        break;
                    }
                    _ => params.push(token),
                }
            } else {
                params.push(token);
            }

            if self.tokenizer.end_of_file() {
                last = true;
                break;
            }
        }

        let mut between = self.spaces_and_comments_from_end(&mut params);
        let after_name;
        let mut value = String::new();
        let mut raw = None;
        if !params.is_empty() {
            after_name = self.spaces_and_comments_from_start(&mut params);
            (value, raw) = self.raw(&params, false);
            if last {
                if let Some(&token) = params.last() {
                    let end = self.end_position(token.last(self.css));
                    self.set_end(id, end);
                }
                self.spaces = std::mem::take(&mut between);
            }
        } else {
            after_name = String::new();
        }

        let node = &mut self.root.arena[id];
        node.raws.between = Some(between);
        node.raws.after_name = Some(after_name);
        node.raws.params = raw;
        if let NodeData::AtRule { params, .. } = &mut node.data {
            *params = value;
        }
        if open {
            node.nodes = Some(Vec::new());
            self.current = id;
        }
        Ok(())
    }

    fn end(&mut self, token: Token) -> Result<(), Error> {
        let semicolon = std::mem::take(&mut self.semicolon);
        let spaces = std::mem::take(&mut self.spaces);
        let current = self.current;

        let node = &mut self.root.arena[current];
        if !node.children().is_empty() {
            node.raws.semicolon = Some(semicolon);
        }
        node.raws.after.get_or_insert_with(String::new).push_str(&spaces);

        match node.parent {
            Some(parent) => {
                let end = self.end_position(token.start);
                self.set_end(current, end);
                self.current = parent;
                Ok(())
            }
            None => Err(self.error("Unexpected }", token.start, token.start + 1)),
        }
    }

    fn end_file(&mut self) -> Result<(), Error> {
        let current = self.current;
        if self.root.arena[current].parent.is_some() {
            let start = self.root.arena[current]
                .source
                .as_ref()
                .and_then(|s| s.start)
                .map_or((1, 1), |p| (p.line, p.column));
            return Err(Error::Syntax(self.input.error("Unclosed block", start, None)));
        }

        let spaces = std::mem::take(&mut self.spaces);
        let node = &mut self.root.arena[current];
        if !node.children().is_empty() {
            node.raws.semicolon = Some(self.semicolon);
        }
        node.raws.after.get_or_insert_with(String::new).push_str(&spaces);

        let end = self.position(self.tokenizer.position());
        let root = self.root.id();
        self.set_end(root, end);
        Ok(())
    }

    fn free_semicolon(&mut self, token: Token) {
        self.spaces.push_str(self.text(token));
        let Some(&prev) = self.root.arena[self.current].children().last() else {
            return;
        };
        let node = &self.root.arena[prev];
        if !matches!(node.data, NodeData::Rule { .. })
            || node.raws.own_semicolon.as_deref().is_some_and(|s| !s.is_empty())
        {
            return;
        }
        let own = std::mem::take(&mut self.spaces);
        let mut end = self.position(token.start);
        end.offset += own.len();
        let node = &mut self.root.arena[prev];
        node.raws.own_semicolon = Some(own);
        if let Some(source) = node.source.as_mut() {
            source.end = Some(end);
        }
    }

    /// Join `tokens` into a field value, dropping comments that touch spaces.
    ///
    /// Returns the cleaned value and, when it differs from the source text, both versions.
    fn raw(&self, tokens: &[Token], custom_property: bool) -> (String, Option<RawValue>) {
        let safe = |kind: Option<TokenKind>| matches!(kind, None | Some(TokenKind::Space));
        let mut value = String::new();
        let mut clean = true;

        for (i, &token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Space if i == tokens.len() - 1 && !custom_property => clean = false,
                TokenKind::Comment => {
                    let prev = i.checked_sub(1).map(|j| tokens[j].kind);
                    let next = tokens.get(i + 1).map(|t| t.kind);
                    if !safe(prev) && !safe(next) {
                        if value.ends_with(',') {
                            clean = false;
                        } else {
                            value.push_str(self.text(token));
                        }
                    } else {
                        clean = false;
                    }
                }
                _ => value.push_str(self.text(token)),
            }
        }

        let raw = (!clean).then(|| RawValue {
            value: value.clone(),
            raw: self.joined(tokens),
        });
        (value, raw)
    }

    fn check_missed_semicolon(&self, tokens: &[Token]) -> Result<(), Error> {
        let Some(colon) = self.colon(tokens)? else {
            return Ok(());
        };

        let mut founded = 0;
        let mut token = None;
        for &t in tokens[..colon].iter().rev() {
            token = Some(t);
            if t.kind != TokenKind::Space {
                founded += 1;
                if founded == 2 {
                    break;
                }
            }
        }

        let Some(token) = token else {
            return Ok(());
        };
        let offset = if token.kind == TokenKind::Word {
            token.end
        } else {
            token.start
        };
        Err(Error::Syntax(self.input.error_at("Missed semicolon", offset, None)))
    }

    /// Index of the first top-level colon, skipping `progid:` filters.
    fn colon(&self, tokens: &[Token]) -> Result<Option<usize>, Error> {
        let mut brackets = 0i32;
        let mut prev: Option<Token> = None;
        for (i, &token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::OpenParen => brackets += 1,
                TokenKind::CloseParen => brackets -= 1,
                _ => {}
            }
            if brackets == 0 && token.kind == TokenKind::Colon {
                match prev {
                    None => {
                        return Err(self.error("Double colon", token.start, token.end));
                    }
                    Some(p) if p.kind == TokenKind::Word && self.text(p) == "progid" => continue,
                    Some(_) => return Ok(Some(i)),
                }
            }
            prev = Some(token);
        }
        Ok(None)
    }

    fn unknown_word(&self, tokens: &[Token]) -> Error {
        match tokens.first() {
            Some(token) => self.error("Unknown word", token.start, token.end),
            None => Error::Syntax(self.input.error_at("Unknown word", self.tokenizer.position(), None)),
        }
    }

    fn spaces_and_comments_from_end(&self, tokens: &mut Vec<Token>) -> String {
        let split = tokens
            .iter()
            .rposition(|t| !matches!(t.kind, TokenKind::Space | TokenKind::Comment))
            .map_or(0, |i| i + 1);
        let tail = self.joined(&tokens[split..]);
        tokens.truncate(split);
        tail
    }

    fn spaces_and_comments_from_start(&self, tokens: &mut Vec<Token>) -> String {
        let split = tokens
            .iter()
            .position(|t| !matches!(t.kind, TokenKind::Space | TokenKind::Comment))
            .unwrap_or(tokens.len());
        let head = self.joined(&tokens[..split]);
        tokens.drain(..split);
        head
    }

    fn spaces_from_end(&self, tokens: &mut Vec<Token>) -> String {
        let split = tokens
            .iter()
            .rposition(|t| t.kind != TokenKind::Space)
            .map_or(0, |i| i + 1);
        let tail = self.joined(&tokens[split..]);
        tokens.truncate(split);
        tail
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, NodeKind, ParseOptions, Root, parse};

    fn parsed(css: &str) -> Root {
        parse(css, &ParseOptions::default()).unwrap()
    }

    fn syntax_error(css: &str) -> crate::CssSyntaxError {
        match parse(css, &ParseOptions::default()) {
            Err(Error::Syntax(err)) => err,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn captures_declaration_raws() {
        let root = parsed("a {\n  color : red ;\n}");
        let rule = root.get(root.first(root.id()).unwrap()).unwrap();
        assert_eq!(rule.selector(), Some("a"));
        assert_eq!(rule.raws.between.as_deref(), Some(" "));
        assert_eq!(rule.raws.semicolon, Some(true));
        assert_eq!(rule.raws.after.as_deref(), Some("\n"));

        let decl = root.get(rule.children()[0]).unwrap();
        assert_eq!(decl.prop(), Some("color"));
        assert_eq!(decl.value(), Some("red"));
        assert_eq!(decl.raws.before.as_deref(), Some("\n  "));
        assert_eq!(decl.raws.between.as_deref(), Some(" : "));
        assert_eq!(decl.raws.value.as_ref().unwrap().raw, "red ");
    }

    #[test]
    fn source_positions_are_recorded() {
        let root = parsed("a{\n  b: c;\n}");
        let rule = root.first(root.id()).unwrap();
        let decl = root.first(rule).unwrap();
        let source = root.get(decl).unwrap().source.as_ref().unwrap();
        let start = source.start.unwrap();
        let end = source.end.unwrap();
        assert_eq!((start.line, start.column, start.offset), (2, 3, 5));
        assert_eq!((end.line, end.column, end.offset), (2, 7, 10));

        let rule_end = root.get(rule).unwrap().source.as_ref().unwrap().end.unwrap();
        assert_eq!((rule_end.line, rule_end.column), (3, 1));
    }

    #[test]
    fn important_variants() {
        let root = parsed("a{b:c !important;d:e!IMPORTANT;f:g ! important;h:i/**/!important}");
        let rule = root.first(root.id()).unwrap();
        let decls: Vec<_> = root.children(rule).iter().map(|&d| root.get(d).unwrap()).collect();
        assert!(decls.iter().all(|d| d.important()));
        assert_eq!(decls[0].raws.important, None);
        assert_eq!(decls[0].value(), Some("c"));
        assert_eq!(decls[1].raws.important.as_deref(), Some("!IMPORTANT"));
        assert_eq!(decls[2].raws.important.as_deref(), Some(" ! important"));
        assert_eq!(decls[2].value(), Some("g"));
        assert_eq!(decls[3].value(), Some("i"));
        assert_eq!(decls[3].raws.value.as_ref().unwrap().raw, "i/**/");
        assert_eq!(decls[3].raws.important.as_deref(), Some("!important"));
    }

    #[test]
    fn custom_properties_keep_blocks() {
        let root = parsed(":root{--x: { a: b } ;--y:  1px  }");
        let rule = root.first(root.id()).unwrap();
        let x = root.get(root.children(rule)[0]).unwrap();
        assert_eq!(x.prop(), Some("--x"));
        assert_eq!(x.value(), Some("{ a: b } "));
        let y = root.get(root.children(rule)[1]).unwrap();
        assert_eq!(y.value(), Some("1px  "));
    }

    #[test]
    fn property_hacks_move_to_before() {
        let root = parsed("a{*zoom:1;_height:2}");
        let rule = root.first(root.id()).unwrap();
        let zoom = root.get(root.children(rule)[0]).unwrap();
        assert_eq!(zoom.prop(), Some("zoom"));
        assert_eq!(zoom.raws.before.as_deref(), Some("*"));
    }

    #[test]
    fn at_rules_with_and_without_blocks() {
        let root = parsed("@charset \"utf-8\";\n@media  screen and (x:1)  {a{}}\n@page{}");
        let ids = root.children(root.id());
        let charset = root.get(ids[0]).unwrap();
        assert_eq!(charset.name(), Some("charset"));
        assert_eq!(charset.params(), Some("\"utf-8\""));
        assert!(!charset.is_container());

        let media = root.get(ids[1]).unwrap();
        assert_eq!(media.params(), Some("screen and (x:1)"));
        assert_eq!(media.raws.after_name.as_deref(), Some("  "));
        assert_eq!(media.raws.between.as_deref(), Some("  "));
        assert_eq!(media.children().len(), 1);

        let page = root.get(ids[2]).unwrap();
        assert_eq!(page.params(), Some(""));
        assert!(page.is_container());
    }

    #[test]
    fn comments_split_padding() {
        let root = parsed("/*  hello  */ /**/");
        let first = root.get(root.children(root.id())[0]).unwrap();
        assert_eq!(first.kind(), NodeKind::Comment);
        assert_eq!(first.text(), Some("hello"));
        assert_eq!(first.raws.left.as_deref(), Some("  "));
        assert_eq!(first.raws.right.as_deref(), Some("  "));
        let empty = root.get(root.children(root.id())[1]).unwrap();
        assert_eq!(empty.text(), Some(""));
    }

    #[test]
    fn comments_inside_values() {
        let root = parsed("a{b: c /* x */ d;e: f/**/g}");
        let rule = root.first(root.id()).unwrap();
        let b = root.get(root.children(rule)[0]).unwrap();
        assert_eq!(b.value(), Some("c  d"));
        assert_eq!(b.raws.value.as_ref().unwrap().raw, "c /* x */ d");
        let e = root.get(root.children(rule)[1]).unwrap();
        assert_eq!(e.value(), Some("f/**/g"));
        assert!(e.raws.value.is_none());
    }

    #[test]
    fn free_semicolons_stick_to_rules() {
        let root = parsed("a{};b{}");
        let a = root.get(root.first(root.id()).unwrap()).unwrap();
        assert_eq!(a.raws.own_semicolon.as_deref(), Some(";"));
    }

    #[test]
    fn strips_bom() {
        let root = parsed("\u{feff}a{}");
        let rule = root.get(root.first(root.id()).unwrap()).unwrap();
        assert_eq!(rule.raws.before.as_deref(), Some(""));
        assert_eq!(root.to_string(), "a{}");
    }

    #[test]
    fn progid_colon_is_not_a_declaration_colon() {
        let root = parsed("a{filter:progid:DXImageTransform.Microsoft.gradient(x=1)}");
        let rule = root.first(root.id()).unwrap();
        let decl = root.get(root.first(rule).unwrap()).unwrap();
        assert_eq!(decl.prop(), Some("filter"));
        assert_eq!(decl.value(), Some("progid:DXImageTransform.Microsoft.gradient(x=1)"));
    }

    #[test]
    fn unclosed_string_position() {
        let err = syntax_error("a {\n  content: \"\n}");
        assert_eq!(err.reason, "Unclosed string");
        assert_eq!((err.line, err.column), (Some(2), Some(12)));
    }

    #[test]
    fn empty_value_is_an_error() {
        let err = syntax_error("a {\n  color: /* none */;\n}");
        assert_eq!(err.reason, "Declaration without value");
        assert_eq!((err.line, err.column), (Some(2), Some(3)));
        assert_eq!(syntax_error("a{color:}").reason, "Declaration without value");

        let root = parsed(":root{--empty:;}");
        let rule = root.first(root.id()).unwrap();
        assert_eq!(root.get(root.first(rule).unwrap()).unwrap().value(), Some(""));
    }

    #[test]
    fn unclosed_block_points_at_opener() {
        let err = syntax_error("a {\n  b {");
        assert_eq!(err.reason, "Unclosed block");
        assert_eq!((err.line, err.column), (Some(2), Some(3)));
    }

    #[test]
    fn other_syntax_errors() {
        assert_eq!(syntax_error("/* a").reason, "Unclosed comment");
        assert_eq!(syntax_error("a{b:url(x}").reason, "Unclosed bracket");
        assert_eq!(syntax_error("a{b:(c}").reason, "Unclosed bracket");
        assert_eq!(syntax_error("@ {}").reason, "At-rule without name");
        assert_eq!(syntax_error("}").reason, "Unexpected }");
        assert_eq!(syntax_error("a{b}").reason, "Unknown word");
        assert_eq!(syntax_error("a{one:: 1}").reason, "Double colon");
    }

    #[test]
    fn missed_semicolon_is_reported_at_boundary() {
        let err = syntax_error("a{\n  color: red\n  top: 0\n}");
        assert_eq!(err.reason, "Missed semicolon");
        assert_eq!((err.line, err.column), (Some(2), Some(13)));

        let err = syntax_error("a{b:c !important d:e}");
        assert_eq!(err.reason, "Missed semicolon");
    }

    #[test]
    fn word_with_letters_between_prop_and_colon_is_unknown() {
        let err = syntax_error("a{b c: d}");
        assert_eq!(err.reason, "Unknown word");
        assert_eq!(err.column, Some(5));
    }
}

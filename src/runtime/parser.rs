//! RPL tokenization and parsing.
//!
//! Expressions parse into an [`Exp`] tree, pattern source files and load
//! blocks into a list of [`Stmt`]. Name resolution happens later, in the
//! compiler.

use std::fmt;

use super::ir::{CharSet, ClassItem, NamedClass};

/// Byte offsets into the source text, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.span.start + 1)
    }
}

type ParseResult<T> = std::result::Result<T, SyntaxError>;

const KEYWORDS: &[&str] = &["alias", "local", "import", "package", "grammar", "end"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Literal(Vec<u8>),
    Set(CharSet),
    Identifier(String),
    Number(String),
    Dot,
    Caret,
    Dollar,
    Tilde,
    Slash,
    Star,
    Plus,
    Question,
    Bang,
    Greater,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Quantifier(u32, Option<u32>),
    Equals,
    Comma,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Literal(_) => "string literal".to_string(),
            Token::Set(_) => "character set".to_string(),
            Token::Identifier(name) => format!("identifier '{name}'"),
            Token::Number(n) => format!("number {n}"),
            Token::Quantifier(..) => "repetition".to_string(),
            Token::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Dot => ".",
            Token::Caret => "^",
            Token::Dollar => "$",
            Token::Tilde => "~",
            Token::Slash => "/",
            Token::Star => "*",
            Token::Plus => "+",
            Token::Question => "?",
            Token::Bang => "!",
            Token::Greater => ">",
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::Equals => "=",
            Token::Comma => ",",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub span: Span,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn here(&self) -> Span {
        Span::new(self.pos, self.pos + self.peek().map_or(0, char::len_utf8))
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn tokenize(mut self) -> ParseResult<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    span: Span::new(start, start),
                });
                return Ok(tokens);
            };
            let token = match c {
                '"' => self.lex_literal()?,
                '[' => Token::Set(self.lex_set()?),
                '{' => self.lex_brace(),
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_identifier(),
                c if c.is_ascii_digit() => self.lex_number(),
                _ => {
                    self.bump();
                    match c {
                        '.' => Token::Dot,
                        '^' => Token::Caret,
                        '$' => Token::Dollar,
                        '~' => Token::Tilde,
                        '/' => Token::Slash,
                        '*' => Token::Star,
                        '+' => Token::Plus,
                        '?' => Token::Question,
                        '!' => Token::Bang,
                        '>' => Token::Greater,
                        '(' => Token::LeftParen,
                        ')' => Token::RightParen,
                        '}' => Token::RightBrace,
                        '=' => Token::Equals,
                        ',' => Token::Comma,
                        other => {
                            return Err(SyntaxError::new(
                                format!("unexpected character '{other}'"),
                                Span::new(start, self.pos),
                            ))
                        }
                    }
                }
            };
            tokens.push(Spanned {
                token,
                span: Span::new(start, self.pos),
            });
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                    self.bump();
                }
                // Qualified reference: `pkg.name`
                Some('.')
                    if self
                        .peek_at(1)
                        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_') =>
                {
                    self.bump();
                }
                _ => break,
            }
        }
        Token::Identifier(self.src[start..self.pos].to_string())
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.bump();
        }
        Token::Number(self.src[start..self.pos].to_string())
    }

    fn lex_escape(&mut self, start: usize) -> ParseResult<EscapeValue> {
        let Some(c) = self.bump() else {
            return Err(SyntaxError::new(
                "unterminated escape sequence",
                Span::new(start, self.pos),
            ));
        };
        Ok(match c {
            'n' => EscapeValue::Char('\n'),
            't' => EscapeValue::Char('\t'),
            'r' => EscapeValue::Char('\r'),
            'x' => {
                let value = self.lex_hex(2, start)?;
                EscapeValue::Byte(value as u8)
            }
            'u' => {
                let value = self.lex_hex(4, start)?;
                match char::from_u32(value) {
                    Some(ch) => EscapeValue::Char(ch),
                    None => {
                        return Err(SyntaxError::new(
                            format!("invalid code point \\u{value:04X}"),
                            Span::new(start, self.pos),
                        ))
                    }
                }
            }
            other => EscapeValue::Char(other),
        })
    }

    fn lex_hex(&mut self, digits: usize, start: usize) -> ParseResult<u32> {
        let mut value = 0u32;
        for _ in 0..digits {
            match self.bump().and_then(|c| c.to_digit(16)) {
                Some(d) => value = value * 16 + d,
                None => {
                    return Err(SyntaxError::new(
                        format!("expected {digits} hex digits in escape"),
                        Span::new(start, self.pos),
                    ))
                }
            }
        }
        Ok(value)
    }

    fn lex_literal(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        self.bump();
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => {
                    return Err(SyntaxError::new(
                        "unterminated literal",
                        Span::new(start, self.pos),
                    ))
                }
                Some('"') => return Ok(Token::Literal(bytes)),
                Some('\\') => match self.lex_escape(start)? {
                    EscapeValue::Char(c) => {
                        let mut buf = [0u8; 4];
                        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    }
                    EscapeValue::Byte(b) => bytes.push(b),
                },
                Some(c) => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn lex_set(&mut self) -> ParseResult<CharSet> {
        let start = self.pos;
        self.bump();
        let unterminated = |lexer: &Self| {
            SyntaxError::new("unterminated character set", Span::new(start, lexer.pos))
        };

        if self.peek() == Some(':') {
            self.bump();
            let negated = self.peek() == Some('^');
            if negated {
                self.bump();
            }
            let name_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                self.bump();
            }
            let name = &self.src[name_start..self.pos];
            if self.bump() != Some(':') || self.bump() != Some(']') {
                return Err(unterminated(self));
            }
            let class = NamedClass::from_name(name).ok_or_else(|| {
                SyntaxError::new(
                    format!("unknown character class [:{name}:]"),
                    Span::new(start, self.pos),
                )
            })?;
            return Ok(CharSet {
                items: vec![ClassItem::Named(class)],
                negated,
            });
        }

        let negated = self.peek() == Some('^');
        if negated {
            self.bump();
        }

        let mut items = Vec::new();
        if self.peek() == Some('[') {
            loop {
                while self.peek().is_some_and(char::is_whitespace) {
                    self.bump();
                }
                match self.peek() {
                    Some('[') => items.push(ClassItem::Set(self.lex_set()?)),
                    Some(']') => {
                        self.bump();
                        break;
                    }
                    _ => return Err(unterminated(self)),
                }
            }
            return Ok(CharSet { items, negated });
        }

        loop {
            let c = match self.bump() {
                None => return Err(unterminated(self)),
                Some(']') => break,
                Some('\\') => match self.lex_escape(start)? {
                    EscapeValue::Char(c) => c as u32,
                    EscapeValue::Byte(b) => b as u32,
                },
                Some(c) => c as u32,
            };
            if self.peek() == Some('-') && self.peek_at(1).is_some_and(|n| n != ']') {
                self.bump();
                let hi = match self.bump() {
                    Some('\\') => match self.lex_escape(start)? {
                        EscapeValue::Char(c) => c as u32,
                        EscapeValue::Byte(b) => b as u32,
                    },
                    Some(h) => h as u32,
                    None => return Err(unterminated(self)),
                };
                if hi < c {
                    return Err(SyntaxError::new(
                        "character range is reversed",
                        Span::new(start, self.pos),
                    ));
                }
                items.push(ClassItem::Range(c, hi));
            } else {
                items.push(ClassItem::Char(c));
            }
        }
        if items.is_empty() {
            return Err(SyntaxError::new(
                "empty character set",
                Span::new(start, self.pos),
            ));
        }
        Ok(CharSet { items, negated })
    }

    /// `{n,m}` is a repetition; any other `{` opens a raw group.
    fn lex_brace(&mut self) -> Token {
        let rest = &self.src[self.pos + 1..];
        if let Some(close) = rest.find('}') {
            let body: String = rest[..close].chars().filter(|c| !c.is_whitespace()).collect();
            let valid = !body.is_empty()
                && body.chars().all(|c| c.is_ascii_digit() || c == ',')
                && body.matches(',').count() <= 1
                && body != ",";
            if valid {
                let (min, max) = match body.split_once(',') {
                    Some((lo, hi)) => (
                        lo.parse().unwrap_or(0),
                        if hi.is_empty() { None } else { hi.parse().ok() },
                    ),
                    None => {
                        let n = body.parse().unwrap_or(0);
                        (n, Some(n))
                    }
                };
                self.pos += close + 2;
                return Token::Quantifier(min, max);
            }
        }
        self.bump();
        Token::LeftBrace
    }
}

enum EscapeValue {
    Char(char),
    Byte(u8),
}

pub(crate) fn tokenize(src: &str) -> ParseResult<Vec<Spanned>> {
    Lexer::new(src).tokenize()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Literal(Vec<u8>),
    Set(CharSet),
    Any,
    Start,
    End,
    Boundary,
    Ref {
        package: Option<String>,
        name: String,
        span: Span,
    },
    Seq {
        items: Vec<Exp>,
        cooked: bool,
    },
    Choice(Vec<Exp>),
    Repeat {
        exp: Box<Exp>,
        min: u32,
        max: Option<u32>,
        /// Quantified cooked group: `("a")+`
        cooked: bool,
    },
    Not(Box<Exp>),
    Look(Box<Exp>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Version {
        major: u32,
        minor: u32,
        span: Span,
    },
    Package {
        name: String,
        span: Span,
    },
    Import(Vec<ImportSpec>),
    Binding {
        name: String,
        exp: Exp,
        alias: bool,
        local: bool,
        span: Span,
    },
}

/// Recursive descent parser over a token list.
pub(crate) struct Parser<'a> {
    tokens: &'a [Spanned],
    position: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Spanned]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current(&self) -> &Spanned {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn current_token(&self) -> &Token {
        &self.current().token
    }

    fn peek_token(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.position + n).min(last)].token
    }

    fn advance(&mut self) -> Spanned {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn previous_span(&self) -> Span {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(
            format!(
                "expected {expected}, found {}",
                self.current_token().describe()
            ),
            self.current().span,
        )
    }

    fn expect(&mut self, token: Token, expected: &str) -> ParseResult<Spanned> {
        if *self.current_token() == token {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn at_statement_start(&self) -> bool {
        match self.current_token() {
            Token::Identifier(word) => {
                KEYWORDS.contains(&word.as_str()) || *self.peek_token(1) == Token::Equals
            }
            _ => false,
        }
    }

    fn at_sequence_end(&self) -> bool {
        matches!(
            self.current_token(),
            Token::Eof
                | Token::RightParen
                | Token::RightBrace
                | Token::Slash
                | Token::Equals
                | Token::Comma
        ) || self.at_statement_start()
    }

    /// Parse ordered choice (lowest precedence).
    pub(crate) fn parse_choice(&mut self, cooked: bool) -> ParseResult<Exp> {
        let first = self.parse_sequence(cooked)?;
        if *self.current_token() != Token::Slash {
            return Ok(first);
        }
        let mut alternatives = vec![first];
        while *self.current_token() == Token::Slash {
            self.advance();
            alternatives.push(self.parse_sequence(cooked)?);
        }
        Ok(Exp::Choice(alternatives))
    }

    fn parse_sequence(&mut self, cooked: bool) -> ParseResult<Exp> {
        let mut items = Vec::new();
        while !self.at_sequence_end() {
            items.push(self.parse_prefix()?);
        }
        match items.len() {
            0 => Err(self.unexpected("an expression")),
            1 => Ok(items.remove(0)),
            _ => Ok(Exp::Seq { items, cooked }),
        }
    }

    fn parse_prefix(&mut self) -> ParseResult<Exp> {
        match self.current_token() {
            Token::Bang => {
                self.advance();
                Ok(Exp::Not(Box::new(self.parse_prefix()?)))
            }
            Token::Greater => {
                self.advance();
                Ok(Exp::Look(Box::new(self.parse_prefix()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Exp> {
        let (mut exp, cooked_group) = self.parse_atom()?;
        loop {
            let (min, max) = match self.current_token() {
                Token::Star => (0, None),
                Token::Plus => (1, None),
                Token::Question => (0, Some(1)),
                Token::Quantifier(min, max) => {
                    if max.is_some_and(|m| m < *min) {
                        return Err(SyntaxError::new(
                            "repetition maximum is below its minimum",
                            self.current().span,
                        ));
                    }
                    (*min, *max)
                }
                _ => return Ok(exp),
            };
            self.advance();
            exp = Exp::Repeat {
                exp: Box::new(exp),
                min,
                max,
                cooked: cooked_group,
            };
        }
    }

    fn parse_atom(&mut self) -> ParseResult<(Exp, bool)> {
        let spanned = self.current().clone();
        let exp = match spanned.token {
            Token::Literal(bytes) => Exp::Literal(bytes),
            Token::Set(set) => Exp::Set(set),
            Token::Dot => Exp::Any,
            Token::Caret => Exp::Start,
            Token::Dollar => Exp::End,
            Token::Tilde => Exp::Boundary,
            Token::Identifier(ref word) if KEYWORDS.contains(&word.as_str()) => {
                return Err(SyntaxError::new(
                    format!("keyword '{word}' cannot be used in an expression"),
                    spanned.span,
                ))
            }
            Token::Identifier(word) => match word.rsplit_once('.') {
                Some((package, name)) => Exp::Ref {
                    package: Some(package.to_string()),
                    name: name.to_string(),
                    span: spanned.span,
                },
                None => Exp::Ref {
                    package: None,
                    name: word,
                    span: spanned.span,
                },
            },
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_choice(true)?;
                self.expect(Token::RightParen, "')'")?;
                return Ok((inner, true));
            }
            Token::LeftBrace => {
                self.advance();
                let inner = self.parse_choice(false)?;
                self.expect(Token::RightBrace, "'}'")?;
                return Ok((inner, false));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok((exp, false))
    }

    fn parse_identifier(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match self.current_token().clone() {
            Token::Identifier(name) if !KEYWORDS.contains(&name.as_str()) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn parse_import_spec(&mut self) -> ParseResult<ImportSpec> {
        let start = self.current().span;
        let path = match self.current_token().clone() {
            Token::Literal(bytes) => {
                self.advance();
                String::from_utf8(bytes)
                    .map_err(|_| SyntaxError::new("import path is not valid UTF-8", start))?
            }
            Token::Identifier(_) => {
                let (mut path, mut last) = self.parse_identifier("a package path")?;
                // Path segments separated by '/' with no whitespace.
                while *self.current_token() == Token::Slash && self.current().span.start == last.end {
                    self.advance();
                    let (segment, span) = self.parse_identifier("a package path segment")?;
                    path.push('/');
                    path.push_str(&segment);
                    last = span;
                }
                path
            }
            _ => return Err(self.unexpected("a package path")),
        };
        let alias = match self.current_token() {
            Token::Identifier(word) if word == "as" => {
                self.advance();
                Some(self.parse_identifier("an import alias")?.0)
            }
            _ => None,
        };
        Ok(ImportSpec {
            path,
            alias,
            span: start.to(self.previous_span()),
        })
    }

    fn parse_statement(&mut self, first: bool) -> ParseResult<Stmt> {
        let start = self.current().span;
        let Token::Identifier(word) = self.current_token().clone() else {
            return Err(self.unexpected("a binding, import or package declaration"));
        };
        match word.as_str() {
            "rpl" if matches!(self.peek_token(1), Token::Number(_)) => {
                if !first {
                    return Err(SyntaxError::new(
                        "rpl version declaration must come first",
                        start,
                    ));
                }
                self.advance();
                let Token::Number(text) = self.advance().token else {
                    return Err(self.unexpected("a version number"));
                };
                let (major, minor) = text.split_once('.').unwrap_or((text.as_str(), "0"));
                let span = start.to(self.previous_span());
                match (major.parse(), minor.parse()) {
                    (Ok(major), Ok(minor)) => Ok(Stmt::Version { major, minor, span }),
                    _ => Err(SyntaxError::new(
                        format!("invalid rpl version '{text}'"),
                        span,
                    )),
                }
            }
            "package" => {
                self.advance();
                let (name, span) = self.parse_identifier("a package name")?;
                if name.contains('.') {
                    return Err(SyntaxError::new("package name cannot contain '.'", span));
                }
                Ok(Stmt::Package {
                    name,
                    span: start.to(span),
                })
            }
            "import" => {
                self.advance();
                let mut specs = vec![self.parse_import_spec()?];
                while *self.current_token() == Token::Comma {
                    self.advance();
                    specs.push(self.parse_import_spec()?);
                }
                Ok(Stmt::Import(specs))
            }
            "grammar" => Err(SyntaxError::new("grammar blocks are not supported", start)),
            _ => {
                let mut local = false;
                let mut alias = false;
                if word == "local" {
                    local = true;
                    self.advance();
                }
                if matches!(self.current_token(), Token::Identifier(w) if w == "alias") {
                    alias = true;
                    self.advance();
                }
                let (name, name_span) = self.parse_identifier("an identifier")?;
                if name.contains('.') {
                    return Err(SyntaxError::new(
                        "cannot bind a qualified name",
                        name_span,
                    ));
                }
                self.expect(Token::Equals, "'='")?;
                let exp = self.parse_choice(true)?;
                Ok(Stmt::Binding {
                    name,
                    exp,
                    alias,
                    local,
                    span: start.to(self.previous_span()),
                })
            }
        }
    }
}

/// Parse a single top-level expression.
pub fn parse_expression(src: &str) -> ParseResult<Exp> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(&tokens);
    if parser.at_eof() {
        return Err(SyntaxError::new("empty expression", Span::new(0, 0)));
    }
    let exp = parser.parse_choice(true)?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(exp)
}

/// Parse a block of statements (a package file or a `load` source).
pub fn parse_block(src: &str) -> ParseResult<Vec<Stmt>> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(&tokens);
    let mut statements = Vec::new();
    while !parser.at_eof() {
        let first = statements.is_empty();
        statements.push(parser.parse_statement(first)?);
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> Exp {
        match parse_expression(name).unwrap() {
            Exp::Ref { package, name, .. } => Exp::Ref {
                package,
                name,
                span: Span::default(),
            },
            other => other,
        }
    }

    #[test]
    fn test_tokenize_symbols() {
        let tokens = tokenize("!>.^$~/*+?").unwrap();
        let kinds: Vec<Token> = tokens.into_iter().map(|t| t.token).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Bang,
                Token::Greater,
                Token::Dot,
                Token::Caret,
                Token::Dollar,
                Token::Tilde,
                Token::Slash,
                Token::Star,
                Token::Plus,
                Token::Question,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_literal_escapes() {
        let tokens = tokenize(r#""a\"b\n\x41é""#).unwrap();
        assert_eq!(
            tokens[0].token,
            Token::Literal("a\"b\nAé".as_bytes().to_vec())
        );
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("-- a comment\n\"x\" -- trailing").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token, Token::Literal(b"x".to_vec()));
    }

    #[test]
    fn test_character_sets() {
        let Exp::Set(set) = parse_expression("[:digit:]").unwrap() else {
            panic!("expected a set");
        };
        assert!(set.contains('5' as u32));

        let Exp::Set(set) = parse_expression("[^a-c]").unwrap() else {
            panic!("expected a set");
        };
        assert!(set.negated);
        assert!(!set.contains('b' as u32));
        assert!(set.contains('z' as u32));

        let Exp::Set(set) = parse_expression("[[:digit:][a-f]]").unwrap() else {
            panic!("expected a set");
        };
        assert!(set.contains('e' as u32));
        assert!(!set.contains('g' as u32));

        assert!(parse_expression("[:nope:]").is_err());
        assert!(parse_expression("[]").is_err());
        assert!(parse_expression("[z-a]").is_err());
    }

    #[test]
    fn test_quantifier_versus_raw_group() {
        let exp = parse_expression("[:digit:]{2,4}").unwrap();
        assert!(matches!(
            exp,
            Exp::Repeat { min: 2, max: Some(4), .. }
        ));
        let exp = parse_expression("\"a\"{3}").unwrap();
        assert!(matches!(exp, Exp::Repeat { min: 3, max: Some(3), .. }));
        let exp = parse_expression("{\"a\" \"b\"}").unwrap();
        assert!(matches!(exp, Exp::Seq { cooked: false, .. }));
        assert!(parse_expression("\"a\"{4,2}").is_err());
    }

    #[test]
    fn test_precedence() {
        let exp = parse_expression("\"a\" \"b\" / !\"c\" .+").unwrap();
        let Exp::Choice(alts) = exp else {
            panic!("expected choice");
        };
        assert_eq!(alts.len(), 2);
        assert!(matches!(alts[0], Exp::Seq { cooked: true, .. }));
        let Exp::Seq { items, .. } = &alts[1] else {
            panic!("expected sequence");
        };
        assert!(matches!(items[0], Exp::Not(_)));
        assert!(matches!(items[1], Exp::Repeat { min: 1, max: None, .. }));
    }

    #[test]
    fn test_cooked_group_repetition() {
        let exp = parse_expression("(\"ab\")+").unwrap();
        assert!(matches!(exp, Exp::Repeat { cooked: true, .. }));
        let exp = parse_expression("{\"ab\"}+").unwrap();
        assert!(matches!(exp, Exp::Repeat { cooked: false, .. }));
    }

    #[test]
    fn test_references() {
        assert_eq!(
            reference("num.int"),
            Exp::Ref {
                package: Some("num".into()),
                name: "int".into(),
                span: Span::default()
            }
        );
        assert_eq!(
            reference("halt"),
            Exp::Ref {
                package: None,
                name: "halt".into(),
                span: Span::default()
            }
        );
        assert!(parse_expression("alias").is_err());
    }

    #[test]
    fn test_expression_errors() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("(\"a\"").is_err());
        let err = parse_expression("\"a\" )").unwrap_err();
        assert_eq!(err.span.start, 4);
        assert!(parse_expression("a = \"b\"").is_err());
    }

    #[test]
    fn test_parse_block() {
        let src = r#"
            rpl 1.1
            package num
            import word, net/ipv4 as ip
            -- digits
            local alias d = [:digit:]
            int = [+\-]? d+
            float = int "." d+
        "#;
        let stmts = parse_block(src).unwrap();
        assert_eq!(stmts.len(), 6);
        assert!(matches!(stmts[0], Stmt::Version { major: 1, minor: 1, .. }));
        assert!(matches!(&stmts[1], Stmt::Package { name, .. } if name == "num"));
        let Stmt::Import(specs) = &stmts[2] else {
            panic!("expected import");
        };
        assert_eq!(specs[0].path, "word");
        assert_eq!(specs[1].path, "net/ipv4");
        assert_eq!(specs[1].alias.as_deref(), Some("ip"));
        assert!(matches!(
            &stmts[3],
            Stmt::Binding { name, alias: true, local: true, .. } if name == "d"
        ));
        // Bindings end where the next `name =` begins.
        let Stmt::Binding { exp, .. } = &stmts[4] else {
            panic!("expected binding");
        };
        assert!(matches!(exp, Exp::Seq { .. }));
    }

    #[test]
    fn test_block_errors() {
        assert!(parse_block("package a.b").is_err());
        assert!(parse_block("x = \"a\"\nrpl 1.1").is_err());
        assert!(parse_block("grammar x = \"a\" end").is_err());
        assert!(parse_block("\"dangling\"").is_err());
    }
}

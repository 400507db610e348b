//! Tokenization of embedded code
//!
//! Turns scanned segments into one flat token stream. Literal text becomes
//! [`Tok::Text`], output tags are bracketed by [`Tok::EmitStart`] and
//! [`Tok::EmitEnd`], and the end of every code tag acts as a statement
//! separator. This lets a single parser handle blocks that span many tags.

use crate::error::{RenderError, Result};
use crate::scanner::{Segment, SegmentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elsif,
    Else,
    Unless,
    End,
    For,
    In,
    Do,
    Then,
    And,
    Or,
    Not,
    Nil,
    True,
    False,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "if" => Self::If,
            "elsif" => Self::Elsif,
            "else" => Self::Else,
            "unless" => Self::Unless,
            "end" => Self::End,
            "for" => Self::For,
            "in" => Self::In,
            "do" => Self::Do,
            "then" => Self::Then,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "nil" => Self::Nil,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }
}

/// Piece of a double-quoted string literal
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    /// Source of a `#{...}` interpolation
    Code(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Text(String),
    EmitStart,
    EmitEnd,
    /// Statement separator: newline, `;` or the end of a code tag
    Newline,

    Int(i64),
    Float(f64),
    Str(Vec<StrPart>),
    Regex(String),
    Symbol(String),
    /// `name:` inside a hash literal
    Label(String),
    Ident(String),
    Const(String),
    Kw(Keyword),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    DotDot,
    DotDotDot,
    ColonColon,
    Colon,
    Question,
    Pipe,
    Arrow,

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    EqEq,
    NotEq,
    Match,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

impl Tok {
    /// Tokens after which a line break does not end the statement.
    fn continues_line(&self) -> bool {
        matches!(
            self,
            Tok::Comma
                | Tok::Dot
                | Tok::DotDot
                | Tok::DotDotDot
                | Tok::ColonColon
                | Tok::Colon
                | Tok::Question
                | Tok::Arrow
                | Tok::Plus
                | Tok::Minus
                | Tok::Star
                | Tok::StarStar
                | Tok::Slash
                | Tok::Percent
                | Tok::Assign
                | Tok::PlusAssign
                | Tok::MinusAssign
                | Tok::EqEq
                | Tok::NotEq
                | Tok::Match
                | Tok::Lt
                | Tok::Le
                | Tok::Gt
                | Tok::Ge
                | Tok::Shl
                | Tok::AndAnd
                | Tok::OrOr
                | Tok::Bang
                | Tok::Kw(Keyword::And | Keyword::Or | Keyword::Not)
        )
    }

    /// Whether an operand (rather than an operator) is expected after this token.
    fn expects_operand(&self) -> bool {
        !matches!(
            self,
            Tok::Int(_)
                | Tok::Float(_)
                | Tok::Str(_)
                | Tok::Regex(_)
                | Tok::Symbol(_)
                | Tok::Ident(_)
                | Tok::Const(_)
                | Tok::RParen
                | Tok::RBracket
                | Tok::RBrace
                | Tok::Kw(Keyword::End | Keyword::Nil | Keyword::True | Keyword::False)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// Tokenizes every segment of a template, ending with [`Tok::Eof`].
///
/// # Errors
///
/// Returns `RenderError::Syntax` on malformed literals or stray characters.
pub fn tokenize(segments: &[Segment]) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut last_line = 1;
    for segment in segments {
        last_line = segment.line + segment.content.matches('\n').count();
        match segment.kind {
            SegmentKind::Text => tokens.push(Token {
                tok: Tok::Text(segment.content.clone()),
                line: segment.line,
            }),
            SegmentKind::Comment => {}
            SegmentKind::Code => {
                CodeLexer::new(&segment.content, segment.line, true).run(&mut tokens)?;
                push_separator(&mut tokens, last_line);
            }
            SegmentKind::Output => {
                tokens.push(Token {
                    tok: Tok::EmitStart,
                    line: segment.line,
                });
                CodeLexer::new(&segment.content, segment.line, false).run(&mut tokens)?;
                tokens.push(Token {
                    tok: Tok::EmitEnd,
                    line: last_line,
                });
            }
        }
    }
    tokens.push(Token {
        tok: Tok::Eof,
        line: last_line,
    });
    Ok(tokens)
}

/// Tokenizes a standalone code fragment, such as a `#{...}` interpolation.
///
/// # Errors
///
/// Returns `RenderError::Syntax` on malformed input.
pub fn tokenize_code(source: &str, line: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    CodeLexer::new(source, line, false).run(&mut tokens)?;
    tokens.push(Token { tok: Tok::Eof, line });
    Ok(tokens)
}

fn push_separator(tokens: &mut Vec<Token>, line: usize) {
    if !matches!(tokens.last(), Some(Token { tok: Tok::Newline, .. })) {
        tokens.push(Token {
            tok: Tok::Newline,
            line,
        });
    }
}

struct CodeLexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    statements: bool,
    source: &'a str,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'a> CodeLexer<'a> {
    /// `statements` controls whether newlines separate statements (code tags)
    /// or are plain whitespace (output tags and interpolations).
    fn new(source: &'a str, line: usize, statements: bool) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line,
            depth: 0,
            statements,
            source,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> RenderError {
        RenderError::syntax(self.line, message)
    }

    fn run(mut self, tokens: &mut Vec<Token>) -> Result<()> {
        let first = tokens.len();
        while let Some(c) = self.peek() {
            let expects_operand = tokens[first..]
                .last()
                .is_none_or(|t| t.tok.expects_operand());
            match c {
                '\n' => {
                    self.pos += 1;
                    let continued = tokens[first..]
                        .last()
                        .is_none_or(|t| t.tok.continues_line() || t.tok == Tok::Newline);
                    if self.statements && self.depth == 0 && !continued {
                        tokens.push(Token {
                            tok: Tok::Newline,
                            line: self.line,
                        });
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => self.pos += 1,
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                ';' => {
                    self.pos += 1;
                    push_separator(tokens, self.line);
                }
                '0'..='9' => {
                    let tok = self.number()?;
                    self.push(tokens, tok);
                }
                '"' => {
                    let tok = self.double_quoted()?;
                    self.push(tokens, tok);
                }
                '\'' => {
                    let tok = self.single_quoted()?;
                    self.push(tokens, tok);
                }
                '/' if expects_operand => {
                    let tok = self.regex()?;
                    self.push(tokens, tok);
                }
                ':' if expects_operand && self.peek_at(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    let name = self.ident_with_suffix();
                    self.push(tokens, Tok::Symbol(name));
                }
                // Operator symbols such as `reduce(:+)`
                ':' if expects_operand
                    && matches!(self.peek_at(1), Some('+' | '-' | '*' | '/' | '%'))
                    && matches!(self.peek_at(2), None | Some(')' | ',' | ' ')) =>
                {
                    let op = self.peek_at(1).map(String::from).unwrap_or_default();
                    self.pos += 2;
                    self.push(tokens, Tok::Symbol(op));
                }
                c if is_ident_start(c) => {
                    let after_dot = matches!(
                        tokens[first..].last(),
                        Some(Token {
                            tok: Tok::Dot | Tok::ColonColon,
                            ..
                        })
                    );
                    let tok = self.word(after_dot);
                    self.push(tokens, tok);
                }
                _ => {
                    let tok = self.operator()?;
                    self.push(tokens, tok);
                }
            }
        }
        Ok(())
    }

    fn push(&self, tokens: &mut Vec<Token>, tok: Tok) {
        tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn number(&mut self) -> Result<Tok> {
        let mut digits = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c == '_' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
            } else if c == '.'
                && !is_float
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
            {
                is_float = true;
                digits.push(c);
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+' | '-'))
                        && self.peek_at(2).is_some_and(|n| n.is_ascii_digit())))
            {
                is_float = true;
                digits.push(c);
                self.pos += 1;
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    digits.push(sign);
                    self.pos += 1;
                }
                continue;
            } else {
                break;
            }
            self.pos += 1;
        }

        if is_float {
            digits
                .parse()
                .map(Tok::Float)
                .map_err(|_| self.error(format!("invalid float literal `{digits}`")))
        } else {
            digits
                .parse()
                .map(Tok::Int)
                .map_err(|_| self.error(format!("integer literal `{digits}` is too large")))
        }
    }

    fn single_quoted(&mut self) -> Result<Tok> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some('\'') => {
                    self.pos += 1;
                    return Ok(Tok::Str(vec![StrPart::Lit(out)]));
                }
                Some('\\') if matches!(self.peek_at(1), Some('\\' | '\'')) => {
                    out.push(self.chars[self.pos + 1]);
                    self.pos += 2;
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn double_quoted(&mut self) -> Result<Tok> {
        self.pos += 1;
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    let escaped = self
                        .peek_at(1)
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    lit.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        's' => ' ',
                        'e' => '\x1b',
                        other => other,
                    });
                    self.pos += 2;
                }
                Some('#') if self.peek_at(1) == Some('{') => {
                    self.pos += 2;
                    if !lit.is_empty() {
                        parts.push(StrPart::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(StrPart::Code(self.interpolation()?));
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    lit.push(c);
                    self.pos += 1;
                }
            }
        }
        if !lit.is_empty() || parts.is_empty() {
            parts.push(StrPart::Lit(lit));
        }
        Ok(Tok::Str(parts))
    }

    /// Collects the source of a `#{...}` body, balancing nested braces and
    /// skipping over quoted strings.
    fn interpolation(&mut self) -> Result<String> {
        let mut depth = 0usize;
        let mut code = String::new();
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string interpolation"));
            };
            self.pos += 1;
            if let Some(q) = quote {
                if c == '\\' {
                    code.push(c);
                    if let Some(next) = self.peek() {
                        code.push(next);
                        self.pos += 1;
                    }
                    continue;
                }
                if c == q {
                    quote = None;
                }
                code.push(c);
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(code),
                '}' => depth -= 1,
                _ => {}
            }
            code.push(c);
        }
    }

    fn regex(&mut self) -> Result<Tok> {
        self.pos += 1;
        let mut pattern = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error("unterminated regular expression")),
                Some('/') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') if self.peek_at(1) == Some('/') => {
                    pattern.push('/');
                    self.pos += 2;
                }
                Some('\\') => {
                    pattern.push('\\');
                    if let Some(next) = self.peek_at(1) {
                        pattern.push(next);
                    }
                    self.pos += 2;
                }
                Some(c) => {
                    pattern.push(c);
                    self.pos += 1;
                }
            }
        }

        let mut flags = String::new();
        while let Some(flag @ ('i' | 'm' | 'x')) = self.peek() {
            // Ruby's `m` is dot-matches-newline, which is `s` here
            flags.push(if flag == 'm' { 's' } else { flag });
            self.pos += 1;
        }
        if flags.is_empty() {
            Ok(Tok::Regex(pattern))
        } else {
            Ok(Tok::Regex(format!("(?{flags}){pattern}")))
        }
    }

    fn ident_with_suffix(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| is_ident_char(*c)) {
            name.push(c);
            self.pos += 1;
        }
        if let Some(suffix @ ('?' | '!')) = self.peek()
            && self.peek_at(1) != Some('=')
        {
            name.push(suffix);
            self.pos += 1;
        }
        name
    }

    fn word(&mut self, after_dot: bool) -> Tok {
        let name = self.ident_with_suffix();

        if self.peek() == Some(':')
            && self.peek_at(1) != Some(':')
            && !name.ends_with('?')
            && self.depth > 0
        {
            self.pos += 1;
            return Tok::Label(name);
        }
        if after_dot {
            return Tok::Ident(name);
        }
        if let Some(keyword) = Keyword::from_ident(&name) {
            return Tok::Kw(keyword);
        }
        if name.starts_with(|c: char| c.is_uppercase()) {
            Tok::Const(name)
        } else {
            Tok::Ident(name)
        }
    }

    fn operator(&mut self) -> Result<Tok> {
        const THREE: &[(&str, Tok)] = &[("...", Tok::DotDotDot)];
        const TWO: &[(&str, Tok)] = &[
            ("**", Tok::StarStar),
            ("+=", Tok::PlusAssign),
            ("-=", Tok::MinusAssign),
            ("==", Tok::EqEq),
            ("!=", Tok::NotEq),
            ("=~", Tok::Match),
            ("=>", Tok::Arrow),
            ("<=", Tok::Le),
            (">=", Tok::Ge),
            ("<<", Tok::Shl),
            ("&&", Tok::AndAnd),
            ("||", Tok::OrOr),
            ("..", Tok::DotDot),
            ("::", Tok::ColonColon),
        ];

        let rest: String = self.chars[self.pos..].iter().take(3).collect();
        for (text, tok) in THREE.iter().chain(TWO) {
            if rest.starts_with(text) {
                self.pos += text.chars().count();
                return Ok(tok.clone());
            }
        }

        let c = self.chars[self.pos];
        self.pos += 1;
        let tok = match c {
            '(' => {
                self.depth += 1;
                Tok::LParen
            }
            '[' => {
                self.depth += 1;
                Tok::LBracket
            }
            '{' => {
                self.depth += 1;
                Tok::LBrace
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RParen
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RBracket
            }
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RBrace
            }
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            ':' => Tok::Colon,
            '?' => Tok::Question,
            '|' => Tok::Pipe,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' => Tok::Assign,
            '<' => Tok::Lt,
            '>' => Tok::Gt,
            '!' => Tok::Bang,
            other => {
                return Err(self.error(format!(
                    "unexpected character `{other}` in `{}`",
                    self.source.trim()
                )));
            }
        };
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{TrimMode, scan};

    fn toks(template: &str) -> Vec<Tok> {
        let segments = scan(template, TrimMode::Dash).unwrap();
        tokenize(&segments)
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    fn code(source: &str) -> Vec<Tok> {
        tokenize_code(source, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn test_text_and_output_tokens() {
        assert_eq!(
            toks("Version: <%= 1+1 %>"),
            vec![
                Tok::Text("Version: ".to_string()),
                Tok::EmitStart,
                Tok::Int(1),
                Tok::Plus,
                Tok::Int(1),
                Tok::EmitEnd,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_code_tag_ends_statement() {
        assert_eq!(
            toks("<% x = 1 %>"),
            vec![
                Tok::Ident("x".to_string()),
                Tok::Assign,
                Tok::Int(1),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_tag_produces_nothing() {
        assert_eq!(toks("<%# anything at all %>"), vec![Tok::Eof]);
    }

    #[test]
    fn test_keywords_and_method_names() {
        assert_eq!(
            code("if x.empty? then y.end end"),
            vec![
                Tok::Kw(Keyword::If),
                Tok::Ident("x".to_string()),
                Tok::Dot,
                Tok::Ident("empty?".to_string()),
                Tok::Kw(Keyword::Then),
                Tok::Ident("y".to_string()),
                Tok::Dot,
                Tok::Ident("end".to_string()),
                Tok::Kw(Keyword::End),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            code("1_000 2.5 1e3 1..3"),
            vec![
                Tok::Int(1000),
                Tok::Float(2.5),
                Tok::Float(1000.0),
                Tok::Int(1),
                Tok::DotDot,
                Tok::Int(3),
                Tok::Eof,
            ]
        );
        assert!(tokenize_code("99999999999999999999", 1).is_err());
    }

    #[test]
    fn test_strings_and_interpolation() {
        assert_eq!(
            code(r#"'it\'s' "a\tb #{x + 1}!""#),
            vec![
                Tok::Str(vec![StrPart::Lit("it's".to_string())]),
                Tok::Str(vec![
                    StrPart::Lit("a\tb ".to_string()),
                    StrPart::Code("x + 1".to_string()),
                    StrPart::Lit("!".to_string()),
                ]),
                Tok::Eof,
            ]
        );
        assert_eq!(
            code(r##""#{h["k"]}""##),
            vec![
                Tok::Str(vec![StrPart::Code("h[\"k\"]".to_string())]),
                Tok::Eof
            ]
        );
        assert!(tokenize_code("\"open", 1).is_err());
    }

    #[test]
    fn test_regex_versus_division() {
        assert_eq!(
            code("a / 2"),
            vec![
                Tok::Ident("a".to_string()),
                Tok::Slash,
                Tok::Int(2),
                Tok::Eof
            ]
        );
        assert_eq!(
            code("s.gsub(/a\\/b/i, '')"),
            vec![
                Tok::Ident("s".to_string()),
                Tok::Dot,
                Tok::Ident("gsub".to_string()),
                Tok::LParen,
                Tok::Regex("(?i)a/b".to_string()),
                Tok::Comma,
                Tok::Str(vec![StrPart::Lit(String::new())]),
                Tok::RParen,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_symbols_labels_and_ternary() {
        assert_eq!(
            code("{ name: :value }"),
            vec![
                Tok::LBrace,
                Tok::Label("name".to_string()),
                Tok::Symbol("value".to_string()),
                Tok::RBrace,
                Tok::Eof,
            ]
        );
        assert_eq!(
            code("a ? b : c"),
            vec![
                Tok::Ident("a".to_string()),
                Tok::Question,
                Tok::Ident("b".to_string()),
                Tok::Colon,
                Tok::Ident("c".to_string()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_separate_statements_only_in_code() {
        let tokens = toks("<% a = 1\nb = [1,\n2] %>");
        let separators = tokens.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(separators, 2);

        let tokens = toks("<%= a +\n b %>");
        assert!(!tokens.contains(&Tok::Newline));
    }

    #[test]
    fn test_line_numbers() {
        let segments = scan("one\n<% a\nb %>", TrimMode::Dash).unwrap();
        let tokens = tokenize(&segments).unwrap();
        let b = tokens
            .iter()
            .find(|t| t.tok == Tok::Ident("b".to_string()))
            .unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize_code("a @ b", 4).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { line: 4, .. }));
    }
}

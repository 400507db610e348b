//! Recursive-descent parser for template programs
//!
//! A template parses into a list of [`Stmt`]s. Literal text and output tags
//! are statements too, so control flow opened in one tag can wrap text and
//! close in a later tag.

use crate::error::{RenderError, Result};
use crate::lexer::{Keyword, StrPart, Tok, Token, tokenize_code};
use crate::value::Value;

/// Maximum nesting of expressions and blocks
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Literal template text
    Text(String),
    /// `<%= expr %>`
    Emit(Expr),
    /// Expression evaluated for its effect
    Expr(Expr),
    Assign {
        name: String,
        op: Option<BinOp>,
        value: Expr,
    },
    IndexAssign {
        name: String,
        index: Expr,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Vec<Stmt>,
    },
    For {
        vars: Vec<String>,
        iter: Expr,
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    Match,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Interp(Vec<Interp>),
    Array(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Var(String),
    Const(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        exclusive: bool,
    },
    Index(Box<Expr>, Vec<Expr>),
    Call {
        recv: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        block: Option<Block>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interp {
    Lit(String),
    Expr(Expr),
}

/// `{ |params| body }` or `do |params| body end`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    allow_do: bool,
}

/// Parses a whole token stream into a program.
///
/// # Errors
///
/// Returns `RenderError::Syntax` with the offending line when the code is
/// malformed or blocks are left unclosed.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>> {
    let mut parser = Parser::new(tokens);
    let program = parser.statements()?;
    match parser.peek() {
        Tok::Eof => Ok(program),
        other => Err(parser.error(format!("unexpected {}", describe(other)))),
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Kw(Keyword::End) => "`end`".to_string(),
        Tok::Kw(Keyword::Else) => "`else`".to_string(),
        Tok::Kw(Keyword::Elsif) => "`elsif`".to_string(),
        Tok::Kw(kw) => format!("keyword `{kw:?}`").to_lowercase(),
        Tok::Text(_) => "template text".to_string(),
        Tok::EmitStart => "output tag".to_string(),
        Tok::EmitEnd => "end of output tag".to_string(),
        Tok::Newline => "end of statement".to_string(),
        Tok::Eof => "end of template".to_string(),
        Tok::Ident(name) | Tok::Const(name) => format!("`{name}`"),
        other => format!("{other:?}"),
    }
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            allow_do: true,
        }
    }

    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .or(self.tokens.last())
            .map_or(&Tok::Eof, |t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {}", describe(self.peek()))))
        }
    }

    fn error(&self, message: impl Into<String>) -> RenderError {
        RenderError::syntax(self.line(), message)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Tok::Newline) {}
    }

    fn expr(&self, kind: ExprKind, line: usize) -> Expr {
        Expr { kind, line }
    }

    /// Parses statements until a block terminator or the end of input.
    fn statements(&mut self) -> Result<Vec<Stmt>> {
        self.enter()?;
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Tok::Eof
                | Tok::RBrace
                | Tok::Kw(Keyword::End | Keyword::Elsif | Keyword::Else) => break,
                _ => stmts.push(self.statement()?),
            }
        }
        self.leave();
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt> {
        let stmt = match self.peek().clone() {
            Tok::Text(text) => {
                self.pos += 1;
                return Ok(Stmt::Text(text));
            }
            Tok::EmitStart => {
                self.pos += 1;
                if self.peek() == &Tok::EmitEnd {
                    return Err(self.error("empty output tag"));
                }
                let value = self.expression()?;
                let stmt = self.modifiers(Stmt::Emit(value))?;
                self.expect(&Tok::EmitEnd, "`%>`")?;
                return Ok(stmt);
            }
            Tok::Kw(Keyword::If) => return self.if_statement(false),
            Tok::Kw(Keyword::Unless) => return self.if_statement(true),
            Tok::Kw(Keyword::For) => return self.for_statement(),
            _ => self.simple_statement()?,
        };
        self.modifiers(stmt)
    }

    /// Handles trailing `if cond` / `unless cond`.
    fn modifiers(&mut self, mut stmt: Stmt) -> Result<Stmt> {
        loop {
            let negate = match self.peek() {
                Tok::Kw(Keyword::If) => false,
                Tok::Kw(Keyword::Unless) => true,
                _ => return Ok(stmt),
            };
            self.pos += 1;
            let cond = self.condition(negate)?;
            stmt = Stmt::If {
                branches: vec![(cond, vec![stmt])],
                otherwise: Vec::new(),
            };
        }
    }

    fn simple_statement(&mut self) -> Result<Stmt> {
        let target = self.expression()?;
        let op = match self.peek() {
            Tok::Assign => None,
            Tok::PlusAssign => Some(BinOp::Add),
            Tok::MinusAssign => Some(BinOp::Sub),
            _ => return Ok(Stmt::Expr(target)),
        };
        self.pos += 1;
        let value = self.expression()?;

        match target.kind {
            ExprKind::Var(name) => Ok(Stmt::Assign { name, op, value }),
            ExprKind::Index(base, mut index) if op.is_none() && index.len() == 1 => {
                match base.kind {
                    ExprKind::Var(name) => Ok(Stmt::IndexAssign {
                        name,
                        index: index.remove(0),
                        value,
                    }),
                    _ => Err(RenderError::syntax(
                        target.line,
                        "can only assign into a local variable",
                    )),
                }
            }
            _ => Err(RenderError::syntax(target.line, "invalid assignment target")),
        }
    }

    fn condition(&mut self, negate: bool) -> Result<Expr> {
        let line = self.line();
        let saved = std::mem::replace(&mut self.allow_do, false);
        let cond = self.expression();
        self.allow_do = saved;
        let cond = cond?;
        Ok(if negate {
            self.expr(ExprKind::Not(Box::new(cond)), line)
        } else {
            cond
        })
    }

    fn if_statement(&mut self, negate: bool) -> Result<Stmt> {
        self.pos += 1;
        let mut branches = Vec::new();
        let cond = self.condition(negate)?;
        self.eat(&Tok::Kw(Keyword::Then));
        branches.push((cond, self.statements()?));

        let mut otherwise = Vec::new();
        loop {
            match self.peek() {
                Tok::Kw(Keyword::Elsif) if !negate => {
                    self.pos += 1;
                    let cond = self.condition(false)?;
                    self.eat(&Tok::Kw(Keyword::Then));
                    branches.push((cond, self.statements()?));
                }
                Tok::Kw(Keyword::Else) => {
                    self.pos += 1;
                    otherwise = self.statements()?;
                    self.expect(&Tok::Kw(Keyword::End), "`end`")?;
                    break;
                }
                Tok::Kw(Keyword::End) => {
                    self.pos += 1;
                    break;
                }
                other => {
                    return Err(self.error(format!(
                        "expected `end` to close `{}`, found {}",
                        if negate { "unless" } else { "if" },
                        describe(other)
                    )));
                }
            }
        }
        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.pos += 1;
        let mut vars = vec![self.ident("loop variable")?];
        while self.eat(&Tok::Comma) {
            vars.push(self.ident("loop variable")?);
        }
        self.expect(&Tok::Kw(Keyword::In), "`in`")?;
        let saved = std::mem::replace(&mut self.allow_do, false);
        let iter = self.expression();
        self.allow_do = saved;
        let iter = iter?;
        self.eat(&Tok::Kw(Keyword::Do));
        let body = self.statements()?;
        self.expect(&Tok::Kw(Keyword::End), "`end` to close `for`")?;
        Ok(Stmt::For { vars, iter, body })
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.pos += 1;
                Ok(name)
            }
            other => Err(self.error(format!("expected {what}, found {}", describe(&other)))),
        }
    }

    /// Full expression, including the low-precedence `not`, `and` and `or`.
    pub fn expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let result = self.logical();
        self.leave();
        result
    }

    fn logical(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        loop {
            let line = self.line();
            let is_and = match self.peek() {
                Tok::Kw(Keyword::And) => true,
                Tok::Kw(Keyword::Or) => false,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.not_expr()?;
            let kind = if is_and {
                ExprKind::And(Box::new(left), Box::new(right))
            } else {
                ExprKind::Or(Box::new(left), Box::new(right))
            };
            left = self.expr(kind, line);
        }
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.peek() == &Tok::Kw(Keyword::Not) {
            let line = self.line();
            self.pos += 1;
            self.enter()?;
            let inner = self.not_expr();
            self.leave();
            return Ok(self.expr(ExprKind::Not(Box::new(inner?)), line));
        }
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr> {
        let cond = self.range()?;
        if self.peek() != &Tok::Question {
            return Ok(cond);
        }
        let line = self.line();
        self.pos += 1;
        self.enter()?;
        let branches = self.ternary().and_then(|then| {
            self.expect(&Tok::Colon, "`:` in conditional expression")?;
            Ok((then, self.ternary()?))
        });
        self.leave();
        let (then, otherwise) = branches?;
        Ok(self.expr(
            ExprKind::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)),
            line,
        ))
    }

    fn range(&mut self) -> Result<Expr> {
        let start = self.or_expr()?;
        let exclusive = match self.peek() {
            Tok::DotDot => false,
            Tok::DotDotDot => true,
            _ => return Ok(start),
        };
        let line = self.line();
        self.pos += 1;
        let end = self.or_expr()?;
        Ok(self.expr(
            ExprKind::Range {
                start: Box::new(start),
                end: Box::new(end),
                exclusive,
            },
            line,
        ))
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.peek() == &Tok::OrOr {
            let line = self.line();
            self.pos += 1;
            let right = self.and_expr()?;
            left = self.expr(ExprKind::Or(Box::new(left), Box::new(right)), line);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.equality()?;
        while self.peek() == &Tok::AndAnd {
            let line = self.line();
            self.pos += 1;
            let right = self.equality()?;
            left = self.expr(ExprKind::And(Box::new(left), Box::new(right)), line);
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(Tok, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        loop {
            let Some(op) = ops
                .iter()
                .find(|(tok, _)| tok == self.peek())
                .map(|(_, op)| *op)
            else {
                return Ok(left);
            };
            let line = self.line();
            self.pos += 1;
            let right = next(self)?;
            left = self.expr(
                ExprKind::Binary(op, Box::new(left), Box::new(right)),
                line,
            );
        }
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Tok::EqEq, BinOp::Eq),
                (Tok::NotEq, BinOp::NotEq),
                (Tok::Match, BinOp::Match),
            ],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Tok::Lt, BinOp::Lt),
                (Tok::Le, BinOp::Le),
                (Tok::Gt, BinOp::Gt),
                (Tok::Ge, BinOp::Ge),
            ],
            Self::shift,
        )
    }

    fn shift(&mut self) -> Result<Expr> {
        self.binary_level(&[(Tok::Shl, BinOp::Shl)], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(
            &[(Tok::Plus, BinOp::Add), (Tok::Minus, BinOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                (Tok::Star, BinOp::Mul),
                (Tok::Slash, BinOp::Div),
                (Tok::Percent, BinOp::Rem),
            ],
            Self::negation,
        )
    }

    fn negation(&mut self) -> Result<Expr> {
        if self.peek() != &Tok::Minus {
            return self.power();
        }
        let line = self.line();
        self.pos += 1;
        self.enter()?;
        let inner = self.negation();
        self.leave();
        let inner = inner?;
        let kind = match inner.kind {
            ExprKind::Literal(Value::Int(n)) => ExprKind::Literal(Value::Int(-n)),
            ExprKind::Literal(Value::Float(f)) => ExprKind::Literal(Value::Float(-f)),
            kind => ExprKind::Neg(Box::new(self.expr(kind, inner.line))),
        };
        Ok(self.expr(kind, line))
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.bang()?;
        if self.peek() != &Tok::StarStar {
            return Ok(base);
        }
        let line = self.line();
        self.pos += 1;
        self.enter()?;
        let exponent = self.negation();
        self.leave();
        Ok(self.expr(
            ExprKind::Binary(BinOp::Pow, Box::new(base), Box::new(exponent?)),
            line,
        ))
    }

    fn bang(&mut self) -> Result<Expr> {
        if self.peek() != &Tok::Bang {
            return self.postfix();
        }
        let line = self.line();
        self.pos += 1;
        self.enter()?;
        let inner = self.bang();
        self.leave();
        Ok(self.expr(ExprKind::Not(Box::new(inner?)), line))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Tok::Dot | Tok::ColonColon => {
                    self.pos += 1;
                    let line = self.line();
                    let name = match self.advance() {
                        Tok::Ident(name) | Tok::Const(name) => name,
                        other => {
                            return Err(RenderError::syntax(
                                line,
                                format!("expected method name, found {}", describe(&other)),
                            ));
                        }
                    };
                    expr = self.call(Some(expr), name, line)?;
                }
                Tok::LBracket => {
                    let line = self.line();
                    self.pos += 1;
                    let index = self.list(&Tok::RBracket, "`]`")?;
                    if index.is_empty() {
                        return Err(RenderError::syntax(line, "empty index"));
                    }
                    expr = self.expr(ExprKind::Index(Box::new(expr), index), line);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parses optional arguments and block after a method name.
    fn call(&mut self, recv: Option<Expr>, name: String, line: usize) -> Result<Expr> {
        let args = if self.eat(&Tok::LParen) {
            self.arguments()?
        } else if self.starts_command_argument() {
            self.command_arguments()?
        } else {
            Vec::new()
        };
        let block = match self.peek() {
            Tok::LBrace => {
                self.pos += 1;
                let block = self.block_body(&Tok::RBrace)?;
                self.expect(&Tok::RBrace, "`}` to close block")?;
                Some(block)
            }
            Tok::Kw(Keyword::Do) if self.allow_do => {
                self.pos += 1;
                let saved = std::mem::replace(&mut self.allow_do, true);
                let block = self.block_body(&Tok::Kw(Keyword::End));
                self.allow_do = saved;
                let block = block?;
                self.expect(&Tok::Kw(Keyword::End), "`end` to close `do` block")?;
                Some(block)
            }
            _ => None,
        };
        Ok(self.expr(
            ExprKind::Call {
                recv: recv.map(Box::new),
                name,
                args,
                block,
            },
            line,
        ))
    }

    fn block_body(&mut self, close: &Tok) -> Result<Block> {
        let mut params = Vec::new();
        if self.eat(&Tok::Pipe) {
            loop {
                params.push(self.ident("block parameter")?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(&Tok::Pipe, "`|` after block parameters")?;
        } else if self.eat(&Tok::OrOr) {
            // `||` is an empty parameter list
        }
        let body = self.statements()?;
        if self.peek() != close {
            return Err(self.error(format!(
                "expected {} to close block, found {}",
                describe(close),
                describe(self.peek())
            )));
        }
        Ok(Block { params, body })
    }

    /// Comma-separated arguments up to `)`; `key: value` pairs are gathered
    /// into a trailing hash argument.
    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        let mut options = Vec::new();
        let line = self.line();
        loop {
            if self.eat(&Tok::RParen) {
                break;
            }
            if let Tok::Label(key) = self.peek().clone() {
                let key_line = self.line();
                self.pos += 1;
                let value = self.expression()?;
                options.push((self.expr(ExprKind::Literal(Value::Str(key)), key_line), value));
            } else {
                args.push(self.expression()?);
            }
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RParen, "`)` after arguments")?;
                break;
            }
        }
        if !options.is_empty() {
            args.push(self.expr(ExprKind::Hash(options), line));
        }
        Ok(args)
    }

    /// A literal directly after a method name starts paren-less arguments,
    /// as in `require "yaml"` or `items.first 2`.
    fn starts_command_argument(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Str(_) | Tok::Symbol(_) | Tok::Int(_) | Tok::Float(_) | Tok::Const(_)
        )
    }

    fn command_arguments(&mut self) -> Result<Vec<Expr>> {
        let saved = std::mem::replace(&mut self.allow_do, false);
        let mut parse = || -> Result<Vec<Expr>> {
            let mut args = vec![self.expression()?];
            while self.eat(&Tok::Comma) {
                args.push(self.expression()?);
            }
            Ok(args)
        };
        let args = parse();
        self.allow_do = saved;
        args
    }

    fn list(&mut self, close: &Tok, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                self.expect(close, what)?;
                return Ok(items);
            }
        }
    }

    fn hash_literal(&mut self, line: usize) -> Result<Expr> {
        let mut entries = Vec::new();
        loop {
            if self.eat(&Tok::RBrace) {
                break;
            }
            let key = if let Tok::Label(key) = self.peek().clone() {
                let key_line = self.line();
                self.pos += 1;
                self.expr(ExprKind::Literal(Value::Str(key)), key_line)
            } else {
                let key = self.expression()?;
                self.expect(&Tok::Arrow, "`=>` in hash literal")?;
                key
            };
            entries.push((key, self.expression()?));
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RBrace, "`}` to close hash literal")?;
                break;
            }
        }
        Ok(self.expr(ExprKind::Hash(entries), line))
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        let kind = match self.advance() {
            Tok::Int(n) => ExprKind::Literal(Value::Int(n)),
            Tok::Float(f) => ExprKind::Literal(Value::Float(f)),
            Tok::Symbol(name) => ExprKind::Literal(Value::Str(name)),
            Tok::Regex(pattern) => ExprKind::Literal(Value::Regex(pattern)),
            Tok::Kw(Keyword::Nil) => ExprKind::Literal(Value::Nil),
            Tok::Kw(Keyword::True) => ExprKind::Literal(Value::Bool(true)),
            Tok::Kw(Keyword::False) => ExprKind::Literal(Value::Bool(false)),
            Tok::Str(parts) => self.string(parts, line)?,
            Tok::Const(name) => ExprKind::Const(name),
            Tok::Ident(name) => {
                if self.peek() == &Tok::LParen || self.starts_command_argument() {
                    return self.call(None, name, line);
                }
                ExprKind::Var(name)
            }
            Tok::LParen => {
                let saved = std::mem::replace(&mut self.allow_do, true);
                let inner = self.expression();
                self.allow_do = saved;
                let inner = inner?;
                self.expect(&Tok::RParen, "`)`")?;
                return Ok(inner);
            }
            Tok::LBracket => ExprKind::Array(self.list(&Tok::RBracket, "`]` to close array")?),
            Tok::LBrace => return self.hash_literal(line),
            other => {
                return Err(RenderError::syntax(
                    line,
                    format!("unexpected {}", describe(&other)),
                ));
            }
        };
        Ok(self.expr(kind, line))
    }

    fn string(&mut self, parts: Vec<StrPart>, line: usize) -> Result<ExprKind> {
        if let [StrPart::Lit(text)] = parts.as_slice() {
            return Ok(ExprKind::Literal(Value::Str(text.clone())));
        }
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StrPart::Lit(text) => pieces.push(Interp::Lit(text)),
                StrPart::Code(source) => {
                    let mut inner = Parser::new(tokenize_code(&source, line)?);
                    inner.depth = self.depth;
                    let expr = inner.expression()?;
                    if inner.peek() != &Tok::Eof {
                        return Err(inner.error(format!(
                            "unexpected {} in string interpolation",
                            describe(inner.peek())
                        )));
                    }
                    pieces.push(Interp::Expr(expr));
                }
            }
        }
        Ok(ExprKind::Interp(pieces))
    }
}

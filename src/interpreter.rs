//! Tree-walking evaluator for parsed templates
//!
//! Text and output statements append to a single buffer, so blocks that wrap
//! literal text (`<% items.each do |i| %>...<% end %>`) render naturally.

use crate::error::{RenderError, Result};
use crate::parser::{BinOp, Block, Expr, ExprKind, Interp, Stmt};
use crate::value::{Module, Value};
use std::collections::HashMap;
use std::path::Path;

/// Upper bound on the number of items a range may expand to
pub const MAX_RANGE_ITEMS: i64 = 1_000_000;

/// Methods returning an element held by their receiver.
const ELEMENT_READERS: &[&str] = &[
    "first", "last", "fetch", "dig", "find", "detect", "min", "max", "min_by", "max_by",
];

/// Upper bound on characters or items produced by repetition and padding.
pub const MAX_REPEAT_UNITS: usize = 16_000_000;

/// Methods that update a receiver held in a local variable.
const MUTATORS: &[&str] = &["push", "append", "<<", "concat", "unshift"];

pub struct Interpreter<'a> {
    pub(crate) base_dir: &'a Path,
    scopes: Vec<HashMap<String, Value>>,
    out: String,
}

impl<'a> Interpreter<'a> {
    /// Creates an interpreter with an empty top-level scope.
    pub fn new(base_dir: &'a Path) -> Self {
        Self {
            base_dir,
            scopes: vec![HashMap::new()],
            out: String::new(),
        }
    }

    /// Executes a program and returns everything it rendered.
    ///
    /// # Errors
    ///
    /// Returns the first `RenderError::Eval` (or I/O error from a built-in)
    /// raised while executing.
    pub fn run(mut self, program: &[Stmt]) -> Result<String> {
        self.exec(program)?;
        Ok(self.out)
    }

    fn exec(&mut self, stmts: &[Stmt]) -> Result<Value> {
        let mut last = Value::Nil;
        for stmt in stmts {
            last = self.exec_stmt(stmt)?;
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Value> {
        match stmt {
            Stmt::Text(text) => {
                self.out.push_str(text);
                Ok(Value::Nil)
            }
            Stmt::Emit(expr) => {
                let value = self.eval(expr)?;
                self.out.push_str(&value.to_output());
                Ok(Value::Nil)
            }
            Stmt::Expr(expr) => self.eval(expr),
            Stmt::Assign { name, op, value } => {
                let mut result = self.eval(value)?;
                if let Some(op) = op {
                    let current = self.lookup(name, value.line)?;
                    result = self.binary(*op, current, result, value.line)?;
                }
                self.assign(name, result.clone());
                Ok(result)
            }
            Stmt::IndexAssign { name, index, value } => {
                let key = self.eval(index)?;
                let result = self.eval(value)?;
                self.index_assign(name, key, result.clone(), index.line)?;
                Ok(result)
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec(body);
                    }
                }
                self.exec(otherwise)
            }
            Stmt::For { vars, iter, body } => {
                let collection = self.eval(iter)?;
                for item in self.iterable(collection, iter.line)? {
                    for (name, value) in destructure(vars, vec![item]) {
                        self.assign(&name, value);
                    }
                    self.exec(body)?;
                }
                Ok(Value::Nil)
            }
        }
    }

    fn lookup(&self, name: &str, line: usize) -> Result<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .ok_or_else(|| {
                RenderError::eval(line, format!("undefined local variable or method `{name}'"))
            })
    }

    fn lookup_mut(&mut self, name: &str, line: usize) -> Result<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
            .ok_or_else(|| {
                RenderError::eval(line, format!("undefined local variable or method `{name}'"))
            })
    }

    /// Updates the innermost visible binding, or creates one in the current scope.
    fn assign(&mut self, name: &str, value: Value) {
        if let Some(slot) = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
        {
            *slot = value;
        } else if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn index_assign(&mut self, name: &str, key: Value, value: Value, line: usize) -> Result<()> {
        store_at(self.lookup_mut(name, line)?, key, value, line)
    }

    /// Runs a block with its parameters bound in a fresh scope.
    pub(crate) fn call_block(&mut self, block: &Block, args: Vec<Value>) -> Result<Value> {
        self.scopes
            .push(destructure(&block.params, args).into_iter().collect());
        let result = self.exec(&block.body);
        self.scopes.pop();
        result
    }

    /// Items visited by `for` and `each`.
    pub(crate) fn iterable(&self, value: Value, line: usize) -> Result<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items),
            Value::Hash(entries) => Ok(entries
                .into_iter()
                .map(|(k, v)| Value::Array(vec![k, v]))
                .collect()),
            Value::Range {
                start,
                end,
                exclusive,
            } => expand_range(start, end, exclusive, line),
            other => Err(RenderError::eval(
                line,
                format!("undefined method `each' for {}", other.type_name()),
            )),
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Literal(value) => Ok(value.clone()),
            ExprKind::Interp(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        Interp::Lit(lit) => text.push_str(lit),
                        Interp::Expr(inner) => text.push_str(&self.eval(inner)?.to_output()),
                    }
                }
                Ok(Value::Str(text))
            }
            ExprKind::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            ExprKind::Hash(pairs) => {
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
                        entry.1 = value;
                    } else {
                        entries.push((key, value));
                    }
                }
                Ok(Value::Hash(entries))
            }
            ExprKind::Var(name) => self.lookup(name, line),
            ExprKind::Const(name) => Module::from_name(name)
                .map(Value::Module)
                .ok_or_else(|| RenderError::eval(line, format!("uninitialized constant {name}"))),
            ExprKind::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            ExprKind::Neg(inner) => match self.eval(inner)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| RenderError::eval(line, "integer overflow")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(RenderError::eval(
                    line,
                    format!("undefined method `-@' for {}", other.type_name()),
                )),
            },
            ExprKind::Binary(BinOp::Shl, left, right) => {
                self.mutating_call(left, "<<", std::slice::from_ref(&**right), None, line)
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right, line)
            }
            ExprKind::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            ExprKind::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            ExprKind::Ternary(cond, then, otherwise) => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::Range {
                start,
                end,
                exclusive,
            } => match (self.eval(start)?, self.eval(end)?) {
                (Value::Int(start), Value::Int(end)) => Ok(Value::Range {
                    start,
                    end,
                    exclusive: *exclusive,
                }),
                (a, b) => Err(RenderError::eval(
                    line,
                    format!("bad value for range ({} and {})", a.type_name(), b.type_name()),
                )),
            },
            ExprKind::Index(base, args) => {
                let base = self.eval(base)?;
                let args = self.eval_args(args)?;
                self.index(base, &args, line)
            }
            ExprKind::Call {
                recv: None,
                name,
                args,
                block,
            } => {
                let args = self.eval_args(args)?;
                self.call_function(name, args, block.as_ref(), line)
            }
            ExprKind::Call {
                recv: Some(recv),
                name,
                args,
                block,
            } => {
                if MUTATORS.contains(&name.as_str()) {
                    return self.mutating_call(recv, name, args, block.as_ref(), line);
                }
                let recv = self.eval(recv)?;
                let args = self.eval_args(args)?;
                self.call_method(recv, name, args, block.as_ref(), line)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    /// Calls a collection-growing method and stores the result back into the
    /// receiver: a local variable, or an element reached by indexing one.
    fn mutating_call(
        &mut self,
        recv: &Expr,
        name: &str,
        args: &[Expr],
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        let args = self.eval_args(args)?;
        let mut args = Some(args);
        self.update_place(recv, &mut |this, current| {
            let args = args.take().unwrap_or_default();
            this.call_method(current, name, args, block, line)
        })
    }

    /// Replaces the value stored at `place` with `apply(current)` and returns it.
    ///
    /// Literals and freshly built values are temporaries and are simply
    /// transformed. Methods that hand back an element of a collection would
    /// lose the change, so mutating their result is an error.
    fn update_place(
        &mut self,
        place: &Expr,
        apply: &mut dyn FnMut(&mut Self, Value) -> Result<Value>,
    ) -> Result<Value> {
        let line = place.line;
        match &place.kind {
            ExprKind::Var(name) => {
                let current = self.lookup(name, line)?;
                let updated = apply(self, current)?;
                *self.lookup_mut(name, line)? = updated.clone();
                Ok(updated)
            }
            ExprKind::Index(base, index) if index.len() == 1 => {
                let key = self.eval(&index[0])?;
                let mut updated = Value::Nil;
                self.update_place(base, &mut |this, mut container| {
                    let current = this.index(container.clone(), std::slice::from_ref(&key), line)?;
                    updated = apply(this, current)?;
                    store_at(&mut container, key.clone(), updated.clone(), line)?;
                    Ok(container)
                })?;
                Ok(updated)
            }
            ExprKind::Call { name, .. } if ELEMENT_READERS.contains(&name.as_str()) => {
                Err(RenderError::eval(
                    line,
                    format!("can't modify the result of `{name}'; assign it to a variable first"),
                ))
            }
            _ => {
                let current = self.eval(place)?;
                apply(self, current)
            }
        }
    }

    /// Receiver-less calls such as `require("yaml")` or `raise("...")`.
    fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        match (name, args.as_slice(), block) {
            // Every built-in library is always loaded
            ("require", [Value::Str(_)], None) => Ok(Value::Bool(true)),
            ("raise", [], None) => Err(RenderError::eval(line, "unhandled exception")),
            ("raise", [message], None) => Err(RenderError::eval(line, message.to_output())),
            ("format" | "sprintf", [Value::Str(fmt), rest @ ..], None) => {
                crate::builtins::format_string(fmt, rest, line).map(Value::Str)
            }
            _ => Err(RenderError::eval(
                line,
                format!("undefined method `{name}' for main"),
            )),
        }
    }

    pub(crate) fn binary(&mut self, op: BinOp, left: Value, right: Value, line: usize) -> Result<Value> {
        use Value::{Array, Bool, Float, Int, Str};
        let overflow = || RenderError::eval(line, "integer overflow");
        let undefined = |symbol: &str, value: &Value, other: &Value| {
            RenderError::eval(
                line,
                format!(
                    "undefined method `{symbol}' for {} with {}",
                    value.type_name(),
                    other.type_name()
                ),
            )
        };

        match op {
            BinOp::Eq => Ok(Bool(left.loose_eq(&right))),
            BinOp::NotEq => Ok(Bool(!left.loose_eq(&right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = left.compare(&right).ok_or_else(|| {
                    RenderError::eval(
                        line,
                        format!(
                            "comparison of {} with {} failed",
                            left.type_name(),
                            right.inspect()
                        ),
                    )
                })?;
                Ok(Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinOp::Match => match (&left, &right) {
                (Str(text), pattern @ Value::Regex(_)) | (pattern @ Value::Regex(_), Str(text)) => {
                    let regex = crate::builtins::pattern_regex(pattern, line)?;
                    Ok(regex.find(text).map_or(Value::Nil, |m| {
                        Int(text[..m.start()].chars().count() as i64)
                    }))
                }
                _ => Ok(Value::Nil),
            },
            BinOp::Add => match (left, right) {
                (Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(overflow),
                (Str(a), Str(b)) => Ok(Str(a + &b)),
                (Array(mut a), Array(b)) => {
                    a.extend(b);
                    Ok(Array(a))
                }
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Float(x + y)),
                    _ => Err(undefined("+", &a, &b)),
                },
            },
            BinOp::Sub => match (left, right) {
                (Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(overflow),
                (Array(a), Array(b)) => Ok(Array(
                    a.into_iter()
                        .filter(|item| !b.iter().any(|other| item.loose_eq(other)))
                        .collect(),
                )),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Float(x - y)),
                    _ => Err(undefined("-", &a, &b)),
                },
            },
            BinOp::Mul => match (left, right) {
                (Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(overflow),
                (Str(s), Int(n)) => {
                    let count = repeat_count(n, s.len(), line)?;
                    Ok(Str(s.repeat(count)))
                }
                (Array(items), Int(n)) => {
                    let count = repeat_count(n, items.len(), line)?;
                    Ok(Array(
                        std::iter::repeat_n(items, count).flatten().collect(),
                    ))
                }
                (Array(items), Str(sep)) => Ok(Str(crate::builtins::join(&items, &sep))),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Float(x * y)),
                    _ => Err(undefined("*", &a, &b)),
                },
            },
            BinOp::Div => match (left, right) {
                (Int(_), Int(0)) => Err(RenderError::eval(line, "divided by 0")),
                (Int(a), Int(b)) => floor_div(a, b).ok_or_else(overflow).map(Int),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Float(x / y)),
                    _ => Err(undefined("/", &a, &b)),
                },
            },
            BinOp::Rem => match (left, right) {
                (Int(_), Int(0)) => Err(RenderError::eval(line, "divided by 0")),
                (Int(a), Int(b)) => floor_rem(a, b).ok_or_else(overflow).map(Int),
                (Str(fmt), Array(args)) => crate::builtins::format_string(&fmt, &args, line).map(Str),
                (Str(fmt), arg) => {
                    crate::builtins::format_string(&fmt, std::slice::from_ref(&arg), line).map(Str)
                }
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Float(x - y * (x / y).floor())),
                    _ => Err(undefined("%", &a, &b)),
                },
            },
            BinOp::Pow => match (left, right) {
                (Int(a), Int(b)) if b >= 0 => u32::try_from(b)
                    .ok()
                    .and_then(|b| a.checked_pow(b))
                    .map(Int)
                    .ok_or_else(overflow),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(Float(x.powf(y))),
                    _ => Err(undefined("**", &a, &b)),
                },
            },
            BinOp::Shl => self.call_method(left, "<<", vec![right], None, line),
        }
    }

    pub(crate) fn index(&mut self, base: Value, args: &[Value], line: usize) -> Result<Value> {
        match (&base, args) {
            (Value::Module(Module::Dir), [pattern]) => {
                self.call_method(base.clone(), "glob", vec![pattern.clone()], None, line)
            }
            (Value::Hash(_), [key]) => Ok(base.hash_get(key).cloned().unwrap_or(Value::Nil)),
            (Value::Array(items), _) => {
                Ok(crate::builtins::slice(items, args, line)?.unwrap_or(Value::Nil))
            }
            (Value::Str(text), [Value::Str(needle)]) => Ok(if text.contains(needle.as_str()) {
                Value::Str(needle.clone())
            } else {
                Value::Nil
            }),
            (Value::Str(text), _) => {
                let chars: Vec<Value> = text.chars().map(|c| Value::Str(c.to_string())).collect();
                Ok(match crate::builtins::slice(&chars, args, line)? {
                    Some(Value::Array(parts)) => Value::Str(crate::builtins::join(&parts, "")),
                    Some(single) => single,
                    None => Value::Nil,
                })
            }
            (Value::Range { .. }, _) => {
                let items = self.iterable(base.clone(), line)?;
                Ok(crate::builtins::slice(&items, args, line)?.unwrap_or(Value::Nil))
            }
            _ => Err(RenderError::eval(
                line,
                format!("undefined method `[]' for {}", base.type_name()),
            )),
        }
    }
}

/// `target[key] = value` for hashes (upsert) and arrays (grows with `nil`).
fn store_at(target: &mut Value, key: Value, value: Value, line: usize) -> Result<()> {
    match target {
        Value::Hash(entries) => {
            if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
            } else {
                entries.push((key, value));
            }
            Ok(())
        }
        Value::Array(items) => {
            let Value::Int(index) = key else {
                return Err(RenderError::eval(
                    line,
                    format!("no implicit conversion of {} into Integer", key.type_name()),
                ));
            };
            let len = items.len() as i64;
            let position = if index < 0 { len + index } else { index };
            if position < 0 {
                return Err(RenderError::eval(
                    line,
                    format!("index {index} too small for array"),
                ));
            }
            if position > MAX_RANGE_ITEMS {
                return Err(RenderError::eval(line, format!("index {index} too large")));
            }
            let position = position as usize;
            if position >= items.len() {
                items.resize(position + 1, Value::Nil);
            }
            items[position] = value;
            Ok(())
        }
        other => Err(RenderError::eval(
            line,
            format!("undefined method `[]=' for {}", other.type_name()),
        )),
    }
}

/// Binds block or loop parameters, spreading a single array argument across
/// several parameters (`|key, value|`).
fn destructure(params: &[String], args: Vec<Value>) -> Vec<(String, Value)> {
    let args = match args.as_slice() {
        [Value::Array(items)] if params.len() > 1 => items.clone(),
        _ => args,
    };
    let mut args = args.into_iter();
    params
        .iter()
        .map(|name| (name.clone(), args.next().unwrap_or(Value::Nil)))
        .collect()
}

pub(crate) fn expand_range(start: i64, end: i64, exclusive: bool, line: usize) -> Result<Vec<Value>> {
    let last = if exclusive { end.saturating_sub(1) } else { end };
    if last.saturating_sub(start) >= MAX_RANGE_ITEMS {
        return Err(RenderError::eval(
            line,
            format!("range {start}..{end} is too large to expand"),
        ));
    }
    Ok(Value::range_items(start, end, exclusive))
}

fn repeat_count(n: i64, unit: usize, line: usize) -> Result<usize> {
    let count = usize::try_from(n)
        .map_err(|_| RenderError::eval(line, format!("negative argument: {n}")))?;
    if count.saturating_mul(unit.max(1)) > MAX_REPEAT_UNITS {
        return Err(RenderError::eval(line, "argument too big"));
    }
    Ok(count)
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder with the sign of the divisor.
fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

//! Methods available on template values and built-in constants

use crate::error::{RenderError, Result};
use crate::fs_utils::{glob_files, read_file_contents, resolve_path};
use crate::interpreter::{Interpreter, MAX_RANGE_ITEMS, MAX_REPEAT_UNITS, expand_range};
use crate::parser::{BinOp, Block};
use crate::value::{Module, Value, ruby_exponent};
use regex::Regex;
use std::cmp::Ordering;
use std::io;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::Chars;

fn no_method(name: &str, recv: &Value, argc: usize, line: usize) -> RenderError {
    let message = if argc == 0 {
        format!("undefined method `{name}' for {}", recv.type_name())
    } else {
        format!(
            "undefined method `{name}' for {} with {argc} argument{}",
            recv.type_name(),
            if argc == 1 { "" } else { "s" }
        )
    };
    RenderError::eval(line, message)
}

fn need_block<'b>(block: Option<&'b Block>, name: &str, line: usize) -> Result<&'b Block> {
    block.ok_or_else(|| RenderError::eval(line, format!("no block given to `{name}'")))
}

fn int_of(value: &Value, line: usize) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(x) => float_to_int(*x, line),
        other => Err(RenderError::eval(
            line,
            format!("no implicit conversion of {} into Integer", other.type_name()),
        )),
    }
}

fn str_of(value: &Value, line: usize) -> Result<&str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RenderError::eval(
            line,
            format!("no implicit conversion of {} into String", other.type_name()),
        )),
    }
}

fn float_to_int(x: f64, line: usize) -> Result<i64> {
    if x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Ok(x.trunc() as i64)
    } else {
        Err(RenderError::eval(line, format!("{x} out of integer range")))
    }
}

fn count_of(n: i64, line: usize) -> Result<usize> {
    usize::try_from(n).map_err(|_| RenderError::eval(line, format!("negative count: {n}")))
}

/// Compiles a pattern argument; plain strings match literally.
pub(crate) fn pattern_regex(value: &Value, line: usize) -> Result<Regex> {
    match value {
        Value::Regex(source) => Ok(Regex::new(source)?),
        Value::Str(text) => Ok(Regex::new(&regex::escape(text))?),
        other => Err(RenderError::eval(
            line,
            format!("wrong argument type {} (expected Regexp)", other.type_name()),
        )),
    }
}

/// Translates `\1`-style back-references into the `regex` crate's syntax.
fn replacement(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    out.push_str(&format!("${{{d}}}"));
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            },
            '$' => out.push_str("$$"),
            c => out.push(c),
        }
    }
    out
}

/// Joins values with `sep`, flattening nested arrays.
pub(crate) fn join(items: &[Value], sep: &str) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        match item {
            Value::Array(inner) => out.push_str(&join(inner, sep)),
            other => out.push_str(&other.to_output()),
        }
    }
    out
}

fn flatten(items: Vec<Value>, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten(inner, out),
            other => out.push(other),
        }
    }
}

/// `items[i]`, `items[start, count]` and `items[range]`.
pub(crate) fn slice(items: &[Value], args: &[Value], line: usize) -> Result<Option<Value>> {
    let len = items.len() as i64;
    let normalize = |i: i64| if i < 0 { i + len } else { i };
    let span = |start: i64, count: i64| {
        if start < 0 || start > len || count < 0 {
            return None;
        }
        let end = start.saturating_add(count).min(len);
        Some(Value::Array(items[start as usize..end as usize].to_vec()))
    };

    match args {
        [Value::Int(index)] => Ok(usize::try_from(normalize(*index))
            .ok()
            .and_then(|i| items.get(i))
            .cloned()),
        [Value::Int(start), Value::Int(count)] => Ok(span(normalize(*start), *count)),
        [
            Value::Range {
                start,
                end,
                exclusive,
            },
        ] => {
            let start = normalize(*start);
            let mut end = normalize(*end);
            if !exclusive {
                end = end.saturating_add(1);
            }
            Ok(span(start, end.saturating_sub(start).max(0)))
        }
        [other, ..] => Err(RenderError::eval(
            line,
            format!("no implicit conversion of {} into Integer", other.type_name()),
        )),
        [] => Err(RenderError::eval(line, "wrong number of arguments (given 0)")),
    }
}

/// Sorts `(key, item)` pairs by key and returns the items.
///
/// Stable merge sort with a fallible comparison, so keys that cannot be
/// compared surface as an evaluation error.
fn sort_pairs(pairs: Vec<(Value, Value)>, line: usize) -> Result<Vec<Value>> {
    Ok(merge_sort(pairs, line)?
        .into_iter()
        .map(|(_, item)| item)
        .collect())
}

fn merge_sort(mut pairs: Vec<(Value, Value)>, line: usize) -> Result<Vec<(Value, Value)>> {
    if pairs.len() < 2 {
        return Ok(pairs);
    }
    let right = merge_sort(pairs.split_off(pairs.len() / 2), line)?;
    let left = merge_sort(pairs, line)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let order = match (left.peek(), right.peek()) {
            (Some((a, _)), Some((b, _))) => a.compare(b).ok_or_else(|| {
                RenderError::eval(
                    line,
                    format!("comparison of {} with {} failed", a.type_name(), b.inspect()),
                )
            })?,
            _ => break,
        };
        let next = if order == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

/// The pair whose key is smallest (`Less`) or largest (`Greater`).
fn extreme(pairs: Vec<(Value, Value)>, want: Ordering, line: usize) -> Result<Value> {
    let mut best: Option<(Value, Value)> = None;
    for (key, item) in pairs {
        let replace = match &best {
            None => true,
            Some((best_key, _)) => {
                key.compare(best_key).ok_or_else(|| {
                    RenderError::eval(
                        line,
                        format!("comparison of {} with {} failed", key.type_name(), best_key.inspect()),
                    )
                })? == want
            }
        };
        if replace {
            best = Some((key, item));
        }
    }
    Ok(best.map_or(Value::Nil, |(_, item)| item))
}

fn keyed(items: Vec<Value>) -> Vec<(Value, Value)> {
    items.into_iter().map(|item| (item.clone(), item)).collect()
}

fn pairs_to_array(entries: Vec<(Value, Value)>) -> Vec<Value> {
    entries
        .into_iter()
        .map(|(k, v)| Value::Array(vec![k, v]))
        .collect()
}

fn upsert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        entries.push((key, value));
    }
}

fn dig(mut current: Value, keys: &[Value], line: usize) -> Result<Value> {
    for key in keys {
        current = match (&current, key) {
            (Value::Nil, _) => return Ok(Value::Nil),
            (Value::Hash(_), _) => current.hash_get(key).cloned().unwrap_or(Value::Nil),
            (Value::Array(items), Value::Int(_)) => {
                slice(items, std::slice::from_ref(key), line)?.unwrap_or(Value::Nil)
            }
            (other, _) => {
                return Err(RenderError::eval(
                    line,
                    format!("{} does not have #dig method", other.type_name()),
                ));
            }
        };
    }
    Ok(current)
}

fn operator(name: &str, line: usize) -> Result<BinOp> {
    Ok(match name {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Rem,
        other => {
            return Err(RenderError::eval(
                line,
                format!("unsupported operator for reduce: {other}"),
            ));
        }
    })
}

fn pad(text: &str, width: i64, fill: &str, align: Ordering, line: usize) -> Result<String> {
    if fill.is_empty() {
        return Err(RenderError::eval(line, "zero width padding"));
    }
    let len = text.chars().count();
    let width = bounded(usize::try_from(width).unwrap_or(0), line)?;
    if width <= len {
        return Ok(text.to_string());
    }
    let total = width - len;
    let (left, right) = match align {
        Ordering::Less => (0, total),
        Ordering::Greater => (total, 0),
        Ordering::Equal => (total / 2, total - total / 2),
    };
    let filler = |n: usize| fill.chars().cycle().take(n).collect::<String>();
    Ok(format!("{}{text}{}", filler(left), filler(right)))
}

/// Leading integer of a string, `0` when there is none.
fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let digits: String = digits
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '_')
        .filter(|c| *c != '_')
        .collect();
    let value = digits.parse::<i64>().unwrap_or(0);
    if negative { -value } else { value }
}

/// Leading float of a string, `0.0` when there is none.
fn leading_float(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    for (i, c) in text.char_indices() {
        let ok = match c {
            '0'..='9' | '_' => true,
            '+' | '-' => i == 0 || text[..i].ends_with(['e', 'E']),
            '.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            'e' | 'E' if !seen_exp && i > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    let candidate: String = text[..end].chars().filter(|c| *c != '_').collect();
    // Shrink until it parses, dropping a dangling `.`, `e` or sign
    let mut candidate = candidate.as_str();
    while !candidate.is_empty() {
        if let Ok(value) = candidate.parse::<f64>() {
            return value;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    0.0
}

fn radix(mut n: i64, base: i64, line: usize) -> Result<String> {
    if !(2..=36).contains(&base) {
        return Err(RenderError::eval(line, format!("invalid radix {base}")));
    }
    if n == 0 {
        return Ok("0".to_string());
    }
    let negative = n < 0;
    let mut digits = Vec::new();
    while n != 0 {
        let d = (n % base).unsigned_abs() as u32;
        digits.push(char::from_digit(d, base as u32).unwrap_or('?'));
        n /= base;
    }
    if negative {
        digits.push('-');
    }
    Ok(digits.into_iter().rev().collect())
}

/// Rejects widths and precisions that would allocate past the repeat limit.
fn bounded(n: usize, line: usize) -> Result<usize> {
    if n > MAX_REPEAT_UNITS {
        return Err(RenderError::eval(line, "argument too big"));
    }
    Ok(n)
}

fn digits(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    value
}

/// `format`/`String#%` with `%s %p %d %i %f %e %x %o %b %%`, flags `- 0 +`,
/// width and precision.
pub(crate) fn format_string(fmt: &str, args: &[Value], line: usize) -> Result<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let (mut left, mut zero, mut plus) = (false, false, false);
        while let Some(flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                '+' => plus = true,
                _ => break,
            }
            chars.next();
        }
        let width = bounded(digits(&mut chars).unwrap_or(0), line)?;
        let precision = if chars.peek() == Some(&'.') {
            chars.next();
            Some(bounded(digits(&mut chars).unwrap_or(0), line)?)
        } else {
            None
        };
        let conversion = chars
            .next()
            .ok_or_else(|| RenderError::eval(line, "incomplete format specifier"))?;
        let arg = args
            .next()
            .ok_or_else(|| RenderError::eval(line, "too few arguments"))?;

        let numeric = matches!(conversion, 'd' | 'i' | 'f' | 'e' | 'x' | 'o' | 'b');
        let mut body = match conversion {
            's' => {
                let text = arg.to_output();
                precision.map_or(text.clone(), |p| text.chars().take(p).collect())
            }
            'p' => arg.inspect(),
            'd' | 'i' => int_of(arg, line)?.to_string(),
            'f' | 'e' => {
                let x = arg.as_f64().ok_or_else(|| {
                    RenderError::eval(line, format!("can't convert {} into Float", arg.type_name()))
                })?;
                let precision = precision.unwrap_or(6);
                if conversion == 'f' {
                    format!("{x:.precision$}")
                } else {
                    ruby_exponent(&format!("{x:.precision$e}"))
                }
            }
            'x' => radix(int_of(arg, line)?, 16, line)?,
            'o' => radix(int_of(arg, line)?, 8, line)?,
            'b' => radix(int_of(arg, line)?, 2, line)?,
            other => {
                return Err(RenderError::eval(
                    line,
                    format!("malformed format string - %{other}"),
                ));
            }
        };
        if plus && numeric && !body.starts_with('-') {
            body.insert(0, '+');
        }

        let len = body.chars().count();
        if len < width {
            let fill = width - len;
            if left {
                body.push_str(&" ".repeat(fill));
            } else if zero && numeric {
                let sign = usize::from(body.starts_with(['-', '+']));
                body.insert_str(sign, &"0".repeat(fill));
            } else {
                body.insert_str(0, &" ".repeat(fill));
            }
        }
        out.push_str(&body);
    }
    Ok(out)
}

impl Interpreter<'_> {
    /// Dispatches `recv.name(args) { block }`.
    pub(crate) fn call_method(
        &mut self,
        recv: Value,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        match (name, args.as_slice()) {
            ("to_s", []) => return Ok(Value::Str(recv.to_output())),
            ("inspect", []) => return Ok(Value::Str(recv.inspect())),
            ("nil?", []) => return Ok(Value::Bool(recv == Value::Nil)),
            ("class", []) => return Ok(Value::Str(recv.type_name().to_string())),
            ("to_json", []) => {
                return Ok(Value::Str(serde_json::to_string(&recv.to_json(line)?)?));
            }
            ("freeze" | "dup" | "clone" | "itself", []) => return Ok(recv),
            ("then" | "yield_self", []) => {
                let block = need_block(block, name, line)?;
                return self.call_block(block, vec![recv]);
            }
            _ => {}
        }

        match recv {
            Value::Module(module) => self.module_method(module, name, args, line),
            Value::Str(text) => self.string_method(text, name, args, block, line),
            Value::Int(n) => self.int_method(n, name, args, block, line),
            Value::Float(x) => float_method(x, name, &args, line),
            Value::Array(items) => self.array_method(items, name, args, block, line),
            Value::Hash(entries) => self.hash_method(entries, name, args, block, line),
            Value::Range {
                start,
                end,
                exclusive,
            } => self.range_method(start, end, exclusive, name, args, block, line),
            Value::Regex(source) => match (name, args.as_slice()) {
                ("source", []) => Ok(Value::Str(source)),
                ("match?", [Value::Str(text)]) => Ok(Value::Bool(Regex::new(&source)?.is_match(text))),
                _ => Err(no_method(name, &Value::Regex(source), args.len(), line)),
            },
            Value::Nil => match (name, args.as_slice()) {
                ("to_a", []) => Ok(Value::Array(Vec::new())),
                ("to_i", []) => Ok(Value::Int(0)),
                ("to_f", []) => Ok(Value::Float(0.0)),
                _ => Err(no_method(name, &Value::Nil, args.len(), line)),
            },
            other => Err(no_method(name, &other, args.len(), line)),
        }
    }

    /// Resolves a path for the existence predicates; an unreachable path is
    /// `None` rather than an error. Escaping the base directory still fails.
    fn lookup_path(&self, path: &str) -> Result<Option<PathBuf>> {
        match resolve_path(path, self.base_dir) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(RenderError::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn module_method(&mut self, module: Module, name: &str, args: Vec<Value>, line: usize) -> Result<Value> {
        let recv = Value::Module(module);
        match (module, name, args.as_slice()) {
            (Module::File, "read", [Value::Str(path)]) => {
                let resolved = resolve_path(path, self.base_dir)?;
                tracing::debug!(path = %resolved.display(), "template reads file");
                read_file_contents(&resolved).map(Value::Str)
            }
            (Module::File, "readlines", [Value::Str(path)]) => {
                let contents = read_file_contents(&resolve_path(path, self.base_dir)?)?;
                Ok(Value::Array(
                    contents
                        .split_inclusive('\n')
                        .map(|l| Value::Str(l.to_string()))
                        .collect(),
                ))
            }
            (Module::File, "exist?" | "exists?", [Value::Str(path)]) => {
                Ok(Value::Bool(self.lookup_path(path)?.is_some_and(|p| p.exists())))
            }
            (Module::File, "file?", [Value::Str(path)]) => {
                Ok(Value::Bool(self.lookup_path(path)?.is_some_and(|p| p.is_file())))
            }
            (Module::File | Module::Dir, "directory?" | "exist?", [Value::Str(path)]) => {
                Ok(Value::Bool(self.lookup_path(path)?.is_some_and(|p| p.is_dir())))
            }
            (Module::File, "basename", [Value::Str(path)]) => Ok(Value::Str(basename(path).to_string())),
            (Module::File, "basename", [Value::Str(path), Value::Str(ext)]) => {
                let base = basename(path);
                let stripped = if ext == ".*" {
                    base.rfind('.')
                        .filter(|&i| i > 0)
                        .map_or(base, |i| &base[..i])
                } else {
                    base.strip_suffix(ext.as_str())
                        .filter(|rest| !rest.is_empty())
                        .unwrap_or(base)
                };
                Ok(Value::Str(stripped.to_string()))
            }
            (Module::File, "extname", [Value::Str(path)]) => {
                let base = basename(path);
                Ok(Value::Str(
                    base.rfind('.')
                        .filter(|&i| i > 0 && i + 1 < base.len())
                        .map_or("", |i| &base[i..])
                        .to_string(),
                ))
            }
            (Module::File, "dirname", [Value::Str(path)]) => {
                let trimmed = path.trim_end_matches('/');
                Ok(Value::Str(
                    match trimmed.rfind('/') {
                        None if path.starts_with('/') => "/",
                        None => ".",
                        Some(0) => "/",
                        Some(i) => &trimmed[..i],
                    }
                    .to_string(),
                ))
            }
            (Module::File, "join", parts) => {
                let mut flat = Vec::new();
                flatten(parts.to_vec(), &mut flat);
                let mut joined = String::new();
                for (i, part) in flat.iter().enumerate() {
                    let part = str_of(part, line)?;
                    if i == 0 {
                        joined.push_str(part);
                    } else {
                        let part = part.trim_start_matches('/');
                        if !joined.ends_with('/') {
                            joined.push('/');
                        }
                        joined.push_str(part);
                    }
                }
                Ok(Value::Str(joined))
            }
            (Module::Dir, "glob" | "[]", [patterns]) => {
                let patterns = match patterns {
                    Value::Array(items) => items.clone(),
                    single => vec![single.clone()],
                };
                let mut matches = Vec::new();
                for pattern in &patterns {
                    matches.extend(glob_files(str_of(pattern, line)?, self.base_dir)?);
                }
                matches.sort();
                matches.dedup();
                Ok(Value::Array(matches.into_iter().map(Value::Str).collect()))
            }
            (Module::Yaml, "load_file" | "safe_load_file", [Value::Str(path)] | [Value::Str(path), Value::Hash(_)]) => {
                let contents = read_file_contents(&resolve_path(path, self.base_dir)?)?;
                let yaml: serde_yaml::Value = serde_yaml::from_str(&contents)?;
                Ok(Value::from(yaml))
            }
            (Module::Yaml, "load" | "safe_load", [Value::Str(text)] | [Value::Str(text), Value::Hash(_)]) => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
                Ok(Value::from(yaml))
            }
            (Module::Yaml, "dump", [value]) => {
                let body = serde_yaml::to_string(&value.to_json(line)?)?;
                Ok(Value::Str(format!("---\n{body}")))
            }
            (Module::Json, "parse", [Value::Str(text)] | [Value::Str(text), Value::Hash(_)]) => {
                let json: serde_json::Value = serde_json::from_str(text)?;
                Ok(Value::from(json))
            }
            (Module::Json, "generate" | "dump", [value]) => {
                Ok(Value::Str(serde_json::to_string(&value.to_json(line)?)?))
            }
            (Module::Json, "pretty_generate", [value]) => {
                Ok(Value::Str(serde_json::to_string_pretty(&value.to_json(line)?)?))
            }
            _ => Err(no_method(name, &recv, args.len(), line)),
        }
    }

    fn string_method(
        &mut self,
        text: String,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        let s = text.as_str();
        let string = |value: String| Ok(Value::Str(value));
        let strings = |parts: Vec<&str>| {
            Ok(Value::Array(
                parts.into_iter().map(|p| Value::Str(p.to_string())).collect(),
            ))
        };

        match (name, args.as_slice()) {
            ("length" | "size", []) => Ok(Value::Int(s.chars().count() as i64)),
            ("bytesize", []) => Ok(Value::Int(s.len() as i64)),
            ("empty?", []) => Ok(Value::Bool(s.is_empty())),
            ("upcase", []) => string(s.to_uppercase()),
            ("downcase", []) => string(s.to_lowercase()),
            ("capitalize", []) => {
                let mut chars = s.chars();
                string(chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect()
                }))
            }
            ("strip", []) => string(s.trim().to_string()),
            ("lstrip", []) => string(s.trim_start().to_string()),
            ("rstrip", []) => string(s.trim_end().to_string()),
            ("chomp", []) => string(
                s.strip_suffix("\r\n")
                    .or_else(|| s.strip_suffix('\n'))
                    .or_else(|| s.strip_suffix('\r'))
                    .unwrap_or(s)
                    .to_string(),
            ),
            ("chomp", [Value::Str(suffix)]) => {
                string(s.strip_suffix(suffix.as_str()).unwrap_or(s).to_string())
            }
            ("reverse", []) => string(s.chars().rev().collect()),
            ("lines", []) => strings(s.split_inclusive('\n').collect()),
            ("chars", []) => Ok(Value::Array(
                s.chars().map(|c| Value::Str(c.to_string())).collect(),
            )),
            ("split", []) => strings(s.split_whitespace().collect()),
            ("split", [Value::Str(sep)]) if sep == " " => strings(s.split_whitespace().collect()),
            ("split", [pattern]) => {
                let regex = pattern_regex(pattern, line)?;
                let mut parts: Vec<&str> = if regex.as_str().is_empty() {
                    s.char_indices().map(|(i, c)| &s[i..i + c.len_utf8()]).collect()
                } else {
                    regex.split(s).collect()
                };
                while parts.last().is_some_and(|p| p.is_empty()) {
                    parts.pop();
                }
                strings(parts)
            }
            ("split", [pattern, Value::Int(limit)]) if *limit > 0 => {
                let regex = pattern_regex(pattern, line)?;
                strings(regex.splitn(s, count_of(*limit, line)?).collect())
            }
            ("start_with?", prefixes) if !prefixes.is_empty() => {
                for prefix in prefixes {
                    if s.starts_with(str_of(prefix, line)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ("end_with?", suffixes) if !suffixes.is_empty() => {
                for suffix in suffixes {
                    if s.ends_with(str_of(suffix, line)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ("include?", [Value::Str(needle)]) => Ok(Value::Bool(s.contains(needle.as_str()))),
            ("index", [pattern]) => Ok(pattern_regex(pattern, line)?
                .find(s)
                .map_or(Value::Nil, |m| Value::Int(s[..m.start()].chars().count() as i64))),
            ("match?", [pattern]) => Ok(Value::Bool(pattern_regex(pattern, line)?.is_match(s))),
            ("=~", [pattern]) => self.binary(BinOp::Match, Value::Str(text.clone()), pattern.clone(), line),
            ("scan", [pattern]) => {
                let regex = pattern_regex(pattern, line)?;
                let found = regex
                    .captures_iter(s)
                    .map(|caps| {
                        if caps.len() == 1 {
                            Value::Str(caps[0].to_string())
                        } else {
                            Value::Array(
                                caps.iter()
                                    .skip(1)
                                    .map(|g| g.map_or(Value::Nil, |m| Value::Str(m.as_str().to_string())))
                                    .collect(),
                            )
                        }
                    })
                    .collect();
                Ok(Value::Array(found))
            }
            ("sub" | "gsub", [pattern, Value::Str(with)]) => {
                let regex = pattern_regex(pattern, line)?;
                let with = replacement(with);
                string(if name == "sub" {
                    regex.replace(s, with.as_str()).into_owned()
                } else {
                    regex.replace_all(s, with.as_str()).into_owned()
                })
            }
            ("sub" | "gsub", [pattern]) => {
                let block = need_block(block, name, line)?;
                let regex = pattern_regex(pattern, line)?;
                let mut out = String::with_capacity(s.len());
                let mut last = 0;
                for m in regex.find_iter(s) {
                    out.push_str(&s[last..m.start()]);
                    let replaced = self.call_block(block, vec![Value::Str(m.as_str().to_string())])?;
                    out.push_str(&replaced.to_output());
                    last = m.end();
                    if name == "sub" {
                        break;
                    }
                }
                out.push_str(&s[last..]);
                string(out)
            }
            ("ljust", [Value::Int(width)]) => string(pad(s, *width, " ", Ordering::Less, line)?),
            ("ljust", [Value::Int(width), Value::Str(fill)]) => {
                string(pad(s, *width, fill, Ordering::Less, line)?)
            }
            ("rjust", [Value::Int(width)]) => string(pad(s, *width, " ", Ordering::Greater, line)?),
            ("rjust", [Value::Int(width), Value::Str(fill)]) => {
                string(pad(s, *width, fill, Ordering::Greater, line)?)
            }
            ("center", [Value::Int(width)]) => string(pad(s, *width, " ", Ordering::Equal, line)?),
            ("center", [Value::Int(width), Value::Str(fill)]) => {
                string(pad(s, *width, fill, Ordering::Equal, line)?)
            }
            ("to_i", []) => Ok(Value::Int(leading_int(s))),
            ("to_f", []) => Ok(Value::Float(leading_float(s))),
            ("to_str" | "to_sym", []) => Ok(Value::Str(text)),
            ("each_line", []) => {
                let block = need_block(block, name, line)?;
                for l in s.split_inclusive('\n') {
                    self.call_block(block, vec![Value::Str(l.to_string())])?;
                }
                Ok(Value::Str(text))
            }
            ("each_char", []) => {
                let block = need_block(block, name, line)?;
                for c in s.chars() {
                    self.call_block(block, vec![Value::Str(c.to_string())])?;
                }
                Ok(Value::Str(text))
            }
            ("slice" | "[]", _) => self.index(Value::Str(text), &args, line),
            ("+", [other]) => self.binary(BinOp::Add, Value::Str(text), other.clone(), line),
            ("*", [other]) => self.binary(BinOp::Mul, Value::Str(text), other.clone(), line),
            ("%", [other]) => self.binary(BinOp::Rem, Value::Str(text), other.clone(), line),
            ("<<" | "concat", [other]) => string(text + &other.to_output()),
            _ => Err(no_method(name, &Value::Str(text), args.len(), line)),
        }
    }

    fn int_method(
        &mut self,
        n: i64,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        let overflow = || RenderError::eval(line, "integer overflow");
        match (name, args.as_slice()) {
            ("to_i" | "to_int" | "round" | "floor" | "ceil" | "truncate", []) => Ok(Value::Int(n)),
            ("to_f", []) => Ok(Value::Float(n as f64)),
            ("to_s", [Value::Int(base)]) => Ok(Value::Str(radix(n, *base, line)?)),
            ("abs", []) => n.checked_abs().map(Value::Int).ok_or_else(overflow),
            ("succ" | "next", []) => n.checked_add(1).map(Value::Int).ok_or_else(overflow),
            ("pred", []) => n.checked_sub(1).map(Value::Int).ok_or_else(overflow),
            ("zero?", []) => Ok(Value::Bool(n == 0)),
            ("even?", []) => Ok(Value::Bool(n % 2 == 0)),
            ("odd?", []) => Ok(Value::Bool(n % 2 != 0)),
            ("positive?", []) => Ok(Value::Bool(n > 0)),
            ("negative?", []) => Ok(Value::Bool(n < 0)),
            ("between?", [low, high]) => Ok(Value::Bool(
                Value::Int(n).compare(low).is_some_and(Ordering::is_ge)
                    && Value::Int(n).compare(high).is_some_and(Ordering::is_le),
            )),
            ("clamp", [Value::Int(low), Value::Int(high)]) if low <= high => {
                Ok(Value::Int(n.clamp(*low, *high)))
            }
            ("times", []) => {
                let items = expand_range(0, n, true, line)?;
                match block {
                    Some(block) => {
                        for item in items {
                            self.call_block(block, vec![item])?;
                        }
                        Ok(Value::Int(n))
                    }
                    None => Ok(Value::Array(items)),
                }
            }
            ("upto" | "downto", [Value::Int(limit)]) => {
                let block = need_block(block, name, line)?;
                let mut items = if name == "upto" {
                    expand_range(n, *limit, false, line)?
                } else {
                    expand_range(*limit, n, false, line)?
                };
                if name == "downto" {
                    items.reverse();
                }
                for item in items {
                    self.call_block(block, vec![item])?;
                }
                Ok(Value::Int(n))
            }
            ("+", [other]) => self.binary(BinOp::Add, Value::Int(n), other.clone(), line),
            ("-", [other]) => self.binary(BinOp::Sub, Value::Int(n), other.clone(), line),
            ("*", [other]) => self.binary(BinOp::Mul, Value::Int(n), other.clone(), line),
            ("fdiv", [other]) => match other.as_f64() {
                Some(d) => Ok(Value::Float(n as f64 / d)),
                None => Err(no_method(name, &Value::Int(n), 1, line)),
            },
            _ => Err(no_method(name, &Value::Int(n), args.len(), line)),
        }
    }

    fn array_method(
        &mut self,
        items: Vec<Value>,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        match (name, args.as_slice(), block) {
            ("length" | "size", [], None) => Ok(Value::Int(items.len() as i64)),
            ("count", [], None) => Ok(Value::Int(items.len() as i64)),
            ("count", [needle], None) => Ok(Value::Int(
                items.iter().filter(|item| item.loose_eq(needle)).count() as i64,
            )),
            ("count", [], Some(block)) => {
                let mut count = 0;
                for item in items {
                    if self.call_block(block, vec![item])?.truthy() {
                        count += 1;
                    }
                }
                Ok(Value::Int(count))
            }
            ("empty?", [], None) => Ok(Value::Bool(items.is_empty())),
            ("any?", [], None) => Ok(Value::Bool(items.iter().any(Value::truthy))),
            ("all?", [], None) => Ok(Value::Bool(items.iter().all(Value::truthy))),
            ("none?", [], None) => Ok(Value::Bool(!items.iter().any(Value::truthy))),
            ("any?" | "all?" | "none?", [], Some(block)) => {
                let mut hits = 0;
                let total = items.len();
                for item in items {
                    if self.call_block(block, vec![item])?.truthy() {
                        hits += 1;
                        if name != "all?" {
                            break;
                        }
                    } else if name == "all?" {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(match name {
                    "any?" => hits > 0,
                    "none?" => hits == 0,
                    _ => hits == total,
                }))
            }
            ("first", [], None) => Ok(items.into_iter().next().unwrap_or(Value::Nil)),
            ("last", [], None) => Ok(items.into_iter().next_back().unwrap_or(Value::Nil)),
            ("first" | "take", [Value::Int(n)], None) => {
                let n = count_of(*n, line)?;
                Ok(Value::Array(items.into_iter().take(n).collect()))
            }
            ("last", [Value::Int(n)], None) => {
                let n = count_of(*n, line)?;
                let skip = items.len().saturating_sub(n);
                Ok(Value::Array(items.into_iter().skip(skip).collect()))
            }
            ("drop", [Value::Int(n)], None) => {
                let n = count_of(*n, line)?;
                Ok(Value::Array(items.into_iter().skip(n).collect()))
            }
            ("join", [], None) => Ok(Value::Str(join(&items, ""))),
            ("join", [Value::Str(sep)], None) => Ok(Value::Str(join(&items, sep))),
            ("include?" | "member?", [needle], None) => {
                Ok(Value::Bool(items.iter().any(|item| item.loose_eq(needle))))
            }
            ("index" | "find_index", [needle], None) => Ok(items
                .iter()
                .position(|item| item.loose_eq(needle))
                .map_or(Value::Nil, |i| Value::Int(i as i64))),
            ("index" | "find_index", [], Some(block)) => {
                for (i, item) in items.into_iter().enumerate() {
                    if self.call_block(block, vec![item])?.truthy() {
                        return Ok(Value::Int(i as i64));
                    }
                }
                Ok(Value::Nil)
            }
            ("reverse", [], None) => Ok(Value::Array(items.into_iter().rev().collect())),
            ("sort", [], None) => Ok(Value::Array(sort_pairs(keyed(items), line)?)),
            ("sort_by" | "min_by" | "max_by", [], Some(block)) => {
                let mut pairs = Vec::with_capacity(items.len());
                for item in items {
                    pairs.push((self.call_block(block, vec![item.clone()])?, item));
                }
                match name {
                    "sort_by" => Ok(Value::Array(sort_pairs(pairs, line)?)),
                    "min_by" => extreme(pairs, Ordering::Less, line),
                    _ => extreme(pairs, Ordering::Greater, line),
                }
            }
            ("min", [], None) => extreme(keyed(items), Ordering::Less, line),
            ("max", [], None) => extreme(keyed(items), Ordering::Greater, line),
            ("sum", [], None) => self.sum(items, Value::Int(0), line),
            ("sum", [init], None) => self.sum(items, init.clone(), line),
            ("sum", [], Some(block)) => {
                let mapped = self.map_items(items, block)?;
                self.sum(mapped, Value::Int(0), line)
            }
            ("uniq", [], None) => {
                let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Ok(Value::Array(unique))
            }
            ("compact", [], None) => Ok(Value::Array(
                items.into_iter().filter(|item| *item != Value::Nil).collect(),
            )),
            ("flatten", [], None) => {
                let mut flat = Vec::with_capacity(items.len());
                flatten(items, &mut flat);
                Ok(Value::Array(flat))
            }
            ("push" | "append" | "<<", extra, None) if !extra.is_empty() => {
                let mut items = items;
                items.extend(args);
                Ok(Value::Array(items))
            }
            ("unshift", extra, None) if !extra.is_empty() => {
                let mut front = args;
                front.extend(items);
                Ok(Value::Array(front))
            }
            ("concat", others, None) => {
                let mut items = items;
                for other in others {
                    match other {
                        Value::Array(more) => items.extend(more.iter().cloned()),
                        other => {
                            return Err(RenderError::eval(
                                line,
                                format!("no implicit conversion of {} into Array", other.type_name()),
                            ));
                        }
                    }
                }
                Ok(Value::Array(items))
            }
            ("+" | "-" | "*", [other], None) => {
                let op = operator(name, line)?;
                self.binary(op, Value::Array(items), other.clone(), line)
            }
            ("each", [], Some(block)) => {
                for item in items.iter().cloned() {
                    self.call_block(block, vec![item])?;
                }
                Ok(Value::Array(items))
            }
            ("each_with_index", [], Some(block)) => {
                for (i, item) in items.iter().cloned().enumerate() {
                    self.call_block(block, vec![item, Value::Int(i as i64)])?;
                }
                Ok(Value::Array(items))
            }
            ("map" | "collect", [], Some(block)) => self.map_items(items, block).map(Value::Array),
            ("map_with_index" | "each_with_index_map", [], Some(block)) => {
                let mut mapped = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    mapped.push(self.call_block(block, vec![item, Value::Int(i as i64)])?);
                }
                Ok(Value::Array(mapped))
            }
            ("flat_map", [], Some(block)) => {
                let mut flat = Vec::new();
                for item in items {
                    match self.call_block(block, vec![item])? {
                        Value::Array(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                Ok(Value::Array(flat))
            }
            ("select" | "filter" | "reject", [], Some(block)) => {
                let keep_truthy = name != "reject";
                let mut kept = Vec::new();
                for item in items {
                    if self.call_block(block, vec![item.clone()])?.truthy() == keep_truthy {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            ("partition", [], Some(block)) => {
                let (mut yes, mut no) = (Vec::new(), Vec::new());
                for item in items {
                    if self.call_block(block, vec![item.clone()])?.truthy() {
                        yes.push(item);
                    } else {
                        no.push(item);
                    }
                }
                Ok(Value::Array(vec![Value::Array(yes), Value::Array(no)]))
            }
            ("find" | "detect", [], Some(block)) => {
                for item in items {
                    if self.call_block(block, vec![item.clone()])?.truthy() {
                        return Ok(item);
                    }
                }
                Ok(Value::Nil)
            }
            ("group_by", [], Some(block)) => {
                let mut groups: Vec<(Value, Value)> = Vec::new();
                for item in items {
                    let key = self.call_block(block, vec![item.clone()])?;
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, Value::Array(members))) => members.push(item),
                        _ => groups.push((key, Value::Array(vec![item]))),
                    }
                }
                Ok(Value::Hash(groups))
            }
            ("tally", [], None) => {
                let mut counts: Vec<(Value, Value)> = Vec::new();
                for item in items {
                    match counts.iter_mut().find(|(k, _)| *k == item) {
                        Some((_, Value::Int(count))) => *count += 1,
                        _ => counts.push((item, Value::Int(1))),
                    }
                }
                Ok(Value::Hash(counts))
            }
            ("each_slice", [Value::Int(size)], _) => {
                let size = count_of(*size, line)?;
                if size == 0 {
                    return Err(RenderError::eval(line, "invalid slice size"));
                }
                let slices: Vec<Value> = items.chunks(size).map(|c| Value::Array(c.to_vec())).collect();
                match block {
                    Some(block) => {
                        for chunk in slices {
                            self.call_block(block, vec![chunk])?;
                        }
                        Ok(Value::Nil)
                    }
                    None => Ok(Value::Array(slices)),
                }
            }
            ("inject" | "reduce", _, _) => self.reduce(items, args, block, line),
            ("zip", [Value::Array(other)], None) => Ok(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Value::Array(vec![item, other.get(i).cloned().unwrap_or(Value::Nil)]))
                    .collect(),
            )),
            ("to_a" | "entries", [], None) => Ok(Value::Array(items)),
            ("to_h", [], None) => {
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Array(pair) if pair.len() == 2 => {
                            let mut pair = pair.into_iter();
                            if let (Some(k), Some(v)) = (pair.next(), pair.next()) {
                                upsert(&mut entries, k, v);
                            }
                        }
                        other => {
                            return Err(RenderError::eval(
                                line,
                                format!("wrong element type {} (expected array of 2)", other.type_name()),
                            ));
                        }
                    }
                }
                Ok(Value::Hash(entries))
            }
            ("dig", keys, None) if !keys.is_empty() => dig(Value::Array(items), keys, line),
            ("slice" | "[]", _, None) => self.index(Value::Array(items), &args, line),
            _ => Err(no_method(name, &Value::Array(items), args.len(), line)),
        }
    }

    fn map_items(&mut self, items: Vec<Value>, block: &Block) -> Result<Vec<Value>> {
        items
            .into_iter()
            .map(|item| self.call_block(block, vec![item]))
            .collect()
    }

    fn sum(&mut self, items: Vec<Value>, init: Value, line: usize) -> Result<Value> {
        let mut total = init;
        for item in items {
            total = self.binary(BinOp::Add, total, item, line)?;
        }
        Ok(total)
    }

    fn reduce(
        &mut self,
        items: Vec<Value>,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        let mut args = args.into_iter();
        let (init, op) = match (args.len(), block) {
            (0, Some(_)) => (None, None),
            (1, Some(_)) => (args.next(), None),
            (1, None) => (None, args.next()),
            (2, None) => (args.next(), args.next()),
            (given, _) => {
                return Err(RenderError::eval(
                    line,
                    format!("wrong number of arguments to reduce (given {given})"),
                ));
            }
        };
        let op = op
            .map(|op| str_of(&op, line).and_then(|name| operator(name, line)))
            .transpose()?;

        let mut items = items.into_iter();
        let Some(mut acc) = init.or_else(|| items.next()) else {
            return Ok(Value::Nil);
        };
        for item in items {
            acc = match (op, block) {
                (Some(op), _) => self.binary(op, acc, item, line)?,
                (None, Some(block)) => self.call_block(block, vec![acc, item])?,
                (None, None) => return Err(RenderError::eval(line, "no block given to `reduce'")),
            };
        }
        Ok(acc)
    }

    fn hash_method(
        &mut self,
        entries: Vec<(Value, Value)>,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        match (name, args.as_slice(), block) {
            ("keys", [], None) => Ok(Value::Array(entries.into_iter().map(|(k, _)| k).collect())),
            ("values", [], None) => Ok(Value::Array(entries.into_iter().map(|(_, v)| v).collect())),
            ("length" | "size" | "count", [], None) => Ok(Value::Int(entries.len() as i64)),
            ("empty?", [], None) => Ok(Value::Bool(entries.is_empty())),
            ("key?" | "has_key?" | "include?" | "member?", [key], None) => {
                Ok(Value::Bool(entries.iter().any(|(k, _)| k == key)))
            }
            ("value?" | "has_value?", [value], None) => {
                Ok(Value::Bool(entries.iter().any(|(_, v)| v.loose_eq(value))))
            }
            ("fetch", [key, rest @ ..], _) if rest.len() <= 1 => {
                if let Some((_, value)) = entries.iter().find(|(k, _)| k == key) {
                    return Ok(value.clone());
                }
                match (rest, block) {
                    ([default], _) => Ok(default.clone()),
                    ([], Some(block)) => self.call_block(block, vec![key.clone()]),
                    _ => Err(RenderError::eval(line, format!("key not found: {}", key.inspect()))),
                }
            }
            ("dig", keys, None) if !keys.is_empty() => dig(Value::Hash(entries), keys, line),
            ("[]", [key], None) => Ok(Value::Hash(entries).hash_get(key).cloned().unwrap_or(Value::Nil)),
            ("to_h", [], None) => Ok(Value::Hash(entries)),
            ("merge", others, None) => {
                let mut merged = entries;
                for other in others {
                    let Value::Hash(more) = other else {
                        return Err(RenderError::eval(
                            line,
                            format!("no implicit conversion of {} into Hash", other.type_name()),
                        ));
                    };
                    for (k, v) in more {
                        upsert(&mut merged, k.clone(), v.clone());
                    }
                }
                Ok(Value::Hash(merged))
            }
            ("each" | "each_pair", [], Some(block)) => {
                for (k, v) in entries.iter().cloned() {
                    self.call_block(block, vec![Value::Array(vec![k, v])])?;
                }
                Ok(Value::Hash(entries))
            }
            ("select" | "filter" | "reject", [], Some(block)) => {
                let keep_truthy = name != "reject";
                let mut kept = Vec::new();
                for (k, v) in entries {
                    let pair = Value::Array(vec![k.clone(), v.clone()]);
                    if self.call_block(block, vec![pair])?.truthy() == keep_truthy {
                        kept.push((k, v));
                    }
                }
                Ok(Value::Hash(kept))
            }
            ("transform_values" | "transform_keys", [], Some(block)) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    if name == "transform_values" {
                        let v = self.call_block(block, vec![v])?;
                        out.push((k, v));
                    } else {
                        let k = self.call_block(block, vec![k])?;
                        upsert(&mut out, k, v);
                    }
                }
                Ok(Value::Hash(out))
            }
            // Everything else treats the hash as a list of `[key, value]` pairs
            _ => self.array_method(pairs_to_array(entries), name, args, block, line),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn range_method(
        &mut self,
        start: i64,
        end: i64,
        exclusive: bool,
        name: &str,
        args: Vec<Value>,
        block: Option<&Block>,
        line: usize,
    ) -> Result<Value> {
        let last = if exclusive { end.saturating_sub(1) } else { end };
        let empty = last < start;
        match (name, args.as_slice(), block) {
            ("first" | "begin", [], None) => Ok(Value::Int(start)),
            ("last" | "end", [], None) => Ok(Value::Int(end)),
            ("min", [], None) => Ok(if empty { Value::Nil } else { Value::Int(start) }),
            ("max", [], None) => Ok(if empty { Value::Nil } else { Value::Int(last) }),
            ("size" | "count", [], None) => Ok(Value::Int(if empty {
                0
            } else {
                last.saturating_sub(start).saturating_add(1)
            })),
            ("include?" | "member?" | "cover?", [value], None) => {
                let Some(x) = value.as_f64() else {
                    return Ok(Value::Bool(false));
                };
                let below_end = if exclusive { x < end as f64 } else { x <= end as f64 };
                Ok(Value::Bool(x >= start as f64 && below_end))
            }
            ("sum", [], None) if !empty && last.saturating_sub(start) >= MAX_RANGE_ITEMS => {
                // Arithmetic series, no expansion needed
                let n = i128::from(last) - i128::from(start) + 1;
                let total = (i128::from(start) + i128::from(last)) * n / 2;
                i64::try_from(total)
                    .map(Value::Int)
                    .map_err(|_| RenderError::eval(line, "integer overflow"))
            }
            _ => {
                let items = expand_range(start, end, exclusive, line)?;
                let result = self.array_method(items, name, args, block, line)?;
                Ok(if name == "each" {
                    Value::Range {
                        start,
                        end,
                        exclusive,
                    }
                } else {
                    result
                })
            }
        }
    }
}

fn float_method(x: f64, name: &str, args: &[Value], line: usize) -> Result<Value> {
    match (name, args) {
        ("to_f", []) => Ok(Value::Float(x)),
        ("to_i" | "to_int" | "truncate", []) => float_to_int(x, line).map(Value::Int),
        ("round", []) => float_to_int(x.round(), line).map(Value::Int),
        ("round", [Value::Int(digits)]) if *digits > 0 => {
            let factor = 10f64.powi(i32::try_from(*digits).unwrap_or(i32::MAX).min(15));
            Ok(Value::Float((x * factor).round() / factor))
        }
        ("round", [Value::Int(_)]) => float_to_int(x.round(), line).map(Value::Int),
        ("floor", []) => float_to_int(x.floor(), line).map(Value::Int),
        ("ceil", []) => float_to_int(x.ceil(), line).map(Value::Int),
        ("abs", []) => Ok(Value::Float(x.abs())),
        ("zero?", []) => Ok(Value::Bool(x == 0.0)),
        ("positive?", []) => Ok(Value::Bool(x > 0.0)),
        ("negative?", []) => Ok(Value::Bool(x < 0.0)),
        ("nan?", []) => Ok(Value::Bool(x.is_nan())),
        ("finite?", []) => Ok(Value::Bool(x.is_finite())),
        ("infinite?", []) => Ok(if x.is_infinite() {
            Value::Int(if x > 0.0 { 1 } else { -1 })
        } else {
            Value::Nil
        }),
        _ => Err(no_method(name, &Value::Float(x), args.len(), line)),
    }
}

fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "" } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::scanner::{TrimMode, scan};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn render_in(template: &str, base: &Path) -> Result<String> {
        let segments = scan(template, TrimMode::Dash)?;
        let program = parse(tokenize(&segments)?)?;
        Interpreter::new(base).run(&program)
    }

    fn render(template: &str) -> String {
        render_in(template, Path::new(".")).unwrap()
    }

    fn render_err(template: &str) -> RenderError {
        render_in(template, Path::new(".")).unwrap_err()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(render("<%= \"  MiXed  \".strip.downcase.capitalize %>"), "Mixed");
        assert_eq!(render("<%= \"line\\n\".chomp %>|<%= \"abc\".reverse %>"), "line|cba");
        assert_eq!(render("<%= \"héllo\".length %> <%= \"héllo\".upcase %>"), "5 HÉLLO");
        assert_eq!(render("<%= \"a,b,,c,,\".split(\",\").inspect %>"), "[\"a\", \"b\", \"\", \"c\"]");
        assert_eq!(render("<%= \" one  two \".split.inspect %>"), "[\"one\", \"two\"]");
        assert_eq!(render("<%= \"a1b22\".split(/\\d+/).inspect %>"), "[\"a\", \"b\"]");
        assert_eq!(render("<%= \"a\\nb\\n\".lines.inspect %>"), "[\"a\\n\", \"b\\n\"]");
        assert_eq!(
            render("<%= \"file.rs\".end_with?(\".py\", \".rs\") %> <%= \"abc\".start_with?(\"b\") %>"),
            "true false"
        );
        assert_eq!(render("<%= \"ab\".ljust(4, \".\") %>|<%= \"ab\".rjust(4) %>|<%= \"ab\".center(6, \"*\") %>"), "ab..|  ab|**ab**");
        assert_eq!(render("<%= \"12abc\".to_i + \" 3.5x\".to_f %>"), "15.5");
        assert_eq!(render("<%= \"x\".to_i %>"), "0");
    }

    #[test]
    fn test_sub_and_gsub() {
        assert_eq!(render("<%= \"a.b.c\".gsub(\".\", \"-\") %>"), "a-b-c");
        assert_eq!(render("<%= \"a.b.c\".sub(\".\", \"-\") %>"), "a-b.c");
        assert_eq!(
            render("<%= \"v1.2\".gsub(/(\\d+)/, \"<\\\\1>\") %>"),
            "v<1>.<2>"
        );
        assert_eq!(render("<%= \"cost\".gsub(/o/, \"$\") %>"), "c$st");
        assert_eq!(render("<%= \"abc\".gsub(/[ac]/) { |m| m.upcase } %>"), "AbC");
        assert_eq!(render("<%= \"x1y2\".scan(/\\d/).inspect %>"), "[\"1\", \"2\"]");
        assert_eq!(render("<%= (\"ab\" =~ /b/).inspect %> <%= \"ab\".match?(/z/) %>"), "1 false");
    }

    #[test]
    fn test_numeric_methods() {
        assert_eq!(render("<%= 3.7.round %> <%= 3.14159.round(2) %> <%= (-3.5).floor %>"), "4 3.14 -4");
        assert_eq!(render("<%= 2.5.ceil %> <%= (-7).abs %> <%= 4.even? %> <%= 4.odd? %>"), "3 7 true false");
        assert_eq!(render("<%= 255.to_s(16) %> <%= 10.to_f %> <%= 0.zero? %>"), "ff 10.0 true");
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(render("<%= [3, 1, 2].sort.inspect %> <%= [3, 1, 2].max %> <%= [].min.inspect %>"), "[1, 2, 3] 3 nil");
        assert_eq!(render("<%= [1, [2, [nil, 3]]].flatten.compact.inspect %>"), "[1, 2, 3]");
        assert_eq!(render("<%= [1, 1, 2].uniq.sum %> <%= [1.5, 2].sum %>"), "3 3.5");
        assert_eq!(render("<%= [\"b\", \"a\"].join(\", \") %> <%= [1, [2, 3]].join(\"-\") %>"), "b, a 1-2-3");
        assert_eq!(render("<%= [1, 2, 3, 4].select { |x| x.even? }.map { |x| x * 10 }.inspect %>"), "[20, 40]");
        assert_eq!(render("<%= [1, 2, 3].reject { |x| x.odd? }.inspect %>"), "[2]");
        assert_eq!(render("<%= [\"bb\", \"a\", \"ccc\"].sort_by { |s| s.length }.first %>"), "a");
        assert_eq!(render("<%= [1, 2, 3].find { |x| x > 1 } %> <%= [1, 2].any? { |x| x > 1 } %> <%= [1, 2].all? { |x| x > 1 } %>"), "2 true false");
        assert_eq!(render("<%= [1, 2, 3].count { |x| x > 1 } %> <%= [1, 2, 3].index(3) %>"), "2 2");
        assert_eq!(render("<%= [1, 2, 3].inject(:+) %> <%= [1, 2, 3].reduce(10) { |acc, x| acc + x } %>"), "6 16");
        assert_eq!(render("<%= [1, 2, 3, 4, 5].each_slice(2).inspect %>"), "[[1, 2], [3, 4], [5]]");
        assert_eq!(render("<%= [\"a\", \"bb\", \"cc\"].group_by { |s| s.size } %>"), "{1 => [\"a\"], 2 => [\"bb\", \"cc\"]}");
        assert_eq!(render("<%= [1, 2, 3].first(2).inspect %> <%= [1, 2, 3].last %>"), "[1, 2] 3");
    }

    #[test]
    fn test_incomparable_sort_fails() {
        assert!(matches!(render_err("<%= [1, \"a\"].sort %>"), RenderError::Eval { .. }));

        // Long enough for the sort to take its non-trivial path
        let mixed = (0..60)
            .map(|i| if i % 3 == 0 { format!("\"s{i}\"") } else { i.to_string() })
            .collect::<Vec<_>>()
            .join(", ");
        let err = render_err(&format!("<%= [{mixed}].sort.inspect %>"));
        assert!(matches!(err, RenderError::Eval { line: 1, .. }));
        assert!(err.to_string().contains("comparison of"));

        let err = render_err(&format!("<%= [{mixed}].sort_by {{ |x| x }}.first %>"));
        assert!(matches!(err, RenderError::Eval { .. }));

        let ints = (0..40).rev().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
        assert_eq!(render(&format!("<%= [{ints}].sort.first(3).inspect %>")), "[0, 1, 2]");
    }

    #[test]
    fn test_hash_methods() {
        let setup = "<% h = { \"b\" => 2, \"a\" => 1 } %>";
        assert_eq!(render(&format!("{setup}<%= h.keys.inspect %> <%= h.values.sum %>")), "[\"b\", \"a\"] 3");
        assert_eq!(render(&format!("{setup}<%= h.key?(\"a\") %> <%= h.fetch(\"z\", 0) %> <%= h[\"zz\"].inspect %>")), "true 0 nil");
        assert_eq!(
            render(&format!("{setup}<% h.each do |k, v| %><%= k %>=<%= v %>;<% end %>")),
            "b=2;a=1;"
        );
        assert_eq!(render(&format!("{setup}<%= h.sort_by {{ |k, v| v }}.map {{ |k, v| k }}.join %>")), "ab");
        assert_eq!(render(&format!("{setup}<%= h.select {{ |k, v| v > 1 }} %>")), "{\"b\" => 2}");
        assert_eq!(render(&format!("{setup}<%= h.map {{ |k, v| k * v }}.inspect %>")), "[\"bb\", \"a\"]");
        assert_eq!(render("<%= { a: { b: [10, 20] } }.dig(\"a\", \"b\", 1) %>"), "20");
        assert!(matches!(
            render_err(&format!("{setup}<%= h.fetch(\"z\") %>")),
            RenderError::Eval { ref message, .. } if message.contains("key not found")
        ));
    }

    #[test]
    fn test_range_methods() {
        assert_eq!(render("<%= (1..4).to_a.inspect %> <%= (1...4).size %> <%= (1..4).include?(4) %>"), "[1, 2, 3, 4] 3 true");
        assert_eq!(render("<%= (1..3).map { |i| i * i }.inspect %> <%= (1..100).sum %>"), "[1, 4, 9] 5050");
        assert_eq!(render("<%= (1..10_000_000).sum %>"), "50000005000000");
    }

    #[test]
    fn test_unknown_method() {
        let err = render_err("<%= 1.frobnicate %>");
        let RenderError::Eval { message, .. } = err else {
            panic!("expected eval error");
        };
        assert_eq!(message, "undefined method `frobnicate' for Integer");
    }

    #[test]
    fn test_file_builtins() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("VERSION"), "0.4.1\n").unwrap();
        fs::create_dir(base.join("docs")).unwrap();
        fs::write(base.join("docs").join("b.md"), "").unwrap();
        fs::write(base.join("docs").join("a.md"), "").unwrap();

        assert_eq!(render_in("<%= File.read(\"VERSION\").chomp %>", base).unwrap(), "0.4.1");
        assert_eq!(
            render_in("<%= File.exist?(\"VERSION\") %> <%= File.exist?(\"nope\") %>", base).unwrap(),
            "true false"
        );
        assert_eq!(render_in("<%= Dir.glob(\"docs/*.md\").join(\" \") %>", base).unwrap(), "docs/a.md docs/b.md");
        assert_eq!(render_in("<%= Dir[\"docs/*.md\"].size %>", base).unwrap(), "2");
        assert!(matches!(
            render_in("<%= File.read(\"missing.txt\") %>", base),
            Err(RenderError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_file_predicates_under_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::create_dir(base.join("docs")).unwrap();

        assert_eq!(
            render_in(
                "<%= File.exist?(\"guide/missing.md\") %> <%= File.file?(\"a/b/c.md\") %> <%= File.directory?(\"x/y\") %> <%= File.directory?(\"docs\") %>",
                base
            )
            .unwrap(),
            "false false false true"
        );
        assert!(matches!(
            render_in("<%= File.exist?(\"../elsewhere/x.md\") %>", base),
            Err(RenderError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(render("<%= File.basename(\"a/b/c.tar.gz\") %>"), "c.tar.gz");
        assert_eq!(render("<%= File.basename(\"a/b/c.rb\", \".rb\") %>"), "c");
        assert_eq!(render("<%= File.basename(\"a/b/c.rb\", \".*\") %>"), "c");
        assert_eq!(render("<%= File.extname(\"x/y.md\") %>|<%= File.extname(\".bashrc\") %>"), ".md|");
        assert_eq!(render("<%= File.dirname(\"a/b/c.rb\") %> <%= File.dirname(\"c.rb\") %>"), "a/b .");
        assert_eq!(render("<%= File.join(\"a\", \"b/\", \"/c\") %>"), "a/b/c");
    }

    #[test]
    fn test_yaml_and_json() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join("meta.yml"), "name: erbdoc\nauthors:\n  - Ada\n  - Lin\n").unwrap();

        assert_eq!(
            render_in("<% meta = YAML.load_file(\"meta.yml\") %><%= meta[\"name\"] %> by <%= meta[\"authors\"].join(\" & \") %>", base).unwrap(),
            "erbdoc by Ada & Lin"
        );
        assert_eq!(render("<%= JSON.generate({ \"b\" => 1, \"a\" => [true, nil] }) %>"), "{\"b\":1,\"a\":[true,null]}");
        assert_eq!(render("<%= JSON.parse(\"{\\\"z\\\": 1, \\\"y\\\": 2.5}\").keys.join %>"), "zy");
        assert_eq!(render("<%= JSON.pretty_generate([1]) %>"), "[\n  1\n]");
        assert_eq!(render("<%= YAML.load(\"- 1\\n- two\\n\").inspect %>"), "[1, \"two\"]");
        assert!(matches!(
            render_in("<%= JSON.parse(\"{\") %>", base),
            Err(RenderError::Json(_))
        ));
    }

    #[test]
    fn test_format_string() {
        let args = [Value::Int(7), Value::Str("x".to_string())];
        assert_eq!(format_string("%03d-%s%%", &args, 1).unwrap(), "007-x%");
        assert_eq!(format_string("%+.2f", &[Value::Float(1.005)], 1).unwrap(), "+1.00");
        assert_eq!(format_string("%x %b", &[Value::Int(255), Value::Int(5)], 1).unwrap(), "ff 101");
        assert!(format_string("%d %d", &[Value::Int(1)], 1).is_err());
        assert!(format_string("%q", &[Value::Int(1)], 1).is_err());
        assert_eq!(format_string("%e", &[Value::Int(1)], 1).unwrap(), "1.000000e+00");
        assert_eq!(format_string("%.2e", &[Value::Float(-0.00012)], 1).unwrap(), "-1.20e-04");
    }

    #[test]
    fn test_oversized_widths_fail() {
        for template in [
            "<%= format(\"%99999999999999999999d\", 1) %>",
            "<%= format(\"%.99999999999f\", 1.5) %>",
            "<%= \"x\".ljust(99_999_999_999) %>",
            "<%= \"x\".center(20_000_000, \"ab\") %>",
        ] {
            let err = render_err(template);
            assert!(matches!(err, RenderError::Eval { .. }), "{template}");
            assert!(err.to_string().contains("argument too big"), "{template}");
        }
        assert_eq!(render("<%= \"x\".rjust(4, \"-\") %>"), "---x");
    }

    #[test]
    fn test_serializing_huge_ranges_fails() {
        for template in [
            "<%= JSON.generate(1..2_000_000).size %>",
            "<%= (1..2_000_000).to_json.size %>",
            "<%= YAML.dump({ \"r\" => 0...5_000_000 }) %>",
        ] {
            let err = render_err(template);
            assert!(err.to_string().contains("too large to expand"), "{template}");
        }
        assert_eq!(render("<%= JSON.generate(1..3) %>"), "[1,2,3]");
    }

    #[test]
    fn test_replacement_translation() {
        assert_eq!(replacement("\\1-\\0"), "${1}-${0}");
        assert_eq!(replacement("$5"), "$$5");
        assert_eq!(replacement("a\\\\b"), "a\\b");
    }
}

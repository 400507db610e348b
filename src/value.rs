//! Runtime values of the template language

use crate::error::Result;
use crate::interpreter::expand_range;
use std::cmp::Ordering;
use std::fmt::{self, Write};

/// Built-in constant namespaces reachable from templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    File,
    Dir,
    Yaml,
    Json,
}

impl Module {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "File" => Some(Self::File),
            "Dir" => Some(Self::Dir),
            "YAML" => Some(Self::Yaml),
            "JSON" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Dir => "Dir",
            Self::Yaml => "YAML",
            Self::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    /// Insertion-ordered key/value pairs
    Hash(Vec<(Value, Value)>),
    Range {
        start: i64,
        end: i64,
        exclusive: bool,
    },
    /// Regular expression source
    Regex(String),
    Module(Module),
}

impl Value {
    /// Only `nil` and `false` are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "NilClass",
            Value::Bool(true) => "TrueClass",
            Value::Bool(false) => "FalseClass",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Range { .. } => "Range",
            Value::Regex(_) => "Regexp",
            Value::Module(_) => "Module",
        }
    }

    /// The text an output tag inserts for this value.
    pub fn to_output(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Developer-facing representation, with strings quoted.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Str(s) => quote(s),
            Value::Regex(pattern) => format!("/{pattern}/"),
            other => other.to_string(),
        }
    }

    /// Looks up `key` in a hash value.
    pub fn hash_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Hash(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Integer items of a range, in order.
    pub fn range_items(start: i64, end: i64, exclusive: bool) -> Vec<Value> {
        if exclusive {
            (start..end).map(Value::Int).collect()
        } else {
            (start..=end).map(Value::Int).collect()
        }
    }

    /// Numeric view used for mixed integer/float arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality with integer/float cross comparison (`1 == 1.0`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (a, b) => a == b,
        }
    }

    /// Ordering for `<`, `sort`, `min` and friends; `None` when the values
    /// are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:04x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Floats print with at least one fractional digit, as in `2.0`; very large
/// and very small magnitudes switch to `1.0e+16` notation.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if f != 0.0 && (f.abs() >= 1e16 || f.abs() < 1e-4) {
        let shortest = format!("{f:e}");
        match shortest.split_once('e') {
            Some((mantissa, exp)) if !mantissa.contains('.') => {
                ruby_exponent(&format!("{mantissa}.0e{exp}"))
            }
            _ => ruby_exponent(&shortest),
        }
    } else if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Rewrites Rust's `1.5e-7` exponent into Ruby's `1.5e-07`.
pub(crate) fn ruby_exponent(formatted: &str) -> String {
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted.to_string(),
    }
}

impl fmt::Display for Value {
    /// Equivalent of `to_s`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.inspect())?;
                }
                f.write_char(']')
            }
            Value::Hash(entries) => {
                if entries.is_empty() {
                    return f.write_str("{}");
                }
                f.write_char('{')?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {}", key.inspect(), value.inspect())?;
                }
                f.write_char('}')
            }
            Value::Range {
                start,
                end,
                exclusive,
            } => write!(f, "{start}{}{end}", if *exclusive { "..." } else { ".." }),
            Value::Regex(pattern) => write!(f, "(?-mix:{pattern})"),
            Value::Module(module) => f.write_str(module.name()),
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match value {
            Yaml::Null => Value::Nil,
            Yaml::Bool(b) => Value::Bool(b),
            Yaml::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Nil),
            Yaml::String(s) => Value::Str(s),
            Yaml::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Yaml::Mapping(map) => Value::Hash(
                map.into_iter()
                    .map(|(k, v)| (Value::from(k), Value::from(v)))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Nil),
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Hash(
                map.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Value {
    /// JSON form used by `to_json`, `JSON.generate` and `YAML.dump`
    ///
    /// Ranges become arrays and are held to the same size limit as `to_a`.
    pub fn to_json(&self, line: usize) -> Result<serde_json::Value> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Str(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|item| item.to_json(line))
                    .collect::<Result<_>>()?,
            ),
            Value::Hash(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.to_output(), v.to_json(line)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Range {
                start,
                end,
                exclusive,
            } => Json::Array(
                expand_range(*start, *end, *exclusive, line)?
                    .iter()
                    .map(|item| item.to_json(line))
                    .collect::<Result<_>>()?,
            ),
            other => Json::String(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::Str(String::new()).truthy());
        assert!(Value::Array(vec![]).truthy());
    }

    #[test]
    fn test_output_strings() {
        assert_eq!(Value::Nil.to_output(), "");
        assert_eq!(Value::Int(2).to_output(), "2");
        assert_eq!(Value::Float(2.0).to_output(), "2.0");
        assert_eq!(Value::Float(0.25).to_output(), "0.25");
        assert_eq!(Value::Float(1e16).to_output(), "1.0e+16");
        assert_eq!(Value::Float(-2.5e20).to_output(), "-2.5e+20");
        assert_eq!(Value::Float(1e-5).to_output(), "1.0e-05");
        assert_eq!(Value::Float(1e15).to_output(), "1000000000000000.0");
        assert_eq!(Value::Bool(true).to_output(), "true");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Str("a".to_string()), Value::Nil]).to_output(),
            "[1, \"a\", nil]"
        );
        assert_eq!(
            Value::Hash(vec![(Value::Str("k".to_string()), Value::Int(1))]).to_output(),
            "{\"k\" => 1}"
        );
        assert_eq!(
            Value::Range {
                start: 1,
                end: 3,
                exclusive: true
            }
            .to_output(),
            "1...3"
        );
    }

    #[test]
    fn test_inspect_escapes() {
        assert_eq!(Value::Str("a\"b\n".to_string()).inspect(), "\"a\\\"b\\n\"");
        assert_eq!(Value::Nil.inspect(), "nil");
    }

    #[test]
    fn test_compare_and_loose_eq() {
        assert_eq!(
            Value::Int(1).compare(&Value::Float(1.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Str("b".to_string()).compare(&Value::Str("a".to_string())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Str("1".to_string())), None);
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::Str("1".to_string())));
    }

    #[test]
    fn test_from_yaml_keeps_order() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("b: 1\na: [x, 2.5, ~]\n").unwrap();
        let value = Value::from(yaml);
        let Value::Hash(entries) = &value else {
            panic!("expected hash");
        };
        assert_eq!(entries[0].0, Value::Str("b".to_string()));
        assert_eq!(
            value.hash_get(&Value::Str("a".to_string())),
            Some(&Value::Array(vec![
                Value::Str("x".to_string()),
                Value::Float(2.5),
                Value::Nil
            ]))
        );
    }

    #[test]
    fn test_json_round_trip_shape() {
        let value = Value::Hash(vec![(
            Value::Str("n".to_string()),
            Value::Array(vec![Value::Int(1), Value::Bool(false)]),
        )]);
        let json = value.to_json(1).unwrap();
        assert_eq!(json, serde_json::json!({ "n": [1, false] }));
        assert_eq!(Value::from(json), value);
    }

    #[test]
    fn test_json_of_range_respects_expansion_limit() {
        let small = Value::Range {
            start: 1,
            end: 3,
            exclusive: false,
        };
        assert_eq!(small.to_json(1).unwrap(), serde_json::json!([1, 2, 3]));

        let huge = Value::Array(vec![Value::Range {
            start: 1,
            end: 2_000_000,
            exclusive: false,
        }]);
        let err = huge.to_json(4).unwrap_err();
        assert!(matches!(err, crate::RenderError::Eval { line: 4, .. }));
        assert!(err.to_string().contains("too large to expand"));
    }
}

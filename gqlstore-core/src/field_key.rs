//! Argument-aware field keys.
//!
//! A field key names one field of one record in the cache. Selections of the
//! same field with different arguments must never share storage, so the key
//! is the field name (or alias) followed by the arguments exactly as they
//! were written in the document:
//!
//! ```text
//! favoriteColors                 no arguments
//! favoriteColors(where: "foo")   one argument
//! friends(first: 10, after: $c)  argument order is preserved, never sorted
//! ```
//!
//! The encoder is shared by whoever builds selection descriptors and by the
//! record store; both sides must produce byte-identical keys.

use crate::artifact::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::{Borrow, Cow};
use std::fmt;

/// Storage key for one field, including its serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    /// Wrap an already-encoded key (as found in generated artifacts).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Encode `name` with `args`, given as `(argument name, literal text)`
    /// pairs in document order.
    pub fn encode(name: &str, args: &[(&str, &str)]) -> Self {
        if args.is_empty() {
            return Self(name.to_string());
        }
        let rendered = args
            .iter()
            .map(|(arg, literal)| format!("{}: {}", arg, literal))
            .collect::<Vec<_>>()
            .join(", ");
        Self(format!("{}({})", name, rendered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The field name (or alias) without arguments.
    pub fn field_name(&self) -> &str {
        match self.0.find('(') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn has_arguments(&self) -> bool {
        self.0.contains('(')
    }

    /// Substitute `$variable` references in the argument text.
    ///
    /// Each reference outside a string literal is replaced by the variable's
    /// value printed as a GraphQL literal; undefined variables print as
    /// `null`. Keys without references are returned borrowed.
    pub fn evaluate<'a>(&'a self, variables: &Variables) -> Cow<'a, FieldKey> {
        if !self.0.contains('$') {
            return Cow::Borrowed(self);
        }

        let chars: Vec<char> = self.0.chars().collect();
        let mut out = String::with_capacity(self.0.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '"' {
                let end = string_literal_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            } else if c == '$' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                if end == start {
                    out.push(c);
                    i += 1;
                    continue;
                }
                let name: String = chars[start..end].iter().collect();
                match variables.get(&name) {
                    Some(value) => write_literal(&mut out, value),
                    None => out.push_str("null"),
                }
                i = end;
            } else {
                out.push(c);
                i += 1;
            }
        }
        Cow::Owned(Self(out))
    }
}

/// Index one past the end of the string literal starting at `start`.
fn string_literal_end(chars: &[char], start: usize) -> usize {
    let is_block = chars.get(start + 1) == Some(&'"') && chars.get(start + 2) == Some(&'"');
    if is_block {
        let mut i = start + 3;
        while i + 2 < chars.len() {
            if chars[i] == '"' && chars[i + 1] == '"' && chars[i + 2] == '"' {
                return i + 3;
            }
            i += 1;
        }
        return chars.len();
    }

    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Print a JSON value as a GraphQL input literal.
pub fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(_) => out.push_str(&value.to_string()),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_literal(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_literal(out, item);
            }
            out.push('}');
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FieldKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for FieldKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

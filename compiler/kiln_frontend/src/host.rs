//! Host-side values and the kernel scope.
//!
//! A kernel can refer to values that live outside of it: numbers and plain
//! objects from the embedding program, fields, textures and other functions.
//! [`HostValue`] models them; [`Scope`] maps names to them.
//!
//! Free expressions in a kernel (`params.count`, `palette[2].r`) are looked
//! up by their source text. [`Scope::evaluate`] understands the path subset
//! of the expression language: an identifier or `this`, followed by any
//! number of `.name`, `[index]` and `["key"]` segments.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use kiln_ir::{Field, FieldId, Texture, TextureId};
use kiln_syntax::{BinaryOperator, NodeId};

use crate::oracle::ParsedFunction;

/// A value owned by the embedding program.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum HostValue {
    Number(f64),
    Bool(bool),
    Str(String),
    Array(Vec<HostValue>),
    /// Plain object, members in insertion order.
    Object(Vec<(String, HostValue)>),
    Field(Field),
    Texture(Texture),
    Function(ParsedFunction),
    Null,
    #[default]
    Undefined,
}

/// Hashable identity of a [`HostValue`], used to key compiled kernels by
/// their template arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HostKey {
    /// Bit pattern of the number.
    Number(u64),
    Bool(bool),
    Str(String),
    Array(Vec<HostKey>),
    Object(Vec<(String, HostKey)>),
    Field(FieldId),
    Texture(TextureId),
    /// Functions are identified by the tree they live in and their root.
    Function { tree: usize, root: NodeId },
    Null,
    Undefined,
}

impl HostValue {
    pub fn object<S: Into<String>>(members: impl IntoIterator<Item = (S, HostValue)>) -> Self {
        HostValue::Object(
            members
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn numbers(values: &[f64]) -> Self {
        HostValue::Array(values.iter().copied().map(HostValue::Number).collect())
    }

    pub fn describe(&self) -> &'static str {
        match self {
            HostValue::Number(_) => "number",
            HostValue::Bool(_) => "boolean",
            HostValue::Str(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Field(_) => "field",
            HostValue::Texture(_) => "texture",
            HostValue::Function(_) => "function",
            HostValue::Null => "null",
            HostValue::Undefined => "undefined",
        }
    }

    pub fn cache_key(&self) -> HostKey {
        match self {
            HostValue::Number(n) => HostKey::Number(n.to_bits()),
            HostValue::Bool(b) => HostKey::Bool(*b),
            HostValue::Str(s) => HostKey::Str(s.clone()),
            HostValue::Array(items) => HostKey::Array(items.iter().map(HostValue::cache_key).collect()),
            HostValue::Object(members) => HostKey::Object(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.cache_key()))
                    .collect(),
            ),
            HostValue::Field(field) => HostKey::Field(field.id),
            HostValue::Texture(texture) => HostKey::Texture(texture.id),
            HostValue::Function(function) => HostKey::Function {
                tree: Rc::as_ptr(&function.tree) as usize,
                root: function.root,
            },
            HostValue::Null => HostKey::Null,
            HostValue::Undefined => HostKey::Undefined,
        }
    }

    /// `self.name`. Arrays and strings expose `length`.
    pub fn member(&self, name: &str) -> Option<HostValue> {
        match self {
            HostValue::Object(members) => members
                .iter()
                .find_map(|(member, value)| (member == name).then(|| value.clone())),
            HostValue::Array(items) if name == "length" => Some(HostValue::Number(items.len() as f64)),
            HostValue::Str(s) if name == "length" => Some(HostValue::Number(s.chars().count() as f64)),
            _ => None,
        }
    }

    /// `self[index]`.
    pub fn element(&self, index: usize) -> Option<HostValue> {
        match self {
            HostValue::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
            HostValue::Bool(b) => *b,
            HostValue::Str(s) => !s.is_empty(),
            HostValue::Null | HostValue::Undefined => false,
            HostValue::Array(_)
            | HostValue::Object(_)
            | HostValue::Field(_)
            | HostValue::Texture(_)
            | HostValue::Function(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            HostValue::Number(n) => *n,
            HostValue::Bool(b) => f64::from(u8::from(*b)),
            HostValue::Null => 0.0,
            HostValue::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    fn to_display_string(&self) -> String {
        match self {
            HostValue::Number(n) => format_number(*n),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Str(s) => s.clone(),
            HostValue::Null => "null".to_owned(),
            HostValue::Undefined => "undefined".to_owned(),
            HostValue::Array(items) => items
                .iter()
                .map(HostValue::to_display_string)
                .collect::<Vec<_>>()
                .join(","),
            HostValue::Object(_) | HostValue::Field(_) | HostValue::Texture(_) => {
                "[object Object]".to_owned()
            }
            HostValue::Function(_) => "function".to_owned(),
        }
    }

    fn loose_eq(&self, other: &HostValue) -> bool {
        use HostValue::{Bool, Null, Number, Str, Undefined};
        match (self, other) {
            (Null | Undefined, Null | Undefined) => true,
            (Null | Undefined, _) | (_, Null | Undefined) => false,
            (Number(_) | Bool(_) | Str(_), Number(_) | Bool(_) | Str(_))
                if std::mem::discriminant(self) != std::mem::discriminant(other) =>
            {
                self.to_number() == other.to_number()
            }
            _ => self == other,
        }
    }

    /// Evaluate `self op rhs` the way the embedding language would. `None`
    /// for assignments.
    pub fn binary(&self, op: BinaryOperator, rhs: &HostValue) -> Option<HostValue> {
        use BinaryOperator as B;
        let num = |f: fn(f64, f64) -> f64| Some(HostValue::Number(f(self.to_number(), rhs.to_number())));
        let int = |f: fn(i32, i32) -> i32| {
            Some(HostValue::Number(f64::from(f(
                to_int32(self.to_number()),
                to_int32(rhs.to_number()),
            ))))
        };
        let compare = |f: fn(std::cmp::Ordering) -> bool| {
            let ordering = match (self, rhs) {
                (HostValue::Str(a), HostValue::Str(b)) => Some(a.cmp(b)),
                _ => self.to_number().partial_cmp(&rhs.to_number()),
            };
            Some(HostValue::Bool(ordering.is_some_and(f)))
        };
        match op {
            B::Add => match (self, rhs) {
                (HostValue::Str(_), _) | (_, HostValue::Str(_)) => Some(HostValue::Str(
                    self.to_display_string() + &rhs.to_display_string(),
                )),
                _ => num(|a, b| a + b),
            },
            B::Sub => num(|a, b| a - b),
            B::Mul => num(|a, b| a * b),
            B::Div => num(|a, b| a / b),
            B::Mod => num(|a, b| a % b),
            B::Pow => num(f64::powf),
            B::Lt => compare(std::cmp::Ordering::is_lt),
            B::Le => compare(std::cmp::Ordering::is_le),
            B::Gt => compare(std::cmp::Ordering::is_gt),
            B::Ge => compare(std::cmp::Ordering::is_ge),
            B::Eq => Some(HostValue::Bool(self.loose_eq(rhs))),
            B::Ne => Some(HostValue::Bool(!self.loose_eq(rhs))),
            B::StrictEq => Some(HostValue::Bool(self == rhs)),
            B::StrictNe => Some(HostValue::Bool(self != rhs)),
            B::BitAnd => int(|a, b| a & b),
            B::BitOr => int(|a, b| a | b),
            B::BitXor => int(|a, b| a ^ b),
            B::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
            B::Sar => int(|a, b| a.wrapping_shr(b as u32 & 31)),
            B::Shr => {
                let shifted = (to_int32(self.to_number()) as u32) >> (to_int32(rhs.to_number()) as u32 & 31);
                Some(HostValue::Number(f64::from(shifted)))
            }
            B::LogicalAnd => Some(if self.is_truthy() { rhs.clone() } else { self.clone() }),
            B::LogicalOr => Some(if self.is_truthy() { self.clone() } else { rhs.clone() }),
            B::Comma => Some(rhs.clone()),
            _ => None,
        }
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(f64::from(value))
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<Field> for HostValue {
    fn from(field: Field) -> Self {
        HostValue::Field(field)
    }
}

impl From<Texture> for HostValue {
    fn from(texture: Texture) -> Self {
        HostValue::Texture(texture)
    }
}

/// `ToInt32`: wrap the truncated number into the `i32` range.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    (wrapped as i64) as i32
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ── Scope ───────────────────────────────────────────────────────────

/// Names visible to a kernel besides its own locals.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    values: FxHashMap<String, HostValue>,
    this: HostValue,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<HostValue>) {
        self.values.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.add(name, value);
        self
    }

    pub fn set_this(&mut self, this: HostValue) {
        self.this = this;
    }

    pub fn this(&self) -> &HostValue {
        &self.this
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Evaluate a path expression. `None` when the text is not a path, a
    /// segment does not exist, or the result is `undefined`.
    pub fn evaluate(&self, text: &str) -> Option<HostValue> {
        let mut cursor = PathCursor::new(text.trim());
        let base = cursor.identifier()?;
        let mut value = if base == "this" {
            self.this.clone()
        } else {
            self.values.get(base)?.clone()
        };
        while let Some(segment) = cursor.segment()? {
            value = match segment {
                Segment::Member(name) => value.member(name)?,
                Segment::Index(index) => value.element(index)?,
                Segment::Key(key) => value.member(key)?,
            };
        }
        (value != HostValue::Undefined).then_some(value)
    }
}

enum Segment<'a> {
    Member(&'a str),
    Index(usize),
    Key(&'a str),
}

struct PathCursor<'a> {
    rest: &'a str,
}

impl<'a> PathCursor<'a> {
    fn new(text: &'a str) -> Self {
        PathCursor { rest: text }
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let mut chars = self.rest.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_alphabetic() || c == '_' || c == '$' => {}
            _ => return None,
        }
        let end = chars
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
            .map_or(self.rest.len(), |(i, _)| i);
        let (ident, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(ident)
    }

    /// The next segment; `Some(None)` at the end, `None` on malformed input.
    fn segment(&mut self) -> Option<Option<Segment<'a>>> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return Some(None);
        }
        if let Some(rest) = self.rest.strip_prefix('.') {
            self.rest = rest.trim_start();
            return Some(Some(Segment::Member(self.identifier()?)));
        }
        let inner = self.rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        let (index, rest) = inner.split_at(close);
        self.rest = &rest[1..];
        let index = index.trim();
        let quoted = index
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| index.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
        match quoted {
            Some(key) => Some(Some(Segment::Key(key))),
            None => index.parse().ok().map(|i| Some(Segment::Index(i))),
        }
    }
}

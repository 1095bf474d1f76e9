//! Runtime values shared by the object model, the membrane and the guards.
//!
//! Values are either primitives (no independent identity) or handles into the
//! realm's object heap.  Primitive values tame and untame to themselves; only
//! `Object` carries identity.
//!
//! Equality comes in two flavours:
//!
//! - `PartialEq` is structural/IEEE (`NaN != NaN`, `+0 == -0`).
//! - [`SesValue::same_value`] is the SameValue rule used for descriptor no-op
//!   detection and conversion bookkeeping: reflexive on `NaN`, distinguishes
//!   `+0` from `-0`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix reserved for internal attribute encoding.  Names ending with it are
/// never valid guest-visible property names.
pub const RESERVED_NAME_SUFFIX: &str = "__";

// ---------------------------------------------------------------------------
// ObjectHandle
// ---------------------------------------------------------------------------

/// Opaque handle referencing an object on a realm's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object#{}]", self.0)
    }
}

// ---------------------------------------------------------------------------
// SesValue
// ---------------------------------------------------------------------------

/// A value that may flow between host and guest code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SesValue {
    /// The "no value" / absent value.
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Object(ObjectHandle),
}

impl SesValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Primitives have no identity of their own.
    pub fn is_primitive(&self) -> bool {
        !self.is_object()
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) => Some(*h),
            _ => None,
        }
    }

    /// `typeof`-style name; functions are reported as `object` here because
    /// telling them apart requires the heap.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
        }
    }

    /// SameValue: `NaN` equals itself and `+0` differs from `-0`.
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => same_number(*a, *b),
            _ => self == other,
        }
    }

    /// JS-style truthiness, used when descriptor fields arrive as values.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Object(_) => true,
        }
    }
}

fn same_number(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

impl fmt::Display for SesValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&number_to_string(*n)),
            Self::Str(s) => write!(f, "{s}"),
            Self::Object(h) => write!(f, "{h}"),
        }
    }
}

impl From<bool> for SesValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for SesValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for SesValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for SesValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for SesValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<ObjectHandle> for SesValue {
    fn from(h: ObjectHandle) -> Self {
        Self::Object(h)
    }
}

// ---------------------------------------------------------------------------
// Property names
// ---------------------------------------------------------------------------

/// Number-to-string conversion for property names and diagnostics.
///
/// Produces the canonical JavaScript text: the shortest round-tripping
/// digits, plain notation for decimal exponents in `-7..21`, exponent
/// notation (`1e+21`, `1.5e-7`) outside it.  `-0` prints as `0`.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{:e}", n.abs());
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return format!("{n}");
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return format!("{n}");
    };
    let digits = mantissa.replace('.', "");
    let k = digits.len() as i32;
    // Position of the decimal point relative to the first digit.
    let point = exp + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let sign = if exp >= 0 { '+' } else { '-' };
        let (lead, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{lead}e{sign}{}", exp.abs())
        } else {
            format!("{lead}.{rest}e{sign}{}", exp.abs())
        }
    };
    if n < 0.0 { format!("-{body}") } else { body }
}

/// Is `name` governed by the shared numeric descriptor?
///
/// A name is numeric when it is the canonical string form of some number,
/// i.e. converting it to a number and back yields the same text.
pub fn is_numeric_name(name: &str) -> bool {
    match name.parse::<f64>() {
        Ok(n) => number_to_string(n) == name,
        Err(_) => false,
    }
}

/// Names ending with [`RESERVED_NAME_SUFFIX`] are rejected as input.
pub fn is_reserved_name(name: &str) -> bool {
    name.ends_with(RESERVED_NAME_SUFFIX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

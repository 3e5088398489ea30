//! Parameter kinds and argument shapes used to pick a method overload.
//!
//! # Key Types
//! - [`ParamKind`]: The coarse type of a single parameter or return value
//! - [`ParamFlags`]: By-reference and out markers
//! - [`Param`]: A kind plus its flags
//! - [`ArgumentShape`]: An ordered parameter list used to disambiguate overloads

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumIter, EnumString};

/// The coarse type of a parameter or return value as seen by the host.
///
/// The host never needs the full managed type system: interceptions only have to tell
/// overloads apart, and every overload that matters for compatibility patching differs in
/// one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ParamKind {
    /// No value (return type only)
    Void,
    /// `System.Boolean`
    Bool,
    /// `System.Int32`
    I32,
    /// `System.Int64`
    I64,
    /// `System.Double`
    F64,
    /// `System.String`
    String,
    /// Any reference type other than string
    Object,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Parameter passing flags
    pub struct ParamFlags: u8 {
        /// Passed by reference (`ref`), writes by a wrap-before handler reach the original
        const BY_REF = 0x01;
        /// Output-only parameter (`out`)
        const OUT = 0x02;
    }
}

/// A single parameter: its kind and passing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Param {
    /// The parameter's kind
    pub kind: ParamKind,
    /// The parameter's passing flags
    pub flags: ParamFlags,
}

impl Param {
    /// Creates a by-value parameter of the given kind.
    #[must_use]
    pub fn new(kind: ParamKind) -> Self {
        Self {
            kind,
            flags: ParamFlags::empty(),
        }
    }

    /// Creates a by-reference parameter of the given kind.
    #[must_use]
    pub fn by_ref(kind: ParamKind) -> Self {
        Self {
            kind,
            flags: ParamFlags::BY_REF,
        }
    }

    /// Returns `true` if writes to this argument are visible to the original method.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        self.flags.intersects(ParamFlags::BY_REF | ParamFlags::OUT)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.contains(ParamFlags::OUT) {
            write!(f, "out {}", self.kind)
        } else if self.flags.contains(ParamFlags::BY_REF) {
            write!(f, "ref {}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// An ordered parameter list identifying one overload of a method.
///
/// # Examples
///
/// ```rust
/// use dotlaunch::runtime::{ArgumentShape, Param, ParamKind};
///
/// let shape = ArgumentShape::new().param(ParamKind::String).by_ref(ParamKind::I32);
/// assert_eq!(shape.to_string(), "(string, ref i32)");
/// assert!(shape.matches(&[Param::new(ParamKind::String), Param::by_ref(ParamKind::I32)]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArgumentShape {
    params: Vec<Param>,
}

impl ArgumentShape {
    /// Creates an empty shape, matching parameterless overloads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a by-value parameter.
    #[must_use]
    pub fn param(mut self, kind: ParamKind) -> Self {
        self.params.push(Param::new(kind));
        self
    }

    /// Appends a by-reference parameter.
    #[must_use]
    pub fn by_ref(mut self, kind: ParamKind) -> Self {
        self.params.push(Param::by_ref(kind));
        self
    }

    /// Returns the parameters of this shape.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Checks whether a declared parameter list has exactly this shape.
    ///
    /// Kinds must agree position by position. A by-reference marker on the shape must also be
    /// present on the declaration, since a by-value overload cannot carry a rewritten input.
    #[must_use]
    pub fn matches(&self, declared: &[Param]) -> bool {
        self.params.len() == declared.len()
            && self.params.iter().zip(declared).all(|(want, have)| {
                want.kind == have.kind && (!want.is_by_ref() || have.is_by_ref())
            })
    }
}

impl fmt::Display for ArgumentShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Param>> for ArgumentShape {
    fn from(params: Vec<Param>) -> Self {
        Self { params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_shape_exact_match() {
        let shape = ArgumentShape::new().param(ParamKind::String);
        assert!(shape.matches(&[Param::new(ParamKind::String)]));
        assert!(!shape.matches(&[Param::new(ParamKind::I32)]));
        assert!(!shape.matches(&[]));
    }

    #[test]
    fn test_shape_by_ref_requires_by_ref_declaration() {
        let shape = ArgumentShape::new().by_ref(ParamKind::String);
        assert!(!shape.matches(&[Param::new(ParamKind::String)]));
        assert!(shape.matches(&[Param::by_ref(ParamKind::String)]));

        // A by-value shape still matches a by-ref declaration
        let loose = ArgumentShape::new().param(ParamKind::String);
        assert!(loose.matches(&[Param::by_ref(ParamKind::String)]));
    }

    #[test]
    fn test_param_kind_parse() {
        assert_eq!(ParamKind::from_str("string").unwrap(), ParamKind::String);
        assert_eq!(ParamKind::I64.to_string(), "i64");
    }

    #[test]
    fn test_shape_display() {
        let shape = ArgumentShape::from(vec![
            Param::new(ParamKind::Bool),
            Param {
                kind: ParamKind::Object,
                flags: ParamFlags::OUT,
            },
        ]);
        assert_eq!(shape.to_string(), "(bool, out object)");
        assert_eq!(ArgumentShape::new().to_string(), "()");
    }
}

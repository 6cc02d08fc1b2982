// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value types carried by ports.
//!
//! A port starts out either with a concrete type or as [`ValueType::Generic`],
//! a placeholder that is later unified with whatever concrete type a
//! connection supplies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type of a port
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Unresolved placeholder pending unification
    #[default]
    Generic,
    /// Predeclared type such as `int`, `string` or `bool`
    Basic(String),
    /// User-named type with its underlying structure
    Named {
        /// Type name
        name: String,
        /// Underlying type
        underlying: Box<ValueType>,
    },
    /// Pointer to a type
    Pointer(Box<ValueType>),
    /// Slice of elements
    Slice(Box<ValueType>),
    /// Fixed-length array
    Array(usize, Box<ValueType>),
    /// Map from key type to value type
    Map(Box<ValueType>, Box<ValueType>),
}

impl ValueType {
    /// Basic type by name
    pub fn basic(name: impl Into<String>) -> Self {
        Self::Basic(name.into())
    }

    /// The `int` type
    pub fn int() -> Self {
        Self::basic("int")
    }

    /// The `bool` type
    pub fn bool() -> Self {
        Self::basic("bool")
    }

    /// The `string` type
    pub fn string() -> Self {
        Self::basic("string")
    }

    /// Named type over an underlying type
    pub fn named(name: impl Into<String>, underlying: ValueType) -> Self {
        Self::Named {
            name: name.into(),
            underlying: Box::new(underlying),
        }
    }

    /// Pointer to `elem`
    pub fn pointer(elem: ValueType) -> Self {
        Self::Pointer(Box::new(elem))
    }

    /// Slice of `elem`
    pub fn slice(elem: ValueType) -> Self {
        Self::Slice(Box::new(elem))
    }

    /// Array of `len` elements
    pub fn array(len: usize, elem: ValueType) -> Self {
        Self::Array(len, Box::new(elem))
    }

    /// Map from `key` to `value`
    pub fn map(key: ValueType, value: ValueType) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Whether this type is still unresolved
    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Generic)
    }

    /// Follow one level of pointer indirection.
    ///
    /// Returns the pointee and `true` when `self` is a pointer, otherwise
    /// `self` and `false`.
    pub fn indirect(&self) -> (&ValueType, bool) {
        match self {
            Self::Pointer(elem) => (elem, true),
            other => (other, false),
        }
    }

    /// Strip any number of named-type layers
    pub fn underlying(&self) -> &ValueType {
        match self {
            Self::Named { underlying, .. } => underlying.underlying(),
            other => other,
        }
    }

    /// Whether values of this type can be created with `make`
    pub fn is_makeable(&self) -> bool {
        matches!(self.underlying(), Self::Slice(_) | Self::Map(..))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Placeholder so that declarations of unresolved ports stay well-formed
            Self::Generic => f.write_str("interface{}"),
            Self::Basic(name) | Self::Named { name, .. } => f.write_str(name),
            Self::Pointer(elem) => write!(f, "*{elem}"),
            Self::Slice(elem) => write!(f, "[]{elem}"),
            Self::Array(len, elem) => write!(f, "[{len}]{elem}"),
            Self::Map(key, value) => write!(f, "map[{key}]{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ValueType::slice(ValueType::int()).to_string(), "[]int");
        assert_eq!(
            ValueType::map(ValueType::string(), ValueType::pointer(ValueType::int())).to_string(),
            "map[string]*int"
        );
        assert_eq!(ValueType::array(4, ValueType::bool()).to_string(), "[4]bool");
        assert_eq!(ValueType::Generic.to_string(), "interface{}");
    }

    #[test]
    fn test_indirect() {
        let ptr = ValueType::pointer(ValueType::slice(ValueType::int()));
        let (elem, followed) = ptr.indirect();
        assert!(followed);
        assert_eq!(elem, &ValueType::slice(ValueType::int()));

        let plain = ValueType::int();
        assert_eq!(plain.indirect(), (&plain, false));
    }

    #[test]
    fn test_makeable() {
        let ids = ValueType::named("IDs", ValueType::slice(ValueType::int()));
        assert!(ids.is_makeable());
        assert_eq!(ids.to_string(), "IDs");
        assert!(ValueType::map(ValueType::string(), ValueType::int()).is_makeable());
        assert!(!ValueType::int().is_makeable());
        assert!(!ValueType::array(2, ValueType::int()).is_makeable());
    }
}

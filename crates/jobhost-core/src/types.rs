//! Type descriptors for the binding engine.
//!
//! Values flowing through the host are type-erased, so every value and every
//! converter endpoint is described by a [`TypeDesc`]. A descriptor is either
//! concrete (`string`, `byte[]`, `BlobTriggerMessage`) or *open*, meaning it
//! contains one or more type parameters (`T[]`, `Envelope<T>`).
//!
//! Open descriptors are resolved by structural matching against a concrete
//! request:
//!
//! ```rust,ignore
//! let pattern = TypeDesc::array_of(TypeDesc::param("T"));
//! let request = TypeDesc::array_of(TypeDesc::named("Order"));
//!
//! let mut bindings = TypeBindings::new();
//! assert!(pattern.matches(&request, &mut bindings));
//! assert_eq!(bindings.get("T"), Some(&TypeDesc::named("Order")));
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Well-known names
// =============================================================================

/// Names of the descriptors the host itself knows about.
pub mod names {
    /// A single byte. `byte[]` is the raw byte sequence type.
    pub const BYTE: &str = "byte";
    /// UTF-8 text.
    pub const STRING: &str = "string";
    /// The most generic type; every value converts to it.
    pub const OBJECT: &str = "object";
    /// A JSON object node (string keys, JSON values).
    pub const JSON_OBJECT: &str = "JsonObject";
    /// A JSON array node.
    pub const JSON_ARRAY: &str = "JsonArray";
    /// Reserved marker type carrying opaque binding data for out-of-process workers.
    pub const PARAMETER_BINDING_DATA: &str = "ParameterBindingData";
    /// Textual stand-in for a trigger value used by manual invocation.
    pub const DIRECT_INVOKE_STRING: &str = "DirectInvokeString";
}

// =============================================================================
// TypeDesc
// =============================================================================

/// Describes the type of a value or of a converter endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDesc {
    /// A concrete named type.
    Named(Cow<'static, str>),
    /// An array of the element type.
    Array(Box<TypeDesc>),
    /// A named generic type applied to arguments, e.g. `Envelope<T>`.
    Generic {
        /// Generic type name.
        name: Cow<'static, str>,
        /// Type arguments, in declaration order.
        args: Vec<TypeDesc>,
    },
    /// An unresolved type parameter. Matches any type.
    Param(Cow<'static, str>),
}

impl TypeDesc {
    /// Creates a named type from a static name.
    pub const fn from_static(name: &'static str) -> Self {
        Self::Named(Cow::Borrowed(name))
    }

    /// Creates a named type.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    /// Creates an array of `elem`.
    pub fn array_of(elem: TypeDesc) -> Self {
        Self::Array(Box::new(elem))
    }

    /// Creates a generic instantiation.
    pub fn generic(name: impl Into<Cow<'static, str>>, args: Vec<TypeDesc>) -> Self {
        Self::Generic {
            name: name.into(),
            args,
        }
    }

    /// Creates a type parameter.
    pub fn param(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Param(name.into())
    }

    /// `string`
    pub const fn string() -> Self {
        Self::from_static(names::STRING)
    }

    /// `byte[]`
    pub fn bytes() -> Self {
        Self::array_of(Self::from_static(names::BYTE))
    }

    /// `object`
    pub const fn object() -> Self {
        Self::from_static(names::OBJECT)
    }

    /// `object[]`
    pub fn object_array() -> Self {
        Self::array_of(Self::object())
    }

    /// `JsonObject`
    pub const fn json_object() -> Self {
        Self::from_static(names::JSON_OBJECT)
    }

    /// `JsonArray`
    pub const fn json_array() -> Self {
        Self::from_static(names::JSON_ARRAY)
    }

    /// `ParameterBindingData`
    pub const fn parameter_binding_data() -> Self {
        Self::from_static(names::PARAMETER_BINDING_DATA)
    }

    /// `DirectInvokeString`
    pub const fn direct_invoke_string() -> Self {
        Self::from_static(names::DIRECT_INVOKE_STRING)
    }

    /// Returns `true` for array descriptors, including `byte[]`.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the element type of an array descriptor.
    pub fn element(&self) -> Option<&TypeDesc> {
        match self {
            Self::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Returns `true` for `object`.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Named(name) if name == names::OBJECT)
    }

    /// Returns `true` when the descriptor contains a type parameter.
    pub fn is_open(&self) -> bool {
        match self {
            Self::Named(_) => false,
            Self::Param(_) => true,
            Self::Array(elem) => elem.is_open(),
            Self::Generic { args, .. } => args.iter().any(TypeDesc::is_open),
        }
    }

    /// Returns `true` for the reserved binding-data marker, single or array form.
    pub fn is_parameter_binding_data(&self) -> bool {
        let marker = Self::parameter_binding_data();
        *self == marker || self.element() == Some(&marker)
    }

    /// Structurally matches this descriptor (the pattern) against `concrete`.
    ///
    /// Type parameters bind to whatever they are matched against; a parameter
    /// that occurs more than once must bind to the same type every time.
    /// On failure `bindings` may hold partial results and should be discarded.
    pub fn matches(&self, concrete: &TypeDesc, bindings: &mut TypeBindings) -> bool {
        match (self, concrete) {
            (Self::Param(name), other) => bindings.bind(name.clone(), other),
            (Self::Named(a), Self::Named(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a.matches(b, bindings),
            (
                Self::Generic { name: a, args: x },
                Self::Generic { name: b, args: y },
            ) => {
                a == b
                    && x.len() == y.len()
                    && x.iter().zip(y).all(|(p, c)| p.matches(c, bindings))
            }
            _ => false,
        }
    }

    /// Replaces bound type parameters. Unbound parameters are left open.
    pub fn substitute(&self, bindings: &TypeBindings) -> TypeDesc {
        match self {
            Self::Named(_) => self.clone(),
            Self::Param(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Self::Array(elem) => Self::array_of(elem.substitute(bindings)),
            Self::Generic { name, args } => Self::Generic {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) | Self::Param(name) => f.write_str(name),
            Self::Array(elem) => write!(f, "{elem}[]"),
            Self::Generic { name, args } => {
                write!(f, "{name}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
        }
    }
}

// =============================================================================
// TypeBindings
// =============================================================================

/// Type-parameter assignments produced by [`TypeDesc::matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeBindings {
    map: HashMap<Cow<'static, str>, TypeDesc>,
}

impl TypeBindings {
    /// Creates an empty set of bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the type bound to `name`.
    pub fn get(&self, name: &str) -> Option<&TypeDesc> {
        self.map.get(name)
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Binds `name` to `ty`, or checks consistency with an earlier binding.
    fn bind(&mut self, name: Cow<'static, str>, ty: &TypeDesc) -> bool {
        match self.map.get(&name) {
            Some(existing) => existing == ty,
            None => {
                self.map.insert(name, ty.clone());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TypeDesc::bytes().to_string(), "byte[]");
        assert_eq!(
            TypeDesc::array_of(TypeDesc::bytes()).to_string(),
            "byte[][]"
        );
        let envelope = TypeDesc::generic(
            "Envelope",
            vec![TypeDesc::string(), TypeDesc::param("T")],
        );
        assert_eq!(envelope.to_string(), "Envelope<string, T>");
    }

    #[test]
    fn test_bytes_is_array() {
        assert!(TypeDesc::bytes().is_array());
        assert!(!TypeDesc::json_array().is_array());
        assert!(!TypeDesc::string().is_array());
    }

    #[test]
    fn test_open_array_matches_concrete() {
        let pattern = TypeDesc::array_of(TypeDesc::param("T"));
        let request = TypeDesc::array_of(TypeDesc::named("Order"));

        let mut bindings = TypeBindings::new();
        assert!(pattern.matches(&request, &mut bindings));
        assert_eq!(bindings.get("T"), Some(&TypeDesc::named("Order")));
        assert_eq!(pattern.substitute(&bindings), request);
    }

    #[test]
    fn test_repeated_param_must_agree() {
        let pattern = TypeDesc::generic("Pair", vec![TypeDesc::param("T"), TypeDesc::param("T")]);

        let same = TypeDesc::generic("Pair", vec![TypeDesc::string(), TypeDesc::string()]);
        assert!(pattern.matches(&same, &mut TypeBindings::new()));

        let mixed = TypeDesc::generic("Pair", vec![TypeDesc::string(), TypeDesc::bytes()]);
        assert!(!pattern.matches(&mixed, &mut TypeBindings::new()));
    }

    #[test]
    fn test_shape_mismatch() {
        let pattern = TypeDesc::array_of(TypeDesc::param("T"));
        assert!(!pattern.matches(&TypeDesc::string(), &mut TypeBindings::new()));
        assert!(pattern.is_open());
        assert!(!TypeDesc::bytes().is_open());
    }

    #[test]
    fn test_parameter_binding_data_marker() {
        assert!(TypeDesc::parameter_binding_data().is_parameter_binding_data());
        assert!(
            TypeDesc::array_of(TypeDesc::parameter_binding_data()).is_parameter_binding_data()
        );
        assert!(!TypeDesc::string().is_parameter_binding_data());
    }
}

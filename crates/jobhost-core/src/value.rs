//! Type-erased values and the types the host binds to out of the box.
//!
//! Every value that moves through a converter is a [`BoxedValue`]: an
//! `Arc<dyn Any>` tagged with the [`TypeDesc`] it claims to be. Rust types opt
//! in to binding by implementing [`Bindable`], usually through the
//! [`bindable!`](crate::bindable) macro:
//!
//! ```rust,ignore
//! #[derive(Clone)]
//! struct Order { id: u64 }
//!
//! jobhost_core::bindable!(Order);
//!
//! let value = BoxedValue::new(Order { id: 7 });
//! assert_eq!(value.type_desc(), &TypeDesc::named("Order"));
//! let order: Order = value.take()?;
//! ```
//!
//! Generic arrays whose element type is only known at runtime (`object[]`, or
//! the specialisation of an open `T[]` converter) carry a `Vec<BoxedValue>`
//! and are built with [`BoxedValue::array`].

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, ConvertResult};
use crate::types::TypeDesc;

// =============================================================================
// Bindable
// =============================================================================

/// A Rust type with a fixed [`TypeDesc`] that can travel as a [`BoxedValue`].
pub trait Bindable: Any + Send + Sync + Clone {
    /// The descriptor for this type.
    fn type_desc() -> TypeDesc;

    /// Boxes this value.
    fn into_value(self) -> BoxedValue {
        BoxedValue::with_type(Self::type_desc(), self)
    }

    /// Unboxes a value of this type.
    fn from_value(value: BoxedValue) -> ConvertResult<Self> {
        value.take_any()
    }
}

/// Implements [`Bindable`] for a type.
///
/// With a single argument the descriptor is `TypeDesc::named("<type name>")`;
/// an explicit descriptor can be given with `=>`.
///
/// ```rust,ignore
/// bindable!(Order);
/// bindable!(Vec<Order> => TypeDesc::array_of(TypeDesc::named("Order")));
/// ```
#[macro_export]
macro_rules! bindable {
    ($ty:ty => $desc:expr) => {
        impl $crate::value::Bindable for $ty {
            fn type_desc() -> $crate::types::TypeDesc {
                $desc
            }
        }
    };
    ($ty:ty) => {
        $crate::bindable!($ty => $crate::types::TypeDesc::named(stringify!($ty)));
    };
}

// =============================================================================
// BoxedValue
// =============================================================================

/// A type-erased value tagged with its type descriptor.
///
/// Cloning is cheap: the payload is shared.
#[derive(Clone)]
pub struct BoxedValue {
    desc: TypeDesc,
    inner: Arc<dyn Any + Send + Sync>,
}

impl BoxedValue {
    /// Boxes a [`Bindable`] value.
    pub fn new<T: Bindable>(value: T) -> Self {
        value.into_value()
    }

    /// Boxes any value under an explicit descriptor.
    pub fn with_type<T: Any + Send + Sync>(desc: TypeDesc, value: T) -> Self {
        Self {
            desc,
            inner: Arc::new(value),
        }
    }

    /// Builds a generic array value of `elem` items.
    pub fn array(elem: TypeDesc, items: Vec<BoxedValue>) -> Self {
        Self::with_type(TypeDesc::array_of(elem), items)
    }

    /// Returns the descriptor of this value.
    pub fn type_desc(&self) -> &TypeDesc {
        &self.desc
    }

    /// Returns `true` when the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Borrows the payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_ref().downcast_ref()
    }

    /// Returns the items of a generic array value.
    pub fn items(&self) -> Option<&[BoxedValue]> {
        self.downcast_ref::<Vec<BoxedValue>>().map(Vec::as_slice)
    }

    /// Unboxes a [`Bindable`] value.
    pub fn take<T: Bindable>(self) -> ConvertResult<T> {
        T::from_value(self)
    }

    /// Unboxes the payload as `T`, cloning it if it is still shared.
    pub fn take_any<T: Any + Send + Sync + Clone>(self) -> ConvertResult<T> {
        let desc = self.desc;
        self.inner
            .downcast::<T>()
            .map(Arc::unwrap_or_clone)
            .map_err(|_| ConvertError::mismatch(type_name::<T>(), desc.to_string()))
    }
}

impl fmt::Debug for BoxedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedValue")
            .field("type", &self.desc.to_string())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Built-in value types
// =============================================================================

/// A JSON object node.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// A JSON array node.
///
/// Distinct from `T[]`: a JSON array is a single document, not a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonArray(pub Vec<serde_json::Value>);

/// The textual form of a trigger value used for manual invocation.
///
/// [`DirectInvokeString::NONE`] means the trigger has no textual form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectInvokeString {
    /// The text, if any.
    pub value: Option<String>,
}

impl DirectInvokeString {
    /// No textual representation is available.
    pub const NONE: Self = Self { value: None };

    /// Wraps a string.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }

    /// Returns the text, if any.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Opaque binding data handed to workers that bind outside this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBindingData {
    /// Schema version of this record.
    pub version: String,
    /// The extension that produced the data (e.g. `"AzureStorageBlobs"`).
    pub source: String,
    /// MIME type of `content`.
    pub content_type: String,
    /// Extension-defined payload.
    pub content: Vec<u8>,
}

impl ParameterBindingData {
    /// Current schema version.
    pub const VERSION: &'static str = "1.0";

    /// Creates binding data with the current version.
    pub fn new(
        source: impl Into<String>,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            source: source.into(),
            content_type: content_type.into(),
            content,
        }
    }
}

bindable!(String => TypeDesc::string());
bindable!(Vec<u8> => TypeDesc::bytes());
bindable!(JsonObject => TypeDesc::json_object());
bindable!(JsonArray => TypeDesc::json_array());
bindable!(DirectInvokeString => TypeDesc::direct_invoke_string());
bindable!(ParameterBindingData => TypeDesc::parameter_binding_data());
bindable!(Vec<String> => TypeDesc::array_of(TypeDesc::string()));
bindable!(Vec<Vec<u8>> => TypeDesc::array_of(TypeDesc::bytes()));
bindable!(Vec<JsonObject> => TypeDesc::array_of(TypeDesc::json_object()));
bindable!(Vec<ParameterBindingData> => TypeDesc::array_of(TypeDesc::parameter_binding_data()));

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Order {
        id: u64,
    }

    bindable!(Order);

    #[test]
    fn test_round_trip_custom_type() {
        let value = BoxedValue::new(Order { id: 7 });
        assert_eq!(value.type_desc(), &TypeDesc::named("Order"));
        assert!(value.is::<Order>());
        assert_eq!(value.take::<Order>().unwrap(), Order { id: 7 });
    }

    #[test]
    fn test_take_wrong_type() {
        let value = BoxedValue::new(String::from("hello"));
        let err = value.take::<Vec<u8>>().unwrap_err();
        assert!(matches!(err, ConvertError::TypeMismatch { .. }));
    }

    #[test]
    fn test_shared_value_is_cloned_out() {
        let value = BoxedValue::new(String::from("shared"));
        let other = value.clone();
        assert_eq!(value.take::<String>().unwrap(), "shared");
        assert_eq!(other.downcast_ref::<String>().map(String::as_str), Some("shared"));
    }

    #[test]
    fn test_generic_array() {
        let items = vec![BoxedValue::new(Order { id: 1 }), BoxedValue::new(Order { id: 2 })];
        let value = BoxedValue::array(TypeDesc::named("Order"), items);
        assert_eq!(value.type_desc().to_string(), "Order[]");
        assert_eq!(value.items().map(<[BoxedValue]>::len), Some(2));
    }

    #[test]
    fn test_direct_invoke_string_none() {
        assert_eq!(DirectInvokeString::NONE.as_str(), None);
        assert_eq!(DirectInvokeString::new("a/b").as_str(), Some("a/b"));
    }
}

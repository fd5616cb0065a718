//! Trigger attribute identity.
//!
//! An [`AttributeKind`] names the declaring annotation of a trigger parameter
//! (for example `"BlobTrigger"`) and scopes converter registrations. The
//! attribute *instance* attached to a parameter is exposed through the
//! [`TriggerAttribute`] capability trait and handed to every converter.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable identifier of a trigger attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeKind(Cow<'static, str>);

impl AttributeKind {
    /// Creates a kind from a static name.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a kind from any string.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the kind name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for AttributeKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for AttributeKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// An attribute instance attached to a trigger parameter.
///
/// Extensions implement this for their attribute types so converters can read
/// per-parameter settings (paths, connection names, ...) by downcasting.
pub trait TriggerAttribute: Any + Send + Sync + fmt::Debug {
    /// The kind this attribute belongs to.
    fn kind(&self) -> AttributeKind;

    /// Returns `self` as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn TriggerAttribute {
    /// Attempts to downcast to a concrete attribute type.
    pub fn downcast_ref<T: TriggerAttribute>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

/// Shared attribute instance, cloned into every converter call.
pub type SharedAttribute = Arc<dyn TriggerAttribute>;

/// An attribute that carries nothing but its kind.
///
/// Used when a parameter declares no attribute instance of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindAttribute(pub AttributeKind);

impl TriggerAttribute for KindAttribute {
    fn kind(&self) -> AttributeKind {
        self.0.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct QueueTrigger {
        queue: String,
    }

    impl TriggerAttribute for QueueTrigger {
        fn kind(&self) -> AttributeKind {
            AttributeKind::from_static("QueueTrigger")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_downcast_attribute() {
        let attr: SharedAttribute = Arc::new(QueueTrigger {
            queue: "orders".into(),
        });
        assert_eq!(attr.kind().as_str(), "QueueTrigger");
        let queue = attr.downcast_ref::<QueueTrigger>().map(|q| q.queue.as_str());
        assert_eq!(queue, Some("orders"));
        assert!(attr.downcast_ref::<KindAttribute>().is_none());
    }

    #[test]
    fn test_kind_equality() {
        assert_eq!(
            AttributeKind::from_static("BlobTrigger"),
            AttributeKind::new(String::from("BlobTrigger"))
        );
    }
}

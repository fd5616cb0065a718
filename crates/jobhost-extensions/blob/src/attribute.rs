use std::any::Any;

use jobhost_core::{AttributeKind, TriggerAttribute};

/// Attribute kind of blob trigger parameters.
pub const BLOB_TRIGGER: AttributeKind = AttributeKind::from_static("BlobTrigger");

/// Marks a parameter as bound to a blob trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobTriggerAttribute {
    /// `container/name` pattern the trigger watches.
    pub blob_path: String,
    /// Name of the storage connection setting.
    pub connection: Option<String>,
}

impl BlobTriggerAttribute {
    pub fn new(blob_path: impl Into<String>) -> Self {
        Self {
            blob_path: blob_path.into(),
            connection: None,
        }
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

impl TriggerAttribute for BlobTriggerAttribute {
    fn kind(&self) -> AttributeKind {
        BLOB_TRIGGER
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

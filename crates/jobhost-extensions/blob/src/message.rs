//! The blob trigger's native value.

use std::fmt;

use jobhost_core::{ConvertError, ConvertResult, bindable};
use serde::{Deserialize, Serialize};

/// Kind of blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobType {
    #[default]
    Unspecified,
    PageBlob,
    BlockBlob,
    AppendBlob,
}

/// Queued notification that a blob was written.
///
/// Serialized with a constant `"Type": "BlobTrigger"` tag:
///
/// ```json
/// {"Type":"BlobTrigger","FunctionId":"resize","BlobType":"BlockBlob",
///  "ContainerName":"images","BlobName":"a.png","ETag":"0x8D"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename = "BlobTrigger", rename_all = "PascalCase")]
pub struct BlobTriggerMessage {
    /// Function the notification is addressed to.
    #[serde(default)]
    pub function_id: String,
    #[serde(default)]
    pub blob_type: BlobType,
    pub container_name: String,
    pub blob_name: String,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
}

bindable!(BlobTriggerMessage);

impl BlobTriggerMessage {
    /// Creates a message for `container/name` with no function or ETag.
    pub fn new(container_name: impl Into<String>, blob_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            blob_name: blob_name.into(),
            ..Self::default()
        }
    }

    /// The blob's `container/name` path.
    pub fn path(&self) -> BlobPath {
        BlobPath {
            container_name: self.container_name.clone(),
            blob_name: self.blob_name.clone(),
        }
    }
}

/// A `container/name` blob address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath {
    pub container_name: String,
    pub blob_name: String,
}

impl BlobPath {
    /// Parses `container/name`. The name may contain further `/`s.
    pub fn parse(text: &str) -> ConvertResult<Self> {
        let invalid = || ConvertError::custom(format!("invalid blob path '{text}', expected 'container/name'"));

        let (container, name) = text.split_once('/').ok_or_else(invalid)?;
        if container.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            container_name: container.to_string(),
            blob_name: name.to_string(),
        })
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_name, self.blob_name)
    }
}

impl From<BlobPath> for BlobTriggerMessage {
    fn from(path: BlobPath) -> Self {
        Self::new(path.container_name, path.blob_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let message = BlobTriggerMessage {
            function_id: "resize".into(),
            blob_type: BlobType::BlockBlob,
            container_name: "images".into(),
            blob_name: "a.png".into(),
            etag: Some("0x8D".into()),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["Type"], "BlobTrigger");
        assert_eq!(json["FunctionId"], "resize");
        assert_eq!(json["BlobType"], "BlockBlob");
        assert_eq!(json["ContainerName"], "images");
        assert_eq!(json["BlobName"], "a.png");
        assert_eq!(json["ETag"], "0x8D");

        let parsed: BlobTriggerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_path_parse() {
        let path = BlobPath::parse("images/2024/a.png").unwrap();
        assert_eq!(path.container_name, "images");
        assert_eq!(path.blob_name, "2024/a.png");
        assert_eq!(path.to_string(), "images/2024/a.png");

        assert!(BlobPath::parse("images").is_err());
        assert!(BlobPath::parse("/a.png").is_err());
        assert!(BlobPath::parse("images/").is_err());
    }
}

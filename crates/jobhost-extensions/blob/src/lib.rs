//! # Jobhost Blob Extension
//!
//! Blob trigger support for the jobhost function host.
//!
//! ```rust,ignore
//! use jobhost_extension_blob::{BlobExtension, BlobTriggerAttribute};
//!
//! let host = JobHost::builder()
//!     .extension(BlobExtension)
//!     .function(
//!         FunctionDefinition::new("resize", resize).parameter(
//!             ParameterInfo::new("blob", TypeDesc::json_object())
//!                 .with_attribute(Arc::new(BlobTriggerAttribute::new("images/{name}"))),
//!         ),
//!     )
//!     .build()?;
//!
//! // Replays the function for an existing blob.
//! host.call("resize", HashMap::from([("blob".into(), BoxedValue::new("images/a.png".to_string()))]))
//!     .await?;
//! ```

mod attribute;
mod extension;
mod message;

pub use attribute::{BLOB_TRIGGER, BlobTriggerAttribute};
pub use extension::{BINDING_DATA_SOURCE, BlobExtension};
pub use message::{BlobPath, BlobTriggerMessage, BlobType};

//! # Jobhost Core
//!
//! The type-directed binding engine of the jobhost function host.
//!
//! A trigger produces one native value type (a blob notification, a queue
//! message, ...). Functions declare whatever parameter type they like. This
//! crate decides, deterministically, how to turn the one into the other.
//!
//! ## Building Blocks
//!
//! - **Type System**: [`TypeDesc`] descriptors with open type parameters,
//!   type-erased [`BoxedValue`]s and the [`Bindable`] trait
//! - **Converter Registry**: [`ConverterRegistry`] keyed by attribute kind,
//!   source type and destination type, with open (generic) entries
//! - **Default-Type Resolver**: [`resolve_default_type`] picks a concrete type
//!   for loose parameters (`object`, `object[]`)
//! - **Binding Rules**: [`BindingRules`] enumerates what a trigger can bind to
//! - **Exact Binding**: [`ExactBinding`] converts one trigger value per
//!   invocation, including the direct-invoke path over a plain string
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  TTrigger  ┌──────────────┐  lookup  ┌───────────────────┐
//! │  Listener   │───────────▶│ ExactBinding │─────────▶│ ConverterRegistry │
//! └─────────────┘            └──────────────┘◀─────────└───────────────────┘
//!                                   │ BoundValue
//!                                   ▼
//!                             user function
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jobhost_core::prelude::*;
//!
//! let mut builder = ConverterRegistry::builder();
//! builder.register_fn::<String, Vec<u8>, _>("QueueTrigger", |s| Ok(s.into_bytes()));
//! let registry = Arc::new(builder.build());
//!
//! let provider =
//!     TriggerAdapterBindingProvider::for_type::<String>("QueueTrigger", registry);
//! let parameter = ParameterInfo::new("body", TypeDesc::bytes());
//! let binding = provider
//!     .try_create(&BindingProviderContext::new("process", &parameter))?
//!     .expect("bytes are reachable from string");
//!
//! let bound = binding
//!     .bind(BoxedValue::new(String::from("hello")), &ConversionContext::new())
//!     .await?;
//! assert_eq!(bound.invoke_string.as_str(), Some("hello"));
//! ```

pub mod attribute;
pub mod binding;
pub mod context;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod rules;
pub mod types;
pub mod value;

pub use attribute::{AttributeKind, KindAttribute, SharedAttribute, TriggerAttribute};
pub use binding::{
    Binding, BindingProvider, BindingProviderContext, BoundValue, ExactBinding, ParameterDescriptor,
    ParameterInfo, TriggerAdapterBindingProvider,
};
pub use context::ConversionContext;
pub use error::{BindingError, BindingResult, ConvertError, ConvertResult};
pub use registry::{
    Converter, ConverterFuture, ConverterRegistry, ConverterRegistryBuilder, OpenConverterFactory,
    Scope,
};
pub use resolver::{default_batch_types, default_types, resolve_default_type};
pub use rules::{BindingRule, BindingRules};
pub use types::{TypeBindings, TypeDesc, names};
pub use value::{
    Bindable, BoxedValue, DirectInvokeString, JsonArray, JsonObject, ParameterBindingData,
};

pub use futures::future::BoxFuture;

/// Prelude for common imports.
pub mod prelude {
    pub use super::attribute::{AttributeKind, SharedAttribute, TriggerAttribute};
    pub use super::binding::{
        Binding, BindingProvider, BindingProviderContext, BoundValue, ParameterInfo,
        TriggerAdapterBindingProvider,
    };
    pub use super::context::ConversionContext;
    pub use super::error::{BindingError, ConvertError, ConvertResult};
    pub use super::registry::{Converter, ConverterRegistry, ConverterRegistryBuilder, Scope};
    pub use super::types::TypeDesc;
    pub use super::value::{
        Bindable, BoxedValue, DirectInvokeString, JsonArray, JsonObject, ParameterBindingData,
    };
}

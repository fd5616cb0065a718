//! Parameter binding.
//!
//! A [`BindingProvider`] decides at indexing time whether it can bind a
//! function parameter and, if so, builds a [`Binding`]. The binding is
//! immutable and shared; it is used once per invocation to turn the trigger
//! value into the parameter value.
//!
//! ```text
//! ParameterInfo ──try_create──▶ Arc<dyn Binding> ──bind(value)──▶ BoundValue
//! ```

mod exact;
mod provider;

pub use exact::ExactBinding;
pub use provider::TriggerAdapterBindingProvider;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::attribute::{AttributeKind, SharedAttribute};
use crate::context::ConversionContext;
use crate::error::BindingResult;
use crate::rules::BindingRules;
use crate::types::TypeDesc;
use crate::value::{BoxedValue, DirectInvokeString};

// =============================================================================
// Parameter metadata
// =============================================================================

/// A declared function parameter.
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    pub type_desc: TypeDesc,
    /// The trigger attribute on this parameter, if any.
    pub attribute: Option<SharedAttribute>,
    /// Whether the parameter is passed by reference (`out`/`ref` style).
    /// Trigger bindings never accept these.
    pub by_ref: bool,
}

impl ParameterInfo {
    /// Creates a plain parameter.
    pub fn new(name: impl Into<String>, type_desc: TypeDesc) -> Self {
        Self {
            name: name.into(),
            type_desc,
            attribute: None,
            by_ref: false,
        }
    }

    /// Attaches a trigger attribute.
    pub fn with_attribute(mut self, attribute: SharedAttribute) -> Self {
        self.attribute = Some(attribute);
        self
    }

    /// Marks the parameter as by-reference.
    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    /// The attribute kind, if an attribute is attached.
    pub fn attribute_kind(&self) -> Option<AttributeKind> {
        self.attribute.as_ref().map(|a| a.kind())
    }
}

/// What a provider sees when asked to bind a parameter.
#[derive(Debug, Clone, Copy)]
pub struct BindingProviderContext<'a> {
    /// Name of the function being indexed.
    pub function_name: &'a str,
    /// The parameter to bind.
    pub parameter: &'a ParameterInfo,
}

impl<'a> BindingProviderContext<'a> {
    /// Creates a context.
    pub fn new(function_name: &'a str, parameter: &'a ParameterInfo) -> Self {
        Self {
            function_name,
            parameter,
        }
    }
}

// =============================================================================
// Bound values
// =============================================================================

/// The result of one bind.
#[derive(Debug, Clone)]
pub struct BoundValue {
    /// The materialised parameter value.
    pub value: BoxedValue,
    /// The parameter type it was bound as.
    pub user_type: TypeDesc,
    /// Textual form of the trigger value, for replay and dashboards.
    pub invoke_string: DirectInvokeString,
}

/// Dashboard description of a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDescriptor {
    /// Parameter name.
    pub name: String,
    /// Rendered parameter type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Trigger attribute kind.
    pub attribute: AttributeKind,
}

// =============================================================================
// Traits
// =============================================================================

/// A built binding for one parameter.
#[async_trait]
pub trait Binding: Send + Sync + fmt::Debug {
    /// The parameter type this binding produces.
    fn user_type(&self) -> &TypeDesc;

    /// Converts one trigger value (or its direct-invoke string) into the
    /// parameter value.
    async fn bind(&self, value: BoxedValue, ctx: &ConversionContext) -> BindingResult<BoundValue>;

    /// Describes the parameter for dashboards.
    fn to_parameter_descriptor(&self) -> ParameterDescriptor;
}

/// Creates bindings for trigger parameters of one attribute kind.
pub trait BindingProvider: Send + Sync {
    /// The attribute kind this provider handles.
    fn attribute_kind(&self) -> &AttributeKind;

    /// The native value type the trigger produces.
    fn trigger_type(&self) -> &TypeDesc;

    /// Builds a binding, or returns `Ok(None)` to let another provider try.
    fn try_create(
        &self,
        ctx: &BindingProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn Binding>>>;

    /// Picks the concrete type to bind a loose `requested` type as.
    fn default_type(&self, requested: &TypeDesc) -> BindingResult<TypeDesc> {
        Ok(requested.clone())
    }

    /// Enumerates the parameter types this provider can bind.
    fn rules(&self) -> BindingRules;
}

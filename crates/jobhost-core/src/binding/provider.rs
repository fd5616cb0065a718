use std::sync::Arc;

use tracing::debug;

use super::{Binding, BindingProvider, BindingProviderContext, ExactBinding};
use crate::attribute::{AttributeKind, KindAttribute, SharedAttribute};
use crate::error::{BindingError, BindingResult};
use crate::registry::ConverterRegistry;
use crate::resolver::resolve_default_type;
use crate::rules::BindingRules;
use crate::types::TypeDesc;
use crate::value::Bindable;

/// Binds trigger parameters through the converter registry.
///
/// Every extension that produces a single native value type per trigger can
/// use this provider as is; the registry decides which parameter types are
/// reachable.
#[derive(Debug, Clone)]
pub struct TriggerAdapterBindingProvider {
    kind: AttributeKind,
    trigger_type: TypeDesc,
    registry: Arc<ConverterRegistry>,
    public: bool,
}

impl TriggerAdapterBindingProvider {
    /// Creates a provider for triggers of `kind` producing `trigger_type`.
    pub fn new(
        kind: impl Into<AttributeKind>,
        trigger_type: TypeDesc,
        registry: Arc<ConverterRegistry>,
    ) -> Self {
        Self {
            kind: kind.into(),
            trigger_type,
            registry,
            public: true,
        }
    }

    /// Creates a provider whose trigger type is `T`.
    pub fn for_type<T: Bindable>(
        kind: impl Into<AttributeKind>,
        registry: Arc<ConverterRegistry>,
    ) -> Self {
        Self::new(kind, T::type_desc(), registry)
    }

    /// Whether the trigger type itself is offered as a bindable type in
    /// [`rules`](BindingProvider::rules). Defaults to `true`.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// The registry this provider converts through.
    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }
}

impl BindingProvider for TriggerAdapterBindingProvider {
    fn attribute_kind(&self) -> &AttributeKind {
        &self.kind
    }

    fn trigger_type(&self) -> &TypeDesc {
        &self.trigger_type
    }

    fn try_create(
        &self,
        ctx: &BindingProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn Binding>>> {
        let parameter = ctx.parameter;

        if parameter.by_ref {
            debug!(
                function = ctx.function_name,
                parameter = %parameter.name,
                "Declining by-reference trigger parameter"
            );
            return Ok(None);
        }

        let attribute: SharedAttribute = match &parameter.attribute {
            Some(attr) if attr.kind() == self.kind => attr.clone(),
            Some(_) => return Ok(None),
            None => Arc::new(KindAttribute(self.kind.clone())),
        };

        let user_type = &parameter.type_desc;
        if user_type.is_parameter_binding_data()
            && !self
                .registry
                .has_converter(&self.kind, &self.trigger_type, user_type)
        {
            return Err(BindingError::configuration(
                &self.kind,
                &self.trigger_type,
                user_type,
            ));
        }

        let binding = ExactBinding::try_build(self, &parameter.name, attribute, user_type);
        if binding.is_none() {
            debug!(
                attribute = %self.kind,
                parameter = %parameter.name,
                source = %self.trigger_type,
                dest = %user_type,
                "No converter, declining"
            );
        }
        Ok(binding.map(|b| Arc::new(b) as Arc<dyn Binding>))
    }

    fn default_type(&self, requested: &TypeDesc) -> BindingResult<TypeDesc> {
        resolve_default_type(&self.registry, &self.kind, &self.trigger_type, requested)
    }

    fn rules(&self) -> BindingRules {
        BindingRules::new(
            self.kind.clone(),
            self.trigger_type.clone(),
            self.registry.clone(),
            self.public,
        )
    }
}

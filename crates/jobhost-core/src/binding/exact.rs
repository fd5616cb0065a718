use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use super::{Binding, BindingProvider, BoundValue, ParameterDescriptor, TriggerAdapterBindingProvider};
use crate::attribute::{AttributeKind, SharedAttribute};
use crate::context::ConversionContext;
use crate::error::{BindingError, BindingResult};
use crate::registry::Converter;
use crate::types::TypeDesc;
use crate::value::{Bindable, BoxedValue, DirectInvokeString};

/// A binding from one trigger value type to one concrete parameter type.
///
/// All converters are resolved when the binding is built; binding a value
/// performs no registry lookups and takes no locks.
pub struct ExactBinding {
    kind: AttributeKind,
    parameter: String,
    trigger_type: TypeDesc,
    user_type: TypeDesc,
    attribute: SharedAttribute,
    forward: Converter,
    /// `string -> trigger`, used when the host is invoked by hand.
    direct_invoker: Option<Converter>,
    /// `trigger -> DirectInvokeString`. Always present; may yield `NONE`.
    invoke_string: Converter,
}

impl ExactBinding {
    /// Builds the binding, or returns `None` when the registry has no
    /// converter from the trigger type to `user_type`.
    pub fn try_build(
        provider: &TriggerAdapterBindingProvider,
        parameter: &str,
        attribute: SharedAttribute,
        user_type: &TypeDesc,
    ) -> Option<Self> {
        let registry = provider.registry();
        let kind = provider.attribute_kind();
        let trigger = provider.trigger_type();

        let forward = registry.lookup(kind, trigger, user_type)?;

        let direct_invoker = registry
            .lookup(kind, &TypeDesc::direct_invoke_string(), trigger)
            .map(|from_invoke_string| {
                Converter::new(move |value: BoxedValue, attr, ctx| {
                    let converter = from_invoke_string.clone();
                    async move {
                        let text = value.take::<String>()?;
                        converter
                            .convert(DirectInvokeString::new(text).into_value(), attr, ctx)
                            .await
                    }
                })
            })
            .or_else(|| registry.lookup(kind, &TypeDesc::string(), trigger));

        let invoke_string = registry
            .lookup(kind, trigger, &TypeDesc::direct_invoke_string())
            .or_else(|| {
                registry
                    .lookup(kind, trigger, &TypeDesc::string())
                    .map(|to_string| {
                        Converter::new(move |value, attr, ctx| {
                            let converter = to_string.clone();
                            async move {
                                let text = converter.convert(value, attr, ctx).await?;
                                Ok(DirectInvokeString::new(text.take::<String>()?).into_value())
                            }
                        })
                    })
            })
            .unwrap_or_else(|| Converter::from_sync(|_, _| Ok(DirectInvokeString::NONE.into_value())));

        Some(Self {
            kind: kind.clone(),
            parameter: parameter.to_string(),
            trigger_type: trigger.clone(),
            user_type: user_type.clone(),
            attribute,
            forward,
            direct_invoker,
            invoke_string,
        })
    }

    /// The trigger value type this binding accepts.
    pub fn trigger_type(&self) -> &TypeDesc {
        &self.trigger_type
    }

    /// Whether a plain string can stand in for the trigger value.
    pub fn supports_direct_invoke(&self) -> bool {
        self.direct_invoker.is_some()
    }

    async fn run(
        &self,
        converter: &Converter,
        value: BoxedValue,
        source: &TypeDesc,
        dest: &TypeDesc,
        ctx: &ConversionContext,
    ) -> BindingResult<BoxedValue> {
        if ctx.is_cancelled() {
            return Err(BindingError::Cancelled);
        }

        let conversion = converter.convert(value, self.attribute.clone(), ctx.clone());
        tokio::select! {
            biased;
            () = ctx.cancellation().cancelled() => Err(BindingError::Cancelled),
            result = conversion => {
                result.map_err(|e| BindingError::conversion(&self.kind, source, dest, e))
            }
        }
    }

    /// Normalises the incoming value to the trigger type.
    async fn trigger_value(
        &self,
        value: BoxedValue,
        ctx: &ConversionContext,
    ) -> BindingResult<BoxedValue> {
        if value.type_desc() == &self.trigger_type {
            return Ok(value);
        }

        let text = match value.downcast_ref::<DirectInvokeString>() {
            Some(invoke) => invoke.as_str().map(str::to_owned),
            None => value.downcast_ref::<String>().cloned(),
        };

        match (text, &self.direct_invoker) {
            (Some(text), Some(invoker)) => {
                let string = TypeDesc::string();
                self.run(invoker, text.into_value(), &string, &self.trigger_type, ctx)
                    .await
            }
            _ => Err(BindingError::InternalConsistency {
                attribute: self.kind.clone(),
                expected: self.trigger_type.clone(),
                got: value.type_desc().clone(),
            }),
        }
    }
}

#[async_trait]
impl Binding for ExactBinding {
    fn user_type(&self) -> &TypeDesc {
        &self.user_type
    }

    async fn bind(&self, value: BoxedValue, ctx: &ConversionContext) -> BindingResult<BoundValue> {
        let trigger_value = self.trigger_value(value, ctx).await?;

        let converted = self
            .run(
                &self.forward,
                trigger_value.clone(),
                &self.trigger_type,
                &self.user_type,
                ctx,
            )
            .await?;

        let invoke_string = match self
            .invoke_string
            .convert(trigger_value, self.attribute.clone(), ctx.clone())
            .await
            .and_then(|v| v.take::<DirectInvokeString>())
        {
            Ok(invoke_string) => invoke_string,
            Err(e) => {
                debug!(
                    attribute = %self.kind,
                    parameter = %self.parameter,
                    error = %e,
                    "Invoke string unavailable"
                );
                DirectInvokeString::NONE
            }
        };

        Ok(BoundValue {
            value: converted,
            user_type: self.user_type.clone(),
            invoke_string,
        })
    }

    fn to_parameter_descriptor(&self) -> ParameterDescriptor {
        ParameterDescriptor {
            name: self.parameter.clone(),
            type_name: self.user_type.to_string(),
            attribute: self.kind.clone(),
        }
    }
}

impl fmt::Debug for ExactBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExactBinding")
            .field("attribute", &self.kind)
            .field("parameter", &self.parameter)
            .field("trigger_type", &self.trigger_type.to_string())
            .field("user_type", &self.user_type.to_string())
            .field("direct_invoke", &self.direct_invoker.is_some())
            .finish_non_exhaustive()
    }
}

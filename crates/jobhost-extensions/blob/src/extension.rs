use std::sync::Arc;

use jobhost_core::{
    Bindable, BindingProvider, BoxedValue, ConvertError, ConvertResult, Converter,
    ConverterRegistry, ConverterRegistryBuilder, DirectInvokeString, JsonObject,
    ParameterBindingData, SharedAttribute, TriggerAdapterBindingProvider, TypeDesc,
};
use jobhost_runtime::Extension;
use serde::Serialize;
use serde_json::Value;

use crate::attribute::{BLOB_TRIGGER, BlobTriggerAttribute};
use crate::message::{BlobPath, BlobTriggerMessage};

/// `source` of the binding data handed to out-of-process workers.
pub const BINDING_DATA_SOURCE: &str = "AzureStorageBlobs";

const BINDING_DATA_CONTENT_TYPE: &str = "application/json";

/// Registers the blob trigger.
///
/// A [`BlobTriggerMessage`] binds to `string` and `byte[]` (its JSON),
/// `JsonObject`, `ParameterBindingData` and the message itself. Manual
/// invocation accepts `container/name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobExtension;

impl Extension for BlobExtension {
    fn name(&self) -> &str {
        "blob"
    }

    fn register_converters(&self, builder: &mut ConverterRegistryBuilder) {
        builder
            .register_fn::<BlobTriggerMessage, String, _>(BLOB_TRIGGER, |message| {
                Ok(serde_json::to_string(&message)?)
            })
            .register_fn::<BlobTriggerMessage, Vec<u8>, _>(BLOB_TRIGGER, |message| {
                Ok(serde_json::to_vec(&message)?)
            })
            .register_fn::<BlobTriggerMessage, JsonObject, _>(BLOB_TRIGGER, to_json_object)
            .register_fn::<BlobTriggerMessage, DirectInvokeString, _>(BLOB_TRIGGER, |message| {
                Ok(DirectInvokeString::new(message.path().to_string()))
            })
            .register_fn::<DirectInvokeString, BlobTriggerMessage, _>(BLOB_TRIGGER, |invoke| {
                let text = invoke
                    .as_str()
                    .ok_or_else(|| ConvertError::custom("empty direct-invoke string"))?;
                Ok(BlobPath::parse(text)?.into())
            })
            .register(
                BLOB_TRIGGER,
                BlobTriggerMessage::type_desc(),
                TypeDesc::parameter_binding_data(),
                Converter::from_sync(to_binding_data),
            );
    }

    fn trigger_providers(&self, registry: &Arc<ConverterRegistry>) -> Vec<Arc<dyn BindingProvider>> {
        vec![Arc::new(TriggerAdapterBindingProvider::for_type::<
            BlobTriggerMessage,
        >(BLOB_TRIGGER, registry.clone()))]
    }
}

fn to_json_object(message: BlobTriggerMessage) -> ConvertResult<JsonObject> {
    match serde_json::to_value(&message)? {
        Value::Object(object) => Ok(object),
        other => Err(ConvertError::mismatch("JsonObject", other.to_string())),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BlobBindingContent<'a> {
    connection: Option<&'a str>,
    container_name: &'a str,
    blob_name: &'a str,
}

fn to_binding_data(value: BoxedValue, attribute: &SharedAttribute) -> ConvertResult<BoxedValue> {
    let message: BlobTriggerMessage = value.take()?;
    let connection = attribute
        .downcast_ref::<BlobTriggerAttribute>()
        .and_then(|a| a.connection.as_deref());

    let content = serde_json::to_vec(&BlobBindingContent {
        connection,
        container_name: &message.container_name,
        blob_name: &message.blob_name,
    })?;
    Ok(ParameterBindingData::new(BINDING_DATA_SOURCE, BINDING_DATA_CONTENT_TYPE, content).into_value())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use jobhost_core::ParameterInfo;
    use jobhost_runtime::{FunctionArguments, FunctionDefinition, HostConfig, HostError, JobHost};
    use parking_lot::Mutex;
    use tokio_test::assert_ok;

    use super::*;
    use crate::message::BlobType;

    fn message() -> BlobTriggerMessage {
        BlobTriggerMessage {
            function_id: "resize".into(),
            blob_type: BlobType::BlockBlob,
            container_name: "images".into(),
            blob_name: "a.png".into(),
            etag: Some("0x8D".into()),
        }
    }

    fn blob_parameter(name: &str, type_desc: TypeDesc) -> ParameterInfo {
        ParameterInfo::new(name, type_desc).with_attribute(Arc::new(
            BlobTriggerAttribute::new("images/{name}").with_connection("Storage"),
        ))
    }

    /// Builds a host with one function that stores its `blob` argument.
    fn build_host(type_desc: TypeDesc) -> (JobHost, Arc<Mutex<Option<BoxedValue>>>) {
        let seen = Arc::new(Mutex::new(None));
        let recorded = seen.clone();
        let mut config = HostConfig::default();
        config.aggregator.enabled = false;

        let host = JobHost::builder()
            .config(config)
            .extension(BlobExtension)
            .function(
                FunctionDefinition::new("run", move |mut args, _| {
                    let recorded = recorded.clone();
                    async move {
                        *recorded.lock() = args.remove("blob");
                        Ok(())
                    }
                })
                .parameter(blob_parameter("blob", type_desc)),
            )
            .build()
            .unwrap();
        (host, seen)
    }

    fn blob_args(value: BoxedValue) -> FunctionArguments {
        HashMap::from([("blob".to_string(), value)])
    }

    #[tokio::test]
    async fn test_binds_json_string() {
        let (host, seen) = build_host(TypeDesc::string());
        assert_ok!(host.call("run", blob_args(message().into_value())).await);

        let text: String = seen.lock().take().unwrap().take().unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["Type"], "BlobTrigger");
        assert_eq!(json["BlobName"], "a.png");
    }

    #[tokio::test]
    async fn test_binds_bytes_and_json_object() {
        let (host, seen) = build_host(TypeDesc::bytes());
        assert_ok!(host.call("run", blob_args(message().into_value())).await);
        let bytes: Vec<u8> = seen.lock().take().unwrap().take().unwrap();
        assert_eq!(bytes, serde_json::to_vec(&message()).unwrap());

        let (host, seen) = build_host(TypeDesc::json_object());
        assert_ok!(host.call("run", blob_args(message().into_value())).await);
        let object: JsonObject = seen.lock().take().unwrap().take().unwrap();
        assert_eq!(object["ContainerName"], "images");
    }

    #[tokio::test]
    async fn test_binds_parameter_binding_data() {
        let (host, seen) = build_host(TypeDesc::parameter_binding_data());
        assert_ok!(host.call("run", blob_args(message().into_value())).await);

        let data: ParameterBindingData = seen.lock().take().unwrap().take().unwrap();
        assert_eq!(data.source, BINDING_DATA_SOURCE);
        assert_eq!(data.content_type, "application/json");
        let content: Value = serde_json::from_slice(&data.content).unwrap();
        assert_eq!(content["Connection"], "Storage");
        assert_eq!(content["ContainerName"], "images");
        assert_eq!(content["BlobName"], "a.png");
    }

    #[tokio::test]
    async fn test_direct_invoke_with_blob_path() {
        let (host, seen) = build_host(BlobTriggerMessage::type_desc());
        let by_path = BoxedValue::new(String::from("images/2024/b.png"));
        assert_ok!(host.call("run", blob_args(by_path)).await);

        let bound: BlobTriggerMessage = seen.lock().take().unwrap().take().unwrap();
        assert_eq!(bound.container_name, "images");
        assert_eq!(bound.blob_name, "2024/b.png");
        assert_eq!(bound.etag, None);
    }

    #[tokio::test]
    async fn test_direct_invoke_rejects_bad_path() {
        let (host, seen) = build_host(TypeDesc::string());
        let result = host
            .call("run", blob_args(BoxedValue::new(String::from("no-slash"))))
            .await;
        assert!(matches!(result, Err(HostError::Binding(_))));
        assert!(seen.lock().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_type_has_no_provider() {
        let mut config = HostConfig::default();
        config.aggregator.enabled = false;
        let result = JobHost::builder()
            .config(config)
            .extension(BlobExtension)
            .function(
                FunctionDefinition::new("run", |_, _| async { Ok(()) })
                    .parameter(blob_parameter("blob", TypeDesc::named("Stream"))),
            )
            .build();
        assert!(matches!(result, Err(HostError::NoBindingProvider { .. })));
    }

    #[test]
    fn test_rules_list_reachable_types() {
        let mut builder = ConverterRegistry::builder();
        BlobExtension.register_converters(&mut builder);
        let registry = Arc::new(builder.build());
        let providers = BlobExtension.trigger_providers(&registry);

        let types: Vec<TypeDesc> = providers[0].rules().map(|rule| rule.user_type).collect();
        assert_eq!(types[0], BlobTriggerMessage::type_desc());
        assert!(types.contains(&TypeDesc::string()));
        assert!(types.contains(&TypeDesc::bytes()));
        assert!(types.contains(&TypeDesc::json_object()));
        assert!(types.contains(&TypeDesc::parameter_binding_data()));
    }
}

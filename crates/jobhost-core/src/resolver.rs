//! Default-type resolution.
//!
//! When a function declares a loose parameter type (`object`, `object[]`, or
//! an array the trigger cannot produce directly), the host picks a concrete
//! type to materialise instead. Candidates are tried in a fixed order and the
//! first one the trigger value converts to wins.

use std::sync::LazyLock;

use tracing::trace;

use crate::attribute::AttributeKind;
use crate::error::{BindingError, BindingResult};
use crate::registry::ConverterRegistry;
use crate::types::TypeDesc;

static DEFAULT_TYPES: LazyLock<[TypeDesc; 4]> = LazyLock::new(|| {
    [
        TypeDesc::bytes(),
        TypeDesc::json_object(),
        TypeDesc::json_array(),
        TypeDesc::string(),
    ]
});

static DEFAULT_BATCH_TYPES: LazyLock<[TypeDesc; 4]> = LazyLock::new(|| {
    [
        TypeDesc::array_of(TypeDesc::bytes()),
        TypeDesc::array_of(TypeDesc::json_object()),
        TypeDesc::json_array(),
        TypeDesc::array_of(TypeDesc::string()),
    ]
});

/// Candidates for single-item parameters, in precedence order.
pub fn default_types() -> &'static [TypeDesc] {
    DEFAULT_TYPES.as_slice()
}

/// Candidates for batch (array) parameters, in precedence order.
pub fn default_batch_types() -> &'static [TypeDesc] {
    DEFAULT_BATCH_TYPES.as_slice()
}

/// Picks the concrete type to materialise for `requested`.
///
/// `ParameterBindingData` (single or array) is never substituted: it needs a
/// direct converter from `trigger` or the call fails with
/// [`BindingError::Configuration`]. Otherwise the first candidate reachable
/// from `trigger` is returned, falling back to `object` or `object[]`.
pub fn resolve_default_type(
    registry: &ConverterRegistry,
    kind: &AttributeKind,
    trigger: &TypeDesc,
    requested: &TypeDesc,
) -> BindingResult<TypeDesc> {
    if requested.is_parameter_binding_data() {
        return if registry.has_converter(kind, trigger, requested) {
            Ok(requested.clone())
        } else {
            Err(BindingError::configuration(kind, trigger, requested))
        };
    }

    let batch = requested.is_array() && !default_types().contains(requested);
    let candidates = if batch {
        default_batch_types()
    } else {
        default_types()
    };

    if let Some(found) = candidates
        .iter()
        .find(|candidate| registry.has_converter(kind, trigger, candidate))
    {
        trace!(attribute = %kind, requested = %requested, resolved = %found, "Resolved default type");
        return Ok(found.clone());
    }

    Ok(if requested.is_array() {
        TypeDesc::object_array()
    } else {
        TypeDesc::object()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Converter;

    const BLOB: AttributeKind = AttributeKind::from_static("BlobTrigger");

    fn message() -> TypeDesc {
        TypeDesc::named("BlobTriggerMessage")
    }

    fn registry_with(dests: &[TypeDesc]) -> ConverterRegistry {
        let mut builder = ConverterRegistry::builder();
        for dest in dests {
            builder.register(BLOB, message(), dest.clone(), Converter::identity());
        }
        builder.build()
    }

    #[test]
    fn test_single_item_precedence() {
        let registry = registry_with(&[TypeDesc::string(), TypeDesc::json_object()]);
        let resolved = resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object());
        assert_eq!(resolved.unwrap(), TypeDesc::json_object());

        let registry = registry_with(&[TypeDesc::string(), TypeDesc::bytes()]);
        let resolved = resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object());
        assert_eq!(resolved.unwrap(), TypeDesc::bytes());
    }

    #[test]
    fn test_bytes_request_uses_single_item_list() {
        let registry = registry_with(&[TypeDesc::string()]);
        let resolved = resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::bytes());
        assert_eq!(resolved.unwrap(), TypeDesc::string());
    }

    #[test]
    fn test_array_request_uses_batch_list() {
        let registry = registry_with(&[
            TypeDesc::string(),
            TypeDesc::array_of(TypeDesc::string()),
            TypeDesc::json_array(),
        ]);
        let resolved =
            resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object_array());
        assert_eq!(resolved.unwrap(), TypeDesc::json_array());
    }

    #[test]
    fn test_fallback_to_object() {
        let registry = registry_with(&[]);
        let single = resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object());
        assert_eq!(single.unwrap(), TypeDesc::object());

        let batch = resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object_array());
        assert_eq!(batch.unwrap(), TypeDesc::object_array());
    }

    #[test]
    fn test_parameter_binding_data_requires_converter() {
        let pbd = TypeDesc::parameter_binding_data();

        let registry = registry_with(&[TypeDesc::string()]);
        let err = resolve_default_type(&registry, &BLOB, &message(), &pbd).unwrap_err();
        assert!(matches!(err, BindingError::Configuration { .. }));
        assert!(err.is_fatal());

        let registry = registry_with(&[pbd.clone()]);
        let resolved = resolve_default_type(&registry, &BLOB, &message(), &pbd);
        assert_eq!(resolved.unwrap(), pbd);

        let pbd_array = TypeDesc::array_of(TypeDesc::parameter_binding_data());
        let err = resolve_default_type(&registry, &BLOB, &message(), &pbd_array).unwrap_err();
        assert!(matches!(err, BindingError::Configuration { .. }));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = registry_with(&[TypeDesc::json_object(), TypeDesc::string()]);
        let first = resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object()).unwrap();
        for _ in 0..10 {
            let again =
                resolve_default_type(&registry, &BLOB, &message(), &TypeDesc::object()).unwrap();
            assert_eq!(again, first);
        }
    }
}

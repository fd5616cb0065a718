//! Converter registry.
//!
//! Converters are registered once at startup through a
//! [`ConverterRegistryBuilder`] and looked up by
//! `(attribute kind, source type, destination type)`. The built
//! [`ConverterRegistry`] is immutable and shared through `Arc`, so lookups
//! during invocation take no locks.
//!
//! ## Lookup order
//!
//! 1. Exact pair registered for the attribute kind.
//! 2. Exact pair registered for [`Scope::Any`].
//! 3. Open entries for the attribute kind, in registration order. The first
//!    entry whose source and destination patterns both match wins; its
//!    factory receives the resolved [`TypeBindings`].
//! 4. Open entries for [`Scope::Any`], in registration order.
//! 5. Identity, when `source == dest` or `dest` is `object`.
//!
//! There is no transitive composition: a lookup never chains converters.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tracing::debug;

use crate::attribute::{AttributeKind, SharedAttribute};
use crate::context::ConversionContext;
use crate::error::ConvertResult;
use crate::types::{TypeBindings, TypeDesc};
use crate::value::{Bindable, BoxedValue};

// =============================================================================
// Converter
// =============================================================================

/// Future returned by a converter.
pub type ConverterFuture = BoxFuture<'static, ConvertResult<BoxedValue>>;

type ConverterFn =
    dyn Fn(BoxedValue, SharedAttribute, ConversionContext) -> ConverterFuture + Send + Sync;

/// A conversion function between two types.
///
/// Cheap to clone; the function itself is shared.
#[derive(Clone)]
pub struct Converter {
    inner: Arc<ConverterFn>,
}

impl Converter {
    /// Wraps an async conversion function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(BoxedValue, SharedAttribute, ConversionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConvertResult<BoxedValue>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |value, attr, ctx| f(value, attr, ctx).boxed()),
        }
    }

    /// Wraps a synchronous conversion function.
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(BoxedValue, &SharedAttribute) -> ConvertResult<BoxedValue> + Send + Sync + 'static,
    {
        Self::new(move |value, attr, _| future::ready(f(value, &attr)))
    }

    /// Returns the value unchanged.
    pub fn identity() -> Self {
        Self::new(|value, _, _| future::ready(Ok(value)))
    }

    /// Runs the conversion.
    pub fn convert(
        &self,
        value: BoxedValue,
        attribute: SharedAttribute,
        ctx: ConversionContext,
    ) -> ConverterFuture {
        (self.inner)(value, attribute, ctx)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").finish_non_exhaustive()
    }
}

/// Builds a specialised converter for an open registration.
pub type OpenConverterFactory = Arc<dyn Fn(&TypeBindings) -> Converter + Send + Sync>;

// =============================================================================
// Scope
// =============================================================================

/// Which attribute kinds a registration applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Only the given attribute kind.
    Attribute(AttributeKind),
    /// Every attribute kind. Consulted after kind-specific entries.
    Any,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(kind) => write!(f, "{kind}"),
            Self::Any => f.write_str("*"),
        }
    }
}

impl From<AttributeKind> for Scope {
    fn from(kind: AttributeKind) -> Self {
        Self::Attribute(kind)
    }
}

impl From<&AttributeKind> for Scope {
    fn from(kind: &AttributeKind) -> Self {
        Self::Attribute(kind.clone())
    }
}

impl From<&'static str> for Scope {
    fn from(kind: &'static str) -> Self {
        Self::Attribute(AttributeKind::from_static(kind))
    }
}

// =============================================================================
// Entries
// =============================================================================

enum EntryKind {
    Exact(Converter),
    Open(OpenConverterFactory),
}

struct Entry {
    scope: Scope,
    source: TypeDesc,
    dest: TypeDesc,
    kind: EntryKind,
}

type ExactKey = (Scope, TypeDesc, TypeDesc);

// =============================================================================
// Builder
// =============================================================================

/// Collects converter registrations.
#[derive(Default)]
pub struct ConverterRegistryBuilder {
    entries: Vec<Entry>,
    exact: HashMap<ExactKey, usize>,
}

impl ConverterRegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a converter for an exact `(source, dest)` pair.
    ///
    /// Registering the same triple again replaces the earlier converter but
    /// keeps its position in registration order.
    pub fn register(
        &mut self,
        scope: impl Into<Scope>,
        source: TypeDesc,
        dest: TypeDesc,
        converter: Converter,
    ) -> &mut Self {
        let scope = scope.into();
        let key = (scope.clone(), source.clone(), dest.clone());

        if let Some(&index) = self.exact.get(&key) {
            debug!(scope = %scope, source = %source, dest = %dest, "Replacing converter");
            self.entries[index].kind = EntryKind::Exact(converter);
            return self;
        }

        self.exact.insert(key, self.entries.len());
        self.entries.push(Entry {
            scope,
            source,
            dest,
            kind: EntryKind::Exact(converter),
        });
        self
    }

    /// Registers a synchronous typed converter from `S` to `D`.
    pub fn register_fn<S, D, F>(&mut self, scope: impl Into<Scope>, f: F) -> &mut Self
    where
        S: Bindable,
        D: Bindable,
        F: Fn(S) -> ConvertResult<D> + Send + Sync + 'static,
    {
        let converter = Converter::from_sync(move |value, _| {
            S::from_value(value).and_then(&f).map(Bindable::into_value)
        });
        self.register(scope, S::type_desc(), D::type_desc(), converter)
    }

    /// Registers an async typed converter from `S` to `D`.
    ///
    /// The function also receives the attribute instance and the context.
    pub fn register_async<S, D, F, Fut>(&mut self, scope: impl Into<Scope>, f: F) -> &mut Self
    where
        S: Bindable,
        D: Bindable,
        F: Fn(S, SharedAttribute, ConversionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConvertResult<D>> + Send + 'static,
    {
        let f = Arc::new(f);
        let converter = Converter::new(move |value, attr, ctx| {
            let f = f.clone();
            async move {
                let source = S::from_value(value)?;
                f(source, attr, ctx).await.map(Bindable::into_value)
            }
        });
        self.register(scope, S::type_desc(), D::type_desc(), converter)
    }

    /// Registers an open converter.
    ///
    /// `source` and `dest` may contain type parameters. On lookup, both are
    /// matched against the concrete pair with one consistent binding per
    /// parameter name, and `factory` is called with the bindings.
    pub fn register_open<F>(
        &mut self,
        scope: impl Into<Scope>,
        source: TypeDesc,
        dest: TypeDesc,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&TypeBindings) -> Converter + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            scope: scope.into(),
            source,
            dest,
            kind: EntryKind::Open(Arc::new(factory)),
        });
        self
    }

    /// Freezes the registrations.
    pub fn build(self) -> ConverterRegistry {
        debug!(entries = self.entries.len(), "Converter registry built");
        ConverterRegistry {
            entries: self.entries,
            exact: self.exact,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Immutable converter lookup table.
pub struct ConverterRegistry {
    entries: Vec<Entry>,
    exact: HashMap<ExactKey, usize>,
}

impl ConverterRegistry {
    /// Starts a new builder.
    pub fn builder() -> ConverterRegistryBuilder {
        ConverterRegistryBuilder::new()
    }

    /// Finds the converter for `source -> dest` under `kind`.
    pub fn lookup(
        &self,
        kind: &AttributeKind,
        source: &TypeDesc,
        dest: &TypeDesc,
    ) -> Option<Converter> {
        let scoped = Scope::Attribute(kind.clone());

        for scope in [&scoped, &Scope::Any] {
            let key = (scope.clone(), source.clone(), dest.clone());
            if let Some(&index) = self.exact.get(&key)
                && let EntryKind::Exact(converter) = &self.entries[index].kind
            {
                return Some(converter.clone());
            }
        }

        for scope in [&scoped, &Scope::Any] {
            if let Some(converter) = self.lookup_open(scope, source, dest) {
                return Some(converter);
            }
        }

        (source == dest || dest.is_object()).then(Converter::identity)
    }

    fn lookup_open(&self, scope: &Scope, source: &TypeDesc, dest: &TypeDesc) -> Option<Converter> {
        self.entries
            .iter()
            .filter(|entry| entry.scope == *scope)
            .find_map(|entry| {
                let EntryKind::Open(factory) = &entry.kind else {
                    return None;
                };
                let mut bindings = TypeBindings::new();
                (entry.source.matches(source, &mut bindings)
                    && entry.dest.matches(dest, &mut bindings))
                .then(|| factory(&bindings))
            })
    }

    /// Returns `true` when [`lookup`](Self::lookup) would find a converter.
    pub fn has_converter(&self, kind: &AttributeKind, source: &TypeDesc, dest: &TypeDesc) -> bool {
        self.lookup(kind, source, dest).is_some()
    }

    /// Lists every destination one registered converter reaches from `source`.
    ///
    /// Registration order, duplicates removed. Open destinations are
    /// specialised as far as the source match allows and may stay open.
    /// Identity is not listed.
    pub fn possible_destinations(&self, kind: &AttributeKind, source: &TypeDesc) -> Vec<TypeDesc> {
        let mut out: Vec<TypeDesc> = Vec::new();

        for entry in &self.entries {
            let in_scope = match &entry.scope {
                Scope::Attribute(k) => k == kind,
                Scope::Any => true,
            };
            if !in_scope {
                continue;
            }

            let dest = match entry.kind {
                EntryKind::Exact(_) if entry.source == *source => entry.dest.clone(),
                EntryKind::Open(_) => {
                    let mut bindings = TypeBindings::new();
                    if !entry.source.matches(source, &mut bindings) {
                        continue;
                    }
                    entry.dest.substitute(&bindings)
                }
                EntryKind::Exact(_) => continue,
            };

            if !out.contains(&dest) {
                out.push(dest);
            }
        }

        out
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::KindAttribute;
    use crate::error::ConvertError;
    use crate::value::JsonObject;

    const QUEUE: AttributeKind = AttributeKind::from_static("QueueTrigger");

    fn attr() -> SharedAttribute {
        Arc::new(KindAttribute(QUEUE))
    }

    async fn run(converter: Converter, value: BoxedValue) -> ConvertResult<BoxedValue> {
        converter.convert(value, attr(), ConversionContext::new()).await
    }

    fn tagged(text: &'static str) -> Converter {
        Converter::from_sync(move |_, _| Ok(BoxedValue::new(String::from(text))))
    }

    #[tokio::test]
    async fn test_typed_converter() {
        let mut builder = ConverterRegistry::builder();
        builder.register_fn::<String, Vec<u8>, _>(QUEUE, |s| Ok(s.into_bytes()));
        let registry = builder.build();

        let converter = registry
            .lookup(&QUEUE, &TypeDesc::string(), &TypeDesc::bytes())
            .unwrap();
        let out = run(converter, BoxedValue::new(String::from("hi"))).await.unwrap();
        assert_eq!(out.type_desc(), &TypeDesc::bytes());
        assert_eq!(out.take::<Vec<u8>>().unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_typed_converter_rejects_wrong_source() {
        let mut builder = ConverterRegistry::builder();
        builder.register_fn::<String, Vec<u8>, _>(QUEUE, |s| Ok(s.into_bytes()));
        let registry = builder.build();

        let converter = registry
            .lookup(&QUEUE, &TypeDesc::string(), &TypeDesc::bytes())
            .unwrap();
        let err = run(converter, BoxedValue::new(JsonObject::new())).await.unwrap_err();
        assert!(matches!(err, ConvertError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_kind_scope_beats_any_scope() {
        let mut builder = ConverterRegistry::builder();
        builder
            .register(Scope::Any, TypeDesc::string(), TypeDesc::bytes(), tagged("any"))
            .register(QUEUE, TypeDesc::string(), TypeDesc::bytes(), tagged("queue"));
        let registry = builder.build();

        let converter = registry
            .lookup(&QUEUE, &TypeDesc::string(), &TypeDesc::bytes())
            .unwrap();
        let out = run(converter, BoxedValue::new(String::new())).await.unwrap();
        assert_eq!(out.take::<String>().unwrap(), "queue");

        let other = AttributeKind::from_static("TimerTrigger");
        let converter = registry
            .lookup(&other, &TypeDesc::string(), &TypeDesc::bytes())
            .unwrap();
        let out = run(converter, BoxedValue::new(String::new())).await.unwrap();
        assert_eq!(out.take::<String>().unwrap(), "any");
    }

    #[tokio::test]
    async fn test_exact_beats_open() {
        let order_array = TypeDesc::array_of(TypeDesc::named("Order"));

        let mut builder = ConverterRegistry::builder();
        builder
            .register_open(
                QUEUE,
                TypeDesc::string(),
                TypeDesc::array_of(TypeDesc::param("T")),
                |_| tagged("open"),
            )
            .register(QUEUE, TypeDesc::string(), order_array.clone(), tagged("exact"));
        let registry = builder.build();

        let converter = registry.lookup(&QUEUE, &TypeDesc::string(), &order_array).unwrap();
        let out = run(converter, BoxedValue::new(String::new())).await.unwrap();
        assert_eq!(out.take::<String>().unwrap(), "exact");

        let other_array = TypeDesc::array_of(TypeDesc::named("Invoice"));
        let converter = registry.lookup(&QUEUE, &TypeDesc::string(), &other_array).unwrap();
        let out = run(converter, BoxedValue::new(String::new())).await.unwrap();
        assert_eq!(out.take::<String>().unwrap(), "open");
    }

    #[tokio::test]
    async fn test_open_factory_receives_bindings() {
        let mut builder = ConverterRegistry::builder();
        builder.register_open(
            QUEUE,
            TypeDesc::string(),
            TypeDesc::array_of(TypeDesc::param("T")),
            |bindings| {
                let elem = bindings.get("T").cloned().unwrap_or_else(TypeDesc::object);
                Converter::from_sync(move |value, _| {
                    Ok(BoxedValue::array(elem.clone(), vec![value]))
                })
            },
        );
        let registry = builder.build();

        let dest = TypeDesc::array_of(TypeDesc::named("Order"));
        let converter = registry.lookup(&QUEUE, &TypeDesc::string(), &dest).unwrap();
        let out = run(converter, BoxedValue::new(String::from("x"))).await.unwrap();
        assert_eq!(out.type_desc(), &dest);
        assert_eq!(out.items().map(<[BoxedValue]>::len), Some(1));
    }

    #[test]
    fn test_identity_fallback() {
        let registry = ConverterRegistry::builder().build();
        let order = TypeDesc::named("Order");

        assert!(registry.has_converter(&QUEUE, &order, &order));
        assert!(registry.has_converter(&QUEUE, &order, &TypeDesc::object()));
        assert!(!registry.has_converter(&QUEUE, &order, &TypeDesc::string()));
        assert!(registry.possible_destinations(&QUEUE, &order).is_empty());
    }

    #[test]
    fn test_no_transitive_composition() {
        let mut builder = ConverterRegistry::builder();
        builder
            .register_fn::<String, Vec<u8>, _>(QUEUE, |s| Ok(s.into_bytes()))
            .register_fn::<Vec<u8>, JsonObject, _>(QUEUE, |b| Ok(serde_json::from_slice(&b)?));
        let registry = builder.build();

        assert!(!registry.has_converter(&QUEUE, &TypeDesc::string(), &TypeDesc::json_object()));
    }

    #[test]
    fn test_possible_destinations_order() {
        let order = TypeDesc::named("Order");

        let mut builder = ConverterRegistry::builder();
        builder
            .register(QUEUE, order.clone(), TypeDesc::string(), tagged("a"))
            .register(Scope::Any, order.clone(), TypeDesc::bytes(), tagged("b"))
            .register(
                AttributeKind::from_static("TimerTrigger"),
                order.clone(),
                TypeDesc::json_object(),
                tagged("c"),
            )
            .register_open(QUEUE, TypeDesc::param("T"), TypeDesc::generic("Envelope", vec![TypeDesc::param("T")]), |_| tagged("d"))
            .register(QUEUE, order.clone(), TypeDesc::string(), tagged("e"));
        let registry = builder.build();

        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.possible_destinations(&QUEUE, &order),
            vec![
                TypeDesc::string(),
                TypeDesc::bytes(),
                TypeDesc::generic("Envelope", vec![order.clone()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let mut builder = ConverterRegistry::builder();
        builder
            .register(QUEUE, TypeDesc::string(), TypeDesc::bytes(), tagged("first"))
            .register(QUEUE, TypeDesc::string(), TypeDesc::bytes(), tagged("second"));
        let registry = builder.build();

        assert_eq!(registry.len(), 1);
        let converter = registry
            .lookup(&QUEUE, &TypeDesc::string(), &TypeDesc::bytes())
            .unwrap();
        let out = run(converter, BoxedValue::new(String::new())).await.unwrap();
        assert_eq!(out.take::<String>().unwrap(), "second");
    }
}

//! Trigger extensions.
//!
//! An extension contributes converters for its trigger value type and the
//! binding providers that use them. The host collects every extension's
//! converters into one registry before asking for providers, so providers of
//! different extensions share the same registry.

use std::sync::Arc;

use jobhost_core::{BindingProvider, ConverterRegistry, ConverterRegistryBuilder};

/// A pluggable trigger kind.
pub trait Extension: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Registers this extension's converters.
    fn register_converters(&self, builder: &mut ConverterRegistryBuilder);

    /// Creates the providers for this extension's trigger parameters.
    fn trigger_providers(&self, registry: &Arc<ConverterRegistry>)
    -> Vec<Arc<dyn BindingProvider>>;
}

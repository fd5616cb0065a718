//! Binding rule discovery.
//!
//! Tooling asks a provider which parameter types a user could bind a trigger
//! to. The answer is informational: it never influences runtime binding.

use std::iter::FusedIterator;
use std::sync::Arc;

use serde::Serialize;

use crate::attribute::AttributeKind;
use crate::registry::ConverterRegistry;
use crate::types::TypeDesc;

/// One legal way to bind a trigger parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingRule {
    /// The trigger attribute kind.
    pub source_attribute: AttributeKind,
    /// Intermediate types, in order. Empty for a direct binding.
    pub converters: Vec<TypeDesc>,
    /// The parameter type the user declares. May be open.
    pub user_type: TypeDesc,
}

/// Lazy, finite iterator over [`BindingRule`]s.
///
/// Destinations are read from the registry on the first call to `next` past
/// the direct rule. Not restartable; ask the provider again for a new one.
pub struct BindingRules {
    kind: AttributeKind,
    trigger: TypeDesc,
    registry: Arc<ConverterRegistry>,
    direct: bool,
    pending: Option<std::vec::IntoIter<TypeDesc>>,
}

impl BindingRules {
    /// Creates the rules for `trigger` under `kind`.
    ///
    /// With `public` set, the trigger type itself is offered as a direct rule.
    pub fn new(
        kind: AttributeKind,
        trigger: TypeDesc,
        registry: Arc<ConverterRegistry>,
        public: bool,
    ) -> Self {
        Self {
            kind,
            trigger,
            registry,
            direct: public,
            pending: None,
        }
    }
}

impl Iterator for BindingRules {
    type Item = BindingRule;

    fn next(&mut self) -> Option<BindingRule> {
        if std::mem::take(&mut self.direct) {
            return Some(BindingRule {
                source_attribute: self.kind.clone(),
                converters: Vec::new(),
                user_type: self.trigger.clone(),
            });
        }

        let pending = self.pending.get_or_insert_with(|| {
            self.registry
                .possible_destinations(&self.kind, &self.trigger)
                .into_iter()
        });

        pending.next().map(|user_type| BindingRule {
            source_attribute: self.kind.clone(),
            converters: vec![self.trigger.clone()],
            user_type,
        })
    }
}

impl FusedIterator for BindingRules {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Converter;

    const BLOB: AttributeKind = AttributeKind::from_static("BlobTrigger");

    fn registry() -> Arc<ConverterRegistry> {
        let message = TypeDesc::named("BlobTriggerMessage");
        let mut builder = ConverterRegistry::builder();
        builder
            .register(BLOB, message.clone(), TypeDesc::string(), Converter::identity())
            .register(BLOB, message, TypeDesc::bytes(), Converter::identity());
        Arc::new(builder.build())
    }

    #[test]
    fn test_public_trigger_rules() {
        let message = TypeDesc::named("BlobTriggerMessage");
        let rules: Vec<_> = BindingRules::new(BLOB, message.clone(), registry(), true).collect();

        assert_eq!(rules.len(), 3);
        assert!(rules[0].converters.is_empty());
        assert_eq!(rules[0].user_type, message);
        assert_eq!(rules[1].converters, vec![message.clone()]);
        assert_eq!(rules[1].user_type, TypeDesc::string());
        assert_eq!(rules[2].user_type, TypeDesc::bytes());
    }

    #[test]
    fn test_private_trigger_omits_direct_rule() {
        let message = TypeDesc::named("BlobTriggerMessage");
        let rules: Vec<_> = BindingRules::new(BLOB, message, registry(), false).collect();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.converters.len() == 1));
    }

    #[test]
    fn test_empty_rules() {
        let registry = Arc::new(ConverterRegistry::builder().build());
        let mut rules = BindingRules::new(BLOB, TypeDesc::named("Other"), registry, false);
        assert!(rules.next().is_none());
        assert!(rules.next().is_none());
    }

    #[test]
    fn test_rule_serializes() {
        let rule = BindingRule {
            source_attribute: BLOB,
            converters: vec![],
            user_type: TypeDesc::string(),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["source_attribute"], "BlobTrigger");
    }
}

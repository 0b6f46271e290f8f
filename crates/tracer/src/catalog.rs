use crate::classifier::{MatcherCategory, MatcherClassifier};
use crate::error::{Result, TraceError};
use rule_trace_engine::{MatcherKey, Rule};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Dense per-run identifier of a rule node, assigned in first-seen order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatcherId(pub u32);

impl fmt::Display for MatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the trace records about one rule node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherDescriptor {
    pub id: MatcherId,
    pub class_name: String,
    pub category: MatcherCategory,
    pub label: String,
}

/// Descriptors of every rule node seen during a run.
///
/// Nodes are keyed by reference identity. The catalog keeps each rule alive
/// until it is dropped so an address cannot be reused by another node
/// within the same run.
#[derive(Debug, Default)]
pub struct MatcherCatalog {
    by_key: HashMap<MatcherKey, Arc<MatcherDescriptor>>,
    rows: Vec<Arc<MatcherDescriptor>>,
    pinned: Vec<Rule>,
}

fn next_id(count: usize) -> Result<MatcherId> {
    u32::try_from(count)
        .map(MatcherId)
        .map_err(|_| TraceError::TooManyMatchers { count })
}

impl MatcherCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for `rule`, registering it on first sight
    pub fn resolve(
        &mut self,
        rule: &Rule,
        classifier: &mut MatcherClassifier,
    ) -> Result<Arc<MatcherDescriptor>> {
        let key = MatcherKey::of(rule);
        if let Some(known) = self.by_key.get(&key) {
            return Ok(Arc::clone(known));
        }

        let class = rule.class();
        let category = classifier.classify(class)?;
        let descriptor = Arc::new(MatcherDescriptor {
            id: next_id(self.rows.len())?,
            class_name: class.name().to_string(),
            category,
            label: rule.label(),
        });

        self.by_key.insert(key, Arc::clone(&descriptor));
        self.rows.push(Arc::clone(&descriptor));
        self.pinned.push(Rule::clone(rule));
        Ok(descriptor)
    }

    #[must_use]
    pub fn get(&self, rule: &Rule) -> Option<&Arc<MatcherDescriptor>> {
        self.by_key.get(&MatcherKey::of(rule))
    }

    /// Descriptors ordered by id
    pub fn descriptors(&self) -> impl Iterator<Item = &MatcherDescriptor> {
        self.rows.iter().map(Arc::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Owned copy of the rows, for archive assembly
    #[must_use]
    pub fn snapshot(&self) -> Vec<MatcherDescriptor> {
        self.descriptors().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_trace_engine::matchers::{ch, labelled, sequence};

    #[test]
    fn ids_past_u32_are_rejected() {
        assert_eq!(next_id(7).unwrap(), MatcherId(7));
        assert_eq!(next_id(u32::MAX as usize).unwrap(), MatcherId(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        {
            let err = next_id(u32::MAX as usize + 1).unwrap_err();
            assert!(matches!(err, TraceError::TooManyMatchers { count } if count == 1 << 32));
        }
    }

    #[test]
    fn ids_follow_first_sight() {
        let mut classifier = MatcherClassifier::builtin();
        let mut catalog = MatcherCatalog::new();
        let a = ch('a');
        let b = ch('b');

        let first = catalog.resolve(&b, &mut classifier).unwrap();
        let second = catalog.resolve(&a, &mut classifier).unwrap();
        let again = catalog.resolve(&b, &mut classifier).unwrap();

        assert_eq!(first.id, MatcherId(0));
        assert_eq!(second.id, MatcherId(1));
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn identity_is_by_reference() {
        let mut classifier = MatcherClassifier::builtin();
        let mut catalog = MatcherCatalog::new();
        let left = ch('x');
        let right = ch('x');

        let l = catalog.resolve(&left, &mut classifier).unwrap();
        let r = catalog.resolve(&right, &mut classifier).unwrap();
        assert_ne!(l.id, r.id);
        assert_eq!(l.label, r.label);
    }

    #[test]
    fn descriptor_fields() {
        let mut classifier = MatcherClassifier::builtin();
        let mut catalog = MatcherCatalog::new();
        let rule = labelled("Pair", sequence([ch('a'), ch('b')]));

        let descriptor = catalog.resolve(&rule, &mut classifier).unwrap();
        assert_eq!(descriptor.class_name, "SequenceMatcher");
        assert_eq!(descriptor.category, MatcherCategory::Composite);
        assert_eq!(descriptor.label, "Pair");
        assert_eq!(catalog.snapshot(), vec![descriptor.as_ref().clone()]);
    }
}

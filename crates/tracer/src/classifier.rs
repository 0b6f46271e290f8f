use crate::error::{Result, TraceError};
use log::debug;
use rule_trace_engine::class;
use rule_trace_engine::{ClassKey, MatcherClass};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Coarse role of a rule within the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherCategory {
    /// Consumes input directly
    Terminal,
    /// Combines child rules
    Composite,
    /// Lookahead; never consumes input
    Predicate,
    /// Semantic action
    Action,
}

impl MatcherCategory {
    pub const ALL: [MatcherCategory; 4] = [
        MatcherCategory::Terminal,
        MatcherCategory::Composite,
        MatcherCategory::Predicate,
        MatcherCategory::Action,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Terminal => "TERMINAL",
            Self::Composite => "COMPOSITE",
            Self::Predicate => "PREDICATE",
            Self::Action => "ACTION",
        }
    }
}

impl fmt::Display for MatcherCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatcherCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown matcher category: {s}"))
    }
}

/// Categories of the engine's built-in rule classes, in registration order.
///
/// Order matters for classes that are not registered themselves: they take
/// the category of the first entry they descend from.
static BUILTINS: &[(&MatcherClass, MatcherCategory)] = &[
    (&class::JOIN, MatcherCategory::Composite),
    (&class::TRIE, MatcherCategory::Terminal),
    (&class::UNICODE_CHAR, MatcherCategory::Terminal),
    (&class::COMBINED_UNICODE_RANGE, MatcherCategory::Composite),
    (&class::UNICODE_RANGE, MatcherCategory::Terminal),
    (&class::ACTION, MatcherCategory::Action),
    (&class::ANY, MatcherCategory::Terminal),
    (&class::ANY_OF, MatcherCategory::Terminal),
    (&class::CHAR_IGNORE_CASE, MatcherCategory::Terminal),
    (&class::CHAR, MatcherCategory::Terminal),
    (&class::CHAR_RANGE, MatcherCategory::Terminal),
    (&class::EMPTY, MatcherCategory::Terminal),
    (&class::FIRST_OF_STRINGS, MatcherCategory::Terminal),
    (&class::FIRST_OF, MatcherCategory::Composite),
    (&class::NOTHING, MatcherCategory::Terminal),
    (&class::ONE_OR_MORE, MatcherCategory::Composite),
    (&class::OPTIONAL, MatcherCategory::Composite),
    (&class::SEQUENCE, MatcherCategory::Composite),
    (&class::STRING, MatcherCategory::Terminal),
    (&class::TEST, MatcherCategory::Predicate),
    (&class::TEST_NOT, MatcherCategory::Predicate),
    (&class::ZERO_OR_MORE, MatcherCategory::Composite),
    (&class::PROXY, MatcherCategory::Composite),
    (&class::MEMO_MISMATCHES, MatcherCategory::Composite),
    (&class::VAR_FRAMING, MatcherCategory::Composite),
];

/// Builds a [`MatcherClassifier`] from an ordered set of registrations
#[derive(Debug, Default)]
pub struct ClassifierBuilder {
    entries: Vec<(&'static MatcherClass, MatcherCategory)>,
}

impl ClassifierBuilder {
    /// Start from the built-in registrations
    #[must_use]
    pub fn with_builtins(mut self) -> Self {
        for &(class, category) in BUILTINS {
            self = self.register(class, category);
        }
        self
    }

    /// Register a class. A class registered twice keeps its first position
    /// and takes the latest category.
    #[must_use]
    pub fn register(mut self, class: &'static MatcherClass, category: MatcherCategory) -> Self {
        match self.entries.iter_mut().find(|(known, _)| *known == class) {
            Some(entry) => entry.1 = category,
            None => self.entries.push((class, category)),
        }
        self
    }

    #[must_use]
    pub fn build(self) -> MatcherClassifier {
        let exact = self
            .entries
            .iter()
            .map(|&(class, category)| (class.key(), category))
            .collect();
        MatcherClassifier {
            entries: self.entries,
            exact,
            cache: HashMap::new(),
        }
    }
}

/// Maps rule classes to [`MatcherCategory`].
///
/// Lookup tries an exact registration first, then walks the registrations in
/// order and takes the first one the class descends from. Resolved
/// supertype lookups are cached, so a class is resolved at most once.
#[derive(Debug, Clone)]
pub struct MatcherClassifier {
    entries: Vec<(&'static MatcherClass, MatcherCategory)>,
    exact: HashMap<ClassKey, MatcherCategory>,
    cache: HashMap<ClassKey, MatcherCategory>,
}

impl Default for MatcherClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MatcherClassifier {
    /// Classifier preloaded with the engine's built-in classes
    #[must_use]
    pub fn builtin() -> Self {
        Self::builder().with_builtins().build()
    }

    /// Empty builder; add [`ClassifierBuilder::with_builtins`] for the defaults
    #[must_use]
    pub fn builder() -> ClassifierBuilder {
        ClassifierBuilder::default()
    }

    /// Register a class after construction, with the same semantics as
    /// [`ClassifierBuilder::register`]. Clears cached supertype lookups.
    pub fn register(&mut self, class: &'static MatcherClass, category: MatcherCategory) {
        match self.entries.iter_mut().find(|(known, _)| *known == class) {
            Some(entry) => entry.1 = category,
            None => self.entries.push((class, category)),
        }
        self.exact.insert(class.key(), category);
        self.cache.clear();
    }

    pub fn classify(&mut self, class: &'static MatcherClass) -> Result<MatcherCategory> {
        let key = class.key();
        if let Some(&category) = self.exact.get(&key).or_else(|| self.cache.get(&key)) {
            return Ok(category);
        }

        let (ancestor, category) = self
            .entries
            .iter()
            .find(|(registered, _)| class.is_subclass_of(registered))
            .copied()
            .ok_or_else(|| TraceError::unresolved(class.name()))?;

        debug!("classified {class} as {category} via {ancestor}");
        self.cache.insert(key, category);
        Ok(category)
    }

    /// Number of registered classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of classes resolved through a supertype so far
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

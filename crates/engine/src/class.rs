//! Matcher classes.
//!
//! Rules do not report their structural role themselves. Instead every rule
//! points at a static [`MatcherClass`], and classes form a single-inheritance
//! chain through `supertype`, so tools that care about roles can classify a
//! rule by class identity alone.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Static descriptor identifying the kind of a rule.
///
/// Identity is by address: declare classes as `static` items, never `const`.
pub struct MatcherClass {
    name: &'static str,
    supertype: Option<&'static MatcherClass>,
}

impl MatcherClass {
    /// A root class
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            supertype: None,
        }
    }

    /// A class deriving from `supertype`
    #[must_use]
    pub const fn extending(name: &'static str, supertype: &'static MatcherClass) -> Self {
        Self {
            name,
            supertype: Some(supertype),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn supertype(&self) -> Option<&'static MatcherClass> {
        self.supertype
    }

    /// Whether `self` is `other` or derives from it
    #[must_use]
    pub fn is_subclass_of(&self, other: &MatcherClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, other) {
                return true;
            }
            current = class.supertype;
        }
        false
    }

    /// Stable per-process key for maps
    #[must_use]
    pub fn key(&'static self) -> ClassKey {
        ClassKey(self as *const MatcherClass as usize)
    }
}

impl PartialEq for MatcherClass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for MatcherClass {}

impl Hash for MatcherClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as *const MatcherClass as usize).hash(state);
    }
}

impl fmt::Debug for MatcherClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.supertype {
            Some(parent) => write!(f, "{} : {}", self.name, parent.name),
            None => f.write_str(self.name),
        }
    }
}

impl fmt::Display for MatcherClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Address-based key of a [`MatcherClass`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassKey(usize);

pub static ACTION: MatcherClass = MatcherClass::new("ActionMatcher");
pub static ANY: MatcherClass = MatcherClass::new("AnyMatcher");
pub static ANY_OF: MatcherClass = MatcherClass::new("AnyOfMatcher");
pub static CHAR_IGNORE_CASE: MatcherClass = MatcherClass::new("CharIgnoreCaseMatcher");
pub static CHAR: MatcherClass = MatcherClass::new("CharMatcher");
pub static CHAR_RANGE: MatcherClass = MatcherClass::new("CharRangeMatcher");
pub static EMPTY: MatcherClass = MatcherClass::new("EmptyMatcher");
pub static FIRST_OF: MatcherClass = MatcherClass::new("FirstOfMatcher");
pub static FIRST_OF_STRINGS: MatcherClass =
    MatcherClass::extending("FirstOfStringsMatcher", &FIRST_OF);
pub static NOTHING: MatcherClass = MatcherClass::new("NothingMatcher");
pub static ONE_OR_MORE: MatcherClass = MatcherClass::new("OneOrMoreMatcher");
pub static OPTIONAL: MatcherClass = MatcherClass::new("OptionalMatcher");
pub static SEQUENCE: MatcherClass = MatcherClass::new("SequenceMatcher");
pub static STRING: MatcherClass = MatcherClass::extending("StringMatcher", &SEQUENCE);
pub static TEST: MatcherClass = MatcherClass::new("TestMatcher");
pub static TEST_NOT: MatcherClass = MatcherClass::new("TestNotMatcher");
pub static ZERO_OR_MORE: MatcherClass = MatcherClass::new("ZeroOrMoreMatcher");
pub static PROXY: MatcherClass = MatcherClass::new("ProxyMatcher");
pub static MEMO_MISMATCHES: MatcherClass = MatcherClass::new("MemoMismatchesMatcher");
pub static VAR_FRAMING: MatcherClass = MatcherClass::new("VarFramingMatcher");
pub static JOIN: MatcherClass = MatcherClass::new("JoinMatcher");
pub static TRIE: MatcherClass = MatcherClass::new("TrieMatcher");
pub static UNICODE_CHAR: MatcherClass = MatcherClass::new("UnicodeCharMatcher");
pub static UNICODE_RANGE: MatcherClass = MatcherClass::new("UnicodeRangeMatcher");
pub static COMBINED_UNICODE_RANGE: MatcherClass =
    MatcherClass::new("CombinedUnicodeRangeMatcher");

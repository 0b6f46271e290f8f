use crate::class::MatcherClass;
use crate::context::MatchContext;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// A single grammar rule node.
///
/// Rules are shared as [`Rule`] handles and are identified by reference:
/// two structurally identical rules built separately are distinct nodes.
pub trait Matcher: Send + Sync {
    /// Static class of this rule
    fn class(&self) -> &'static MatcherClass;

    /// Human readable label
    fn label(&self) -> String;

    /// Try to match at the context's current index.
    ///
    /// Sub-rules must be run through [`MatchContext::run_child`] so that
    /// every nested attempt is visible to parse listeners.
    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool>;
}

/// Shared handle to a rule
pub type Rule = Arc<dyn Matcher>;

/// Reference identity of a rule, valid while the rule is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatcherKey(usize);

impl MatcherKey {
    #[must_use]
    pub fn of(rule: &Rule) -> Self {
        Self(Arc::as_ptr(rule) as *const () as usize)
    }
}

impl fmt::Debug for dyn Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class().name(), self.label())
    }
}

use crate::buffer::TextBuffer;
use crate::class::MatcherClass;
use crate::error::Result;
use crate::matcher::{MatcherKey, Rule};

/// Read-only view of one rule invocation, handed to parse listeners
#[derive(Clone, Copy)]
pub struct MatchEvent<'a> {
    pub input: &'a TextBuffer,
    pub matcher: &'a Rule,
    /// Current input offset; may run one past the end after end-of-input matched
    pub index: usize,
    /// Nesting depth, 0 for the root rule
    pub level: usize,
}

impl MatchEvent<'_> {
    #[must_use]
    pub fn key(&self) -> MatcherKey {
        MatcherKey::of(self.matcher)
    }

    #[must_use]
    pub fn class(&self) -> &'static MatcherClass {
        self.matcher.class()
    }
}

/// Receives lifecycle calls around every rule invocation
pub(crate) trait MatchHandler {
    fn before_match(&mut self, event: &MatchEvent<'_>) -> Result<()>;
    fn match_success(&mut self, event: &MatchEvent<'_>) -> Result<()>;
    fn match_failure(&mut self, event: &MatchEvent<'_>) -> Result<()>;
}

/// State of one rule invocation.
///
/// Child contexts start at the parent's index one level deeper; the parent
/// only advances when the child succeeds.
pub struct MatchContext<'a> {
    input: &'a TextBuffer,
    matcher: Rule,
    index: usize,
    level: usize,
    handler: &'a mut dyn MatchHandler,
}

impl<'a> MatchContext<'a> {
    pub(crate) fn root(input: &'a TextBuffer, matcher: Rule, handler: &'a mut dyn MatchHandler) -> Self {
        Self {
            input,
            matcher,
            index: 0,
            level: 0,
            handler,
        }
    }

    #[must_use]
    pub fn input(&self) -> &TextBuffer {
        self.input
    }

    #[must_use]
    pub fn matcher(&self) -> &Rule {
        &self.matcher
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Character at the current index, `None` at end of input
    #[must_use]
    pub fn current_char(&self) -> Option<char> {
        self.input.char_at(self.index)
    }

    #[must_use]
    pub fn at_end(&self) -> bool {
        self.index >= self.input.length()
    }

    pub fn advance(&mut self, count: usize) {
        self.index = self.index.saturating_add(count);
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Run `child` one level deeper, advancing past its match on success
    pub fn run_child(&mut self, child: &Rule) -> Result<bool> {
        let mut sub = MatchContext {
            input: self.input,
            matcher: Rule::clone(child),
            index: self.index,
            level: self.level + 1,
            handler: &mut *self.handler,
        };
        let matched = sub.run()?;
        if matched {
            self.index = sub.index;
        }
        Ok(matched)
    }

    pub(crate) fn run(&mut self) -> Result<bool> {
        self.handler.before_match(&MatchEvent {
            input: self.input,
            matcher: &self.matcher,
            index: self.index,
            level: self.level,
        })?;

        let matcher = Rule::clone(&self.matcher);
        let matched = matcher.matches(self)?;

        let event = MatchEvent {
            input: self.input,
            matcher: &self.matcher,
            index: self.index,
            level: self.level,
        };
        if matched {
            self.handler.match_success(&event)?;
        } else {
            self.handler.match_failure(&event)?;
        }
        Ok(matched)
    }
}

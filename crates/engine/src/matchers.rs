//! Built-in rules and their constructors.

use crate::class::{self, MatcherClass};
use crate::context::MatchContext;
use crate::error::{EngineError, Result};
use crate::matcher::{Matcher, Rule};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};

struct CharMatcher {
    c: char,
}

impl Matcher for CharMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::CHAR
    }

    fn label(&self) -> String {
        format!("'{}'", self.c.escape_default())
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        if cx.current_char() != Some(self.c) {
            return Ok(false);
        }
        cx.advance(1);
        Ok(true)
    }
}

/// Matches end of input and moves one past it
struct EoiMatcher;

impl Matcher for EoiMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::CHAR
    }

    fn label(&self) -> String {
        "EOI".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        if cx.current_index() != cx.input().length() {
            return Ok(false);
        }
        cx.advance(1);
        Ok(true)
    }
}

struct CharIgnoreCaseMatcher {
    lower: char,
    upper: char,
}

impl Matcher for CharIgnoreCaseMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::CHAR_IGNORE_CASE
    }

    fn label(&self) -> String {
        format!("'{}/{}'", self.lower, self.upper)
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        match cx.current_char() {
            Some(c) if c == self.lower || c == self.upper => {
                cx.advance(1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

struct CharRangeMatcher {
    low: char,
    high: char,
}

impl Matcher for CharRangeMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::CHAR_RANGE
    }

    fn label(&self) -> String {
        format!("{}..{}", self.low, self.high)
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        match cx.current_char() {
            Some(c) if (self.low..=self.high).contains(&c) => {
                cx.advance(1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

struct AnyOfMatcher {
    chars: Vec<char>,
}

impl Matcher for AnyOfMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::ANY_OF
    }

    fn label(&self) -> String {
        let set: String = self.chars.iter().collect();
        format!("[{}]", set.escape_default())
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        match cx.current_char() {
            Some(c) if self.chars.contains(&c) => {
                cx.advance(1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

struct AnyMatcher;

impl Matcher for AnyMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::ANY
    }

    fn label(&self) -> String {
        "ANY".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        if cx.at_end() {
            return Ok(false);
        }
        cx.advance(1);
        Ok(true)
    }
}

struct EmptyMatcher;

impl Matcher for EmptyMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::EMPTY
    }

    fn label(&self) -> String {
        "EMPTY".to_string()
    }

    fn matches(&self, _cx: &mut MatchContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

struct NothingMatcher;

impl Matcher for NothingMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::NOTHING
    }

    fn label(&self) -> String {
        "NOTHING".to_string()
    }

    fn matches(&self, _cx: &mut MatchContext<'_>) -> Result<bool> {
        Ok(false)
    }
}

struct StringMatcher {
    chars: Vec<char>,
}

impl Matcher for StringMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::STRING
    }

    fn label(&self) -> String {
        let s: String = self.chars.iter().collect();
        format!("\"{}\"", s.escape_default())
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        if !cx.input().test(cx.current_index(), &self.chars) {
            return Ok(false);
        }
        cx.advance(self.chars.len());
        Ok(true)
    }
}

struct FirstOfStringsMatcher {
    alternatives: Vec<Vec<char>>,
}

impl Matcher for FirstOfStringsMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::FIRST_OF_STRINGS
    }

    fn label(&self) -> String {
        let parts: Vec<String> = self
            .alternatives
            .iter()
            .map(|chars| format!("\"{}\"", chars.iter().collect::<String>()))
            .collect();
        parts.join(" | ")
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        let index = cx.current_index();
        let hit = self
            .alternatives
            .iter()
            .find(|chars| cx.input().test(index, chars));
        match hit {
            Some(chars) => {
                cx.advance(chars.len());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct SequenceMatcher {
    children: Vec<Rule>,
}

impl Matcher for SequenceMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::SEQUENCE
    }

    fn label(&self) -> String {
        "Sequence".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        for child in &self.children {
            if !cx.run_child(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

struct FirstOfMatcher {
    children: Vec<Rule>,
}

impl Matcher for FirstOfMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::FIRST_OF
    }

    fn label(&self) -> String {
        "FirstOf".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        for child in &self.children {
            if cx.run_child(child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

struct OptionalMatcher {
    child: Rule,
}

impl Matcher for OptionalMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::OPTIONAL
    }

    fn label(&self) -> String {
        "Optional".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        cx.run_child(&self.child)?;
        Ok(true)
    }
}

struct ZeroOrMoreMatcher {
    child: Rule,
}

impl Matcher for ZeroOrMoreMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::ZERO_OR_MORE
    }

    fn label(&self) -> String {
        "ZeroOrMore".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        repeat(cx, &self.child)?;
        Ok(true)
    }
}

struct OneOrMoreMatcher {
    child: Rule,
}

impl Matcher for OneOrMoreMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::ONE_OR_MORE
    }

    fn label(&self) -> String {
        "OneOrMore".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        Ok(repeat(cx, &self.child)? > 0)
    }
}

/// Run `child` until it fails or stops consuming input; returns the match count
fn repeat(cx: &mut MatchContext<'_>, child: &Rule) -> Result<usize> {
    let mut count = 0usize;
    loop {
        let before = cx.current_index();
        if !cx.run_child(child)? {
            return Ok(count);
        }
        count += 1;
        if cx.current_index() == before {
            return Ok(count);
        }
    }
}

struct TestMatcher {
    child: Rule,
}

impl Matcher for TestMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::TEST
    }

    fn label(&self) -> String {
        "Test".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        let index = cx.current_index();
        let matched = cx.run_child(&self.child)?;
        cx.set_index(index);
        Ok(matched)
    }
}

struct TestNotMatcher {
    child: Rule,
}

impl Matcher for TestNotMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::TEST_NOT
    }

    fn label(&self) -> String {
        "TestNot".to_string()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        let index = cx.current_index();
        let matched = cx.run_child(&self.child)?;
        cx.set_index(index);
        Ok(!matched)
    }
}

type ActionFn = dyn Fn(&MatchContext<'_>) -> anyhow::Result<bool> + Send + Sync;

struct ActionMatcher {
    label: String,
    action: Box<ActionFn>,
}

impl Matcher for ActionMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::ACTION
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        (self.action)(cx).map_err(|source| EngineError::Action {
            label: self.label.clone(),
            source,
        })
    }
}

/// Late-bound reference to another rule, for recursive grammars.
///
/// Holds a weak reference: the grammar root must keep the target alive.
pub struct ProxyMatcher {
    label: String,
    target: OnceCell<Weak<dyn Matcher>>,
}

impl ProxyMatcher {
    /// Point this proxy at `target`; returns false if it was already bound
    pub fn bind(&self, target: &Rule) -> bool {
        self.target.set(Arc::downgrade(target)).is_ok()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }
}

impl Matcher for ProxyMatcher {
    fn class(&self) -> &'static MatcherClass {
        &class::PROXY
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        let target = self
            .target
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| EngineError::UnboundProxy(self.label.clone()))?;
        cx.run_child(&target)
    }
}

/// Another label on an existing rule; matches exactly like the inner rule
struct NamedMatcher {
    label: String,
    inner: Rule,
}

impl Matcher for NamedMatcher {
    fn class(&self) -> &'static MatcherClass {
        self.inner.class()
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn matches(&self, cx: &mut MatchContext<'_>) -> Result<bool> {
        self.inner.matches(cx)
    }
}

#[must_use]
pub fn ch(c: char) -> Rule {
    Arc::new(CharMatcher { c })
}

/// End of input
#[must_use]
pub fn eoi() -> Rule {
    Arc::new(EoiMatcher)
}

#[must_use]
pub fn char_ignore_case(c: char) -> Rule {
    let lower = c.to_lowercase().next().unwrap_or(c);
    let upper = c.to_uppercase().next().unwrap_or(c);
    Arc::new(CharIgnoreCaseMatcher { lower, upper })
}

#[must_use]
pub fn char_range(low: char, high: char) -> Rule {
    Arc::new(CharRangeMatcher { low, high })
}

#[must_use]
pub fn any_of(chars: &str) -> Rule {
    Arc::new(AnyOfMatcher {
        chars: chars.chars().collect(),
    })
}

#[must_use]
pub fn any() -> Rule {
    Arc::new(AnyMatcher)
}

#[must_use]
pub fn empty() -> Rule {
    Arc::new(EmptyMatcher)
}

#[must_use]
pub fn nothing() -> Rule {
    Arc::new(NothingMatcher)
}

#[must_use]
pub fn string(s: &str) -> Rule {
    Arc::new(StringMatcher {
        chars: s.chars().collect(),
    })
}

#[must_use]
pub fn first_of_strings(alternatives: &[&str]) -> Rule {
    Arc::new(FirstOfStringsMatcher {
        alternatives: alternatives.iter().map(|s| s.chars().collect()).collect(),
    })
}

#[must_use]
pub fn sequence(children: impl IntoIterator<Item = Rule>) -> Rule {
    Arc::new(SequenceMatcher {
        children: children.into_iter().collect(),
    })
}

#[must_use]
pub fn first_of(children: impl IntoIterator<Item = Rule>) -> Rule {
    Arc::new(FirstOfMatcher {
        children: children.into_iter().collect(),
    })
}

#[must_use]
pub fn optional(child: Rule) -> Rule {
    Arc::new(OptionalMatcher { child })
}

#[must_use]
pub fn zero_or_more(child: Rule) -> Rule {
    Arc::new(ZeroOrMoreMatcher { child })
}

#[must_use]
pub fn one_or_more(child: Rule) -> Rule {
    Arc::new(OneOrMoreMatcher { child })
}

/// Positive lookahead
#[must_use]
pub fn test(child: Rule) -> Rule {
    Arc::new(TestMatcher { child })
}

/// Negative lookahead
#[must_use]
pub fn test_not(child: Rule) -> Rule {
    Arc::new(TestNotMatcher { child })
}

/// A semantic action; its result decides the match
pub fn action<F>(label: impl Into<String>, f: F) -> Rule
where
    F: Fn(&MatchContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    Arc::new(ActionMatcher {
        label: label.into(),
        action: Box::new(f),
    })
}

/// An unbound proxy; bind it once the target rule exists
#[must_use]
pub fn proxy(label: impl Into<String>) -> Arc<ProxyMatcher> {
    Arc::new(ProxyMatcher {
        label: label.into(),
        target: OnceCell::new(),
    })
}

/// Relabel a rule
#[must_use]
pub fn labelled(label: impl Into<String>, inner: Rule) -> Rule {
    Arc::new(NamedMatcher {
        label: label.into(),
        inner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::runner::EventRunner;

    fn parse(rule: &Rule, text: &str) -> (bool, usize) {
        let buffer = TextBuffer::new(text);
        let result = EventRunner::new(Rule::clone(rule))
            .run(&buffer)
            .expect("run");
        (result.matched, result.end_index)
    }

    #[test]
    fn sequence_and_first_of() {
        let rule = sequence([ch('a'), first_of([ch('b'), ch('c')])]);
        assert_eq!(parse(&rule, "ac"), (true, 2));
        assert_eq!(parse(&rule, "ad"), (false, 0));
    }

    #[test]
    fn repetition_stops_on_empty_match() {
        let rule = zero_or_more(optional(ch('x')));
        assert_eq!(parse(&rule, "xxy"), (true, 2));
        assert_eq!(parse(&one_or_more(ch('x')), "y"), (false, 0));
    }

    #[test]
    fn lookahead_does_not_consume() {
        let rule = sequence([test(ch('a')), test_not(ch('b')), any()]);
        assert_eq!(parse(&rule, "a"), (true, 1));
    }

    #[test]
    fn strings_and_ranges() {
        assert_eq!(parse(&string("let"), "let x"), (true, 3));
        assert_eq!(parse(&first_of_strings(&["if", "else"]), "else"), (true, 4));
        assert_eq!(parse(&char_range('0', '9'), "7"), (true, 1));
        assert_eq!(parse(&char_ignore_case('q'), "Q"), (true, 1));
        assert_eq!(parse(&any_of("+-"), "-"), (true, 1));
    }

    #[test]
    fn eoi_moves_past_the_end() {
        let rule = sequence([ch('a'), eoi()]);
        assert_eq!(parse(&rule, "a"), (true, 2));
    }

    #[test]
    fn proxy_supports_recursion() {
        let nested = proxy("nested");
        let rule = first_of([
            sequence([ch('('), nested.clone() as Rule, ch(')')]),
            empty(),
        ]);
        assert!(nested.bind(&rule));
        assert!(!nested.bind(&rule));
        assert_eq!(parse(&rule, "(())"), (true, 4));
    }

    #[test]
    fn unbound_proxy_is_an_error() {
        let dangling: Rule = proxy("dangling");
        let buffer = TextBuffer::new("");
        let err = EventRunner::new(dangling).run(&buffer).unwrap_err();
        assert!(matches!(err, EngineError::UnboundProxy(label) if label == "dangling"));
    }

    #[test]
    fn action_result_decides_the_match() {
        let even = action("even", |cx| Ok(cx.current_index() % 2 == 0));
        assert_eq!(parse(&sequence([any(), Rule::clone(&even)]), "a"), (false, 0));
        assert_eq!(parse(&sequence([any(), any(), even]), "ab"), (true, 2));
    }

    #[test]
    fn labelled_keeps_class() {
        let rule = labelled("digit", char_range('0', '9'));
        assert_eq!(rule.label(), "digit");
        assert!(std::ptr::eq(rule.class(), &class::CHAR_RANGE));
    }
}

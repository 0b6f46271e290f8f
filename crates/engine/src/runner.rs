use crate::buffer::TextBuffer;
use crate::context::{MatchContext, MatchEvent, MatchHandler};
use crate::error::{EngineError, Result};
use crate::listener::ParseListener;
use crate::matcher::Rule;
use log::debug;

/// Outcome of a parse run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsingResult {
    pub matched: bool,
    /// Offset the root rule stopped at; 0 when it failed
    pub end_index: usize,
    pub input_length: usize,
}

/// Runs a root rule over an input, fanning lifecycle events out to listeners
pub struct EventRunner<'l> {
    root: Rule,
    listeners: Vec<&'l mut dyn ParseListener>,
}

impl<'l> EventRunner<'l> {
    #[must_use]
    pub fn new(root: Rule) -> Self {
        Self {
            root,
            listeners: Vec::new(),
        }
    }

    /// Listeners receive events in registration order
    pub fn register_listener(&mut self, listener: &'l mut dyn ParseListener) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn run(&mut self, input: &TextBuffer) -> Result<ParsingResult> {
        let mut dispatch = Dispatch {
            listeners: &mut self.listeners,
        };

        dispatch.deliver(Hook::BeforeParse(&MatchEvent {
            input,
            matcher: &self.root,
            index: 0,
            level: 0,
        }))?;

        let (matched, index) = {
            let mut root = MatchContext::root(input, Rule::clone(&self.root), &mut dispatch);
            let matched = root.run()?;
            (matched, root.current_index())
        };

        let result = ParsingResult {
            matched,
            end_index: if matched { index } else { 0 },
            input_length: input.length(),
        };
        debug!(
            "parse finished: matched={} end={} length={}",
            result.matched, result.end_index, result.input_length
        );

        dispatch.deliver(Hook::AfterParse(&result))?;
        Ok(result)
    }
}

#[derive(Clone, Copy)]
enum Hook<'e, 'a> {
    BeforeParse(&'e MatchEvent<'a>),
    BeforeMatch(&'e MatchEvent<'a>),
    Success(&'e MatchEvent<'a>),
    Failure(&'e MatchEvent<'a>),
    AfterParse(&'e ParsingResult),
}

struct Dispatch<'r, 'l> {
    listeners: &'r mut Vec<&'l mut dyn ParseListener>,
}

impl Dispatch<'_, '_> {
    /// Deliver to every listener; the first failure wins
    fn deliver(&mut self, hook: Hook<'_, '_>) -> Result<()> {
        let mut first: Option<anyhow::Error> = None;
        for listener in self.listeners.iter_mut() {
            let outcome = match hook {
                Hook::BeforeParse(event) => listener.before_parse(event),
                Hook::BeforeMatch(event) => listener.before_match(event),
                Hook::Success(event) => listener.match_success(event),
                Hook::Failure(event) => listener.match_failure(event),
                Hook::AfterParse(result) => listener.after_parse(result),
            };
            if let Err(err) = outcome {
                match first {
                    None => first = Some(err),
                    Some(_) => debug!("dropping secondary listener error: {err:#}"),
                }
            }
        }
        match first {
            Some(err) => Err(EngineError::Listener(err)),
            None => Ok(()),
        }
    }
}

impl MatchHandler for Dispatch<'_, '_> {
    fn before_match(&mut self, event: &MatchEvent<'_>) -> Result<()> {
        self.deliver(Hook::BeforeMatch(event))
    }

    fn match_success(&mut self, event: &MatchEvent<'_>) -> Result<()> {
        self.deliver(Hook::Success(event))
    }

    fn match_failure(&mut self, event: &MatchEvent<'_>) -> Result<()> {
        self.deliver(Hook::Failure(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::{ch, sequence};
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl ParseListener for Recorder {
        fn before_parse(&mut self, root: &MatchEvent<'_>) -> anyhow::Result<()> {
            self.log.push(format!("parse {}", root.input.length()));
            Ok(())
        }

        fn before_match(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
            self.log
                .push(format!("enter {} @{} L{}", event.matcher.label(), event.index, event.level));
            Ok(())
        }

        fn match_success(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
            self.log.push(format!("ok {} @{}", event.matcher.label(), event.index));
            Ok(())
        }

        fn match_failure(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
            self.log.push(format!("fail {} @{}", event.matcher.label(), event.index));
            Ok(())
        }

        fn after_parse(&mut self, result: &ParsingResult) -> anyhow::Result<()> {
            self.log.push(format!("done {}", result.matched));
            Ok(())
        }
    }

    struct FailOnEnter;

    impl ParseListener for FailOnEnter {
        fn before_match(&mut self, _event: &MatchEvent<'_>) -> anyhow::Result<()> {
            Err(anyhow!("listener exploded"))
        }
    }

    #[test]
    fn hooks_fire_in_nesting_order() {
        let mut recorder = Recorder::default();
        let buffer = TextBuffer::new("ab");
        {
            let mut runner = EventRunner::new(sequence([ch('a'), ch('c')]));
            runner.register_listener(&mut recorder);
            let result = runner.run(&buffer).expect("run");
            assert!(!result.matched);
        }
        assert_eq!(
            recorder.log,
            vec![
                "parse 2",
                "enter Sequence @0 L0",
                "enter 'a' @0 L1",
                "ok 'a' @1",
                "enter 'c' @1 L1",
                "fail 'c' @1",
                "fail Sequence @1",
                "done false",
            ]
        );
    }

    #[test]
    fn failing_listener_aborts_after_fan_out() {
        let mut failing = FailOnEnter;
        let mut recorder = Recorder::default();
        let buffer = TextBuffer::new("a");
        {
            let mut runner = EventRunner::new(ch('a'));
            runner.register_listener(&mut failing);
            runner.register_listener(&mut recorder);
            let err = runner.run(&buffer).unwrap_err();
            let cause = err.listener_cause().expect("listener error");
            assert_eq!(cause.to_string(), "listener exploded");
        }
        // The second listener still saw the event that failed, and nothing after it
        assert_eq!(recorder.log, vec!["parse 1", "enter 'a' @0 L0"]);
    }
}

use crate::context::MatchEvent;
use crate::runner::ParsingResult;

/// Observer of a parse run.
///
/// All hooks run synchronously on the parsing thread. For every rule
/// invocation `before_match` comes first, then exactly one of
/// `match_success` / `match_failure`; nested invocations happen entirely in
/// between. Returning an error aborts the run: the runner finishes
/// delivering the current event to the other listeners, then fails with
/// [`EngineError::Listener`](crate::EngineError::Listener) carrying the
/// first error.
#[allow(unused_variables)]
pub trait ParseListener {
    /// Called once with the root rule at offset 0, before any matching
    fn before_parse(&mut self, root: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_match(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn match_success(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn match_failure(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after the root rule resolved
    fn after_parse(&mut self, result: &ParsingResult) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<L: ParseListener + ?Sized> ParseListener for Box<L> {
    fn before_parse(&mut self, root: &MatchEvent<'_>) -> anyhow::Result<()> {
        (**self).before_parse(root)
    }

    fn before_match(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        (**self).before_match(event)
    }

    fn match_success(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        (**self).match_success(event)
    }

    fn match_failure(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        (**self).match_failure(event)
    }

    fn after_parse(&mut self, result: &ParsingResult) -> anyhow::Result<()> {
        (**self).after_parse(result)
    }
}

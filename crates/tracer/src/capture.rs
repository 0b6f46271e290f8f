use crate::catalog::{MatcherCatalog, MatcherDescriptor};
use crate::classifier::MatcherClassifier;
use crate::error::{Result, TraceError};
use crate::event::{EventKind, TraceEvent, ROOT_PARENT};
use crate::tracer::spawn_line_index;
use crate::writer::EventSender;
use log::{debug, warn};
use rule_trace_engine::{MatchEvent, ParseListener, ParsingResult};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// The open invocation at one nesting level
#[derive(Debug)]
struct DepthSlot {
    node_id: u64,
    parent_id: i64,
    matcher: Arc<MatcherDescriptor>,
    start_offset: usize,
    started: Instant,
}

/// Parse listener that turns engine callbacks into trace events.
///
/// Open invocations live in a table indexed by nesting level: the engine
/// nests strictly, so level `L` is always the innermost open slot when it
/// exits and level `L - 1` is its parent. Events go to the archive writer's
/// queue; nothing here touches the disk.
pub struct TraceCapture {
    classifier: MatcherClassifier,
    catalog: MatcherCatalog,
    sender: Option<EventSender>,
    slots: Vec<DepthSlot>,
    next_node_id: u64,
    input_length: usize,
    origin: Instant,
    start_time_millis: u64,
    runtime: Option<Handle>,
    line_index: Option<JoinHandle<usize>>,
    result: Option<ParsingResult>,
}

/// What a finished capture hands over for archive assembly
#[derive(Debug)]
pub struct CaptureOutcome {
    pub catalog: MatcherCatalog,
    pub start_time_millis: u64,
    pub node_count: u64,
    pub result: Option<ParsingResult>,
    pub line_index: Option<JoinHandle<usize>>,
}

impl TraceCapture {
    pub fn new(sender: EventSender, classifier: MatcherClassifier) -> Self {
        Self {
            classifier,
            catalog: MatcherCatalog::new(),
            sender: Some(sender),
            slots: Vec::new(),
            next_node_id: 0,
            input_length: 0,
            origin: Instant::now(),
            start_time_millis: 0,
            runtime: None,
            line_index: None,
            result: None,
        }
    }

    /// Build the input's line index on `runtime` as soon as the parse starts
    #[must_use]
    pub fn with_line_index(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &MatcherCatalog {
        &self.catalog
    }

    /// Invocations entered so far
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.next_node_id
    }

    /// Levels currently open
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn into_outcome(self) -> CaptureOutcome {
        CaptureOutcome {
            catalog: self.catalog,
            start_time_millis: self.start_time_millis,
            node_count: self.next_node_id,
            result: self.result,
            line_index: self.line_index,
        }
    }

    fn enqueue(&self, event: TraceEvent) -> Result<()> {
        match &self.sender {
            Some(sender) => sender.enqueue(event),
            None => Err(TraceError::WriterClosed),
        }
    }

    fn timestamp(&self, at: Instant) -> u64 {
        nanos(at.duration_since(self.origin).as_nanos())
    }

    fn enter(&mut self, event: &MatchEvent<'_>) -> Result<()> {
        let level = event.level;
        if level != self.slots.len() {
            return Err(TraceError::UnbalancedEnter {
                level,
                open: self.slots.len(),
            });
        }

        let matcher = self.catalog.resolve(event.matcher, &mut self.classifier)?;
        let parent_id = self
            .slots
            .last()
            .map_or(ROOT_PARENT, |parent| parent.node_id as i64);
        let node_id = self.next_node_id;
        self.next_node_id += 1;

        let start_offset = event.index.min(self.input_length);
        let started = Instant::now();
        self.slots.push(DepthSlot {
            node_id,
            parent_id,
            matcher: Arc::clone(&matcher),
            start_offset,
            started,
        });

        self.enqueue(TraceEvent {
            kind: EventKind::Enter,
            node_id,
            parent_id,
            level,
            matcher,
            start_offset,
            offset: start_offset,
            timestamp_nanos: self.timestamp(started),
            elapsed_nanos: None,
        })
    }

    fn exit(&mut self, event: &MatchEvent<'_>, kind: EventKind) -> Result<()> {
        let finished = Instant::now();
        let level = event.level;
        if level + 1 != self.slots.len() {
            return Err(TraceError::UnbalancedExit { level });
        }
        let Some(slot) = self.slots.pop() else {
            return Err(TraceError::UnbalancedExit { level });
        };

        // Failures report where the engine stopped, even past the end
        let offset = match kind {
            EventKind::Success => event.index.min(self.input_length),
            _ => event.index,
        };

        self.enqueue(TraceEvent {
            kind,
            node_id: slot.node_id,
            parent_id: slot.parent_id,
            level,
            matcher: slot.matcher,
            start_offset: slot.start_offset,
            offset,
            timestamp_nanos: self.timestamp(finished),
            elapsed_nanos: Some(nanos(finished.duration_since(slot.started).as_nanos())),
        })
    }
}

impl ParseListener for TraceCapture {
    fn before_parse(&mut self, root: &MatchEvent<'_>) -> anyhow::Result<()> {
        self.slots.clear();
        self.next_node_id = 0;
        self.result = None;
        self.input_length = root.input.length();
        self.origin = Instant::now();
        self.start_time_millis = unix_now_ms();
        if let Some(runtime) = &self.runtime {
            self.line_index = Some(spawn_line_index(runtime, root.input.clone()));
        }
        debug!(
            "trace capture started: {} chars, root {}",
            self.input_length,
            root.matcher.label()
        );
        Ok(())
    }

    fn before_match(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(self.enter(event)?)
    }

    fn match_success(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(self.exit(event, EventKind::Success)?)
    }

    fn match_failure(&mut self, event: &MatchEvent<'_>) -> anyhow::Result<()> {
        Ok(self.exit(event, EventKind::Failure)?)
    }

    fn after_parse(&mut self, result: &ParsingResult) -> anyhow::Result<()> {
        if !self.slots.is_empty() {
            warn!("parse finished with {} open level(s)", self.slots.len());
        }
        self.result = Some(*result);
        let sender = self.sender.take().ok_or(TraceError::WriterClosed)?;
        sender.end()?;
        debug!(
            "trace capture finished: {} nodes, {} matchers",
            self.next_node_id,
            self.catalog.len()
        );
        Ok(())
    }
}

fn nanos(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceFormat;
    use crate::event::EventRecord;
    use crate::writer::ArchiveWriter;
    use pretty_assertions::assert_eq;
    use rule_trace_engine::matchers::{ch, eoi, first_of, sequence};
    use rule_trace_engine::{EventRunner, Rule, TextBuffer};
    use tempfile::TempDir;

    async fn capture_events(rule: Rule, text: &str) -> Vec<EventRecord> {
        let dir = TempDir::new().expect("tempdir");
        let writer = ArchiveWriter::spawn(&Handle::current(), TraceFormat::Events, dir.path())
            .expect("spawn writer");
        let mut capture = TraceCapture::new(writer.sender(), MatcherClassifier::builtin());
        let buffer = TextBuffer::new(text);
        {
            let mut runner = EventRunner::new(rule);
            runner.register_listener(&mut capture);
            runner.run(&buffer).expect("run");
        }
        drop(capture);
        let staged = writer.finish().await.expect("finish");
        serde_json::from_slice(&std::fs::read(staged.path()).expect("read")).expect("json")
    }

    #[tokio::test]
    async fn parents_come_from_the_enclosing_level() {
        let records = capture_events(sequence([ch('a'), ch('b')]), "ab").await;
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.kind, r.node_id, r.parent_id, r.level, r.offset))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventKind::Enter, 0, -1, 0, 0),
                (EventKind::Enter, 1, 0, 1, 0),
                (EventKind::Success, 1, 0, 1, 1),
                (EventKind::Enter, 2, 0, 1, 1),
                (EventKind::Success, 2, 0, 1, 2),
                (EventKind::Success, 0, -1, 0, 2),
            ]
        );
    }

    #[tokio::test]
    async fn slots_are_reused_across_siblings() {
        let records = capture_events(first_of([ch('x'), ch('y'), ch('z')]), "z").await;
        let level_one: Vec<_> = records
            .iter()
            .filter(|r| r.level == 1 && r.kind == EventKind::Enter)
            .map(|r| r.node_id)
            .collect();
        assert_eq!(level_one, vec![1, 2, 3]);
        assert!(records.iter().filter(|r| r.level == 1).all(|r| r.parent_id == 0));
    }

    #[tokio::test]
    async fn success_offsets_are_clamped_to_input() {
        // End of input matches by stepping one past the end
        let records = capture_events(sequence([ch('a'), eoi()]), "a").await;
        let eoi_exit = records
            .iter()
            .find(|r| r.kind == EventKind::Success && r.node_id == 2)
            .expect("eoi exit");
        assert_eq!(eoi_exit.offset, 1);
        let root_exit = records.last().expect("root exit");
        assert_eq!(root_exit.offset, 1);
    }

    #[tokio::test]
    async fn unknown_class_aborts_the_run() {
        use rule_trace_engine::{MatchContext, Matcher, MatcherClass};

        static ODD: MatcherClass = MatcherClass::new("OddMatcher");
        struct Odd;
        impl Matcher for Odd {
            fn class(&self) -> &'static MatcherClass {
                &ODD
            }
            fn label(&self) -> String {
                "Odd".to_string()
            }
            fn matches(&self, _cx: &mut MatchContext<'_>) -> rule_trace_engine::Result<bool> {
                Ok(true)
            }
        }

        let dir = TempDir::new().expect("tempdir");
        let writer = ArchiveWriter::spawn(&Handle::current(), TraceFormat::Nodes, dir.path())
            .expect("spawn writer");
        let mut capture = TraceCapture::new(writer.sender(), MatcherClassifier::builtin());
        let buffer = TextBuffer::new("x");
        let err = {
            let mut runner = EventRunner::new(Arc::new(Odd));
            runner.register_listener(&mut capture);
            runner.run(&buffer).unwrap_err()
        };
        let err = TraceError::from(err);
        assert!(matches!(err, TraceError::UnresolvedCategory { .. }));
        drop(capture);
        assert!(writer.abort().await.is_none());
    }

    #[tokio::test]
    async fn orphan_exit_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let writer = ArchiveWriter::spawn(&Handle::current(), TraceFormat::Nodes, dir.path())
            .expect("spawn writer");
        let mut capture = TraceCapture::new(writer.sender(), MatcherClassifier::builtin());
        let buffer = TextBuffer::new("a");
        let rule = ch('a');
        let event = MatchEvent {
            input: &buffer,
            matcher: &rule,
            index: 0,
            level: 0,
        };
        capture.before_parse(&event).expect("before parse");
        let err = capture.match_success(&event).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TraceError>(),
            Some(TraceError::UnbalancedExit { level: 0 })
        ));
        drop(capture);
        writer.abort().await;
    }

    #[tokio::test]
    async fn line_index_warms_in_background() {
        let dir = TempDir::new().expect("tempdir");
        let writer = ArchiveWriter::spawn(&Handle::current(), TraceFormat::Nodes, dir.path())
            .expect("spawn writer");
        let mut capture = TraceCapture::new(writer.sender(), MatcherClassifier::builtin())
            .with_line_index(Handle::current());
        let buffer = TextBuffer::new("one\ntwo\nthree");
        {
            let mut runner = EventRunner::new(ch('o'));
            runner.register_listener(&mut capture);
            runner.run(&buffer).expect("run");
        }
        let outcome = capture.into_outcome();
        assert_eq!(outcome.node_count, 1);
        assert_eq!(outcome.result.map(|r| r.matched), Some(true));
        let lines = outcome.line_index.expect("line task").await.expect("join");
        assert_eq!(lines, 3);
        assert!(buffer.has_line_index());
        writer.finish().await.expect("finish");
    }
}

use crate::archive::ArchivePlan;
use crate::capture::TraceCapture;
use crate::classifier::MatcherClassifier;
use crate::config::TracerConfig;
use crate::error::{Result, TraceError};
use crate::summary::{text_counts, RunSummary};
use crate::writer::ArchiveWriter;
use log::{debug, warn};
use rule_trace_engine::{EventRunner, ParseListener, ParsingResult, Rule, TextBuffer};
use std::path::PathBuf;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Build `buffer`'s line index on a blocking task; resolves to the line count.
///
/// The index is stored in the buffer, so every clone sees it once built.
pub fn spawn_line_index(runtime: &Handle, buffer: TextBuffer) -> JoinHandle<usize> {
    runtime.spawn_blocking(move || {
        let lines = buffer.line_count();
        debug!("line index ready: {lines} lines");
        lines
    })
}

/// Extra listeners that run beside the trace capture
pub type ExtraListeners = Vec<Box<dyn ParseListener + Send>>;

/// Outcome of a traced parse
#[derive(Debug, Clone)]
pub struct TraceReport {
    pub result: ParsingResult,
    pub summary: RunSummary,
    pub archive_path: PathBuf,
}

/// Runs a parse with tracing and publishes the archive.
///
/// ```text
/// trace(rule, input)
///     │
///     ├──> writer task      (drains events to a staging file)
///     ├──> parse task       (engine + capture, line index warmed in parallel)
///     │
///     ├──> await writer, await line index
///     └──> publish archive  (temp file, then no-clobber rename)
/// ```
pub struct ParseTracer {
    config: TracerConfig,
    classifier: MatcherClassifier,
}

impl ParseTracer {
    /// Validate the configuration. Fails if the archive already exists; no
    /// background work has started at this point.
    pub fn new(config: TracerConfig) -> Result<Self> {
        config.validate().map_err(TraceError::InvalidConfig)?;
        if config.archive_path.exists() {
            return Err(TraceError::ArchiveExists(config.archive_path));
        }
        Ok(Self {
            config,
            classifier: MatcherClassifier::builtin(),
        })
    }

    /// Use a classifier that knows about custom rule classes
    #[must_use]
    pub fn with_classifier(mut self, classifier: MatcherClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub async fn trace(self, rule: Rule, input: TextBuffer) -> Result<TraceReport> {
        self.trace_with(rule, input, Vec::new()).await
    }

    /// Trace with `extras` registered after the capture, in order
    pub async fn trace_with(
        self,
        rule: Rule,
        input: TextBuffer,
        extras: ExtraListeners,
    ) -> Result<TraceReport> {
        let runtime = Handle::try_current().map_err(|err| TraceError::Runtime(err.to_string()))?;
        let staging_dir = self.config.resolved_staging_dir();
        let writer = ArchiveWriter::spawn_limited(
            &runtime,
            self.config.format,
            &staging_dir,
            self.config.max_staging_bytes,
        )?;
        let capture = TraceCapture::new(writer.sender(), self.classifier)
            .with_line_index(runtime.clone());

        let parse_input = input.clone();
        let parse = runtime
            .spawn_blocking(move || {
                let mut capture = capture;
                let mut extras = extras;
                let outcome = {
                    let mut runner = EventRunner::new(rule);
                    runner.register_listener(&mut capture);
                    for listener in extras.iter_mut() {
                        runner.register_listener(listener);
                    }
                    let outcome = runner.run(&parse_input);
                    outcome
                };
                (outcome, capture)
            })
            .await;

        let (outcome, capture) = match parse {
            Ok(done) => done,
            Err(err) => {
                let cause = TraceError::Runtime(format!("parse task failed: {err}"));
                return Err(fail(writer, cause).await);
            }
        };
        let capture = capture.into_outcome();
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                drop(capture);
                return Err(fail(writer, TraceError::from(err)).await);
            }
        };

        let staged = writer.finish().await?;
        let line_count = match capture.line_index {
            Some(task) => task
                .await
                .map_err(|err| TraceError::Runtime(format!("line index task failed: {err}")))?,
            None => input.line_count(),
        };

        let (char_count, code_point_count) = text_counts(input.text());
        let summary = RunSummary {
            start_time_millis: capture.start_time_millis,
            event_count: staged.event_count,
            matcher_count: capture.catalog.len(),
            line_count,
            char_count,
            code_point_count,
            node_count: capture.node_count,
        };
        debug!(
            "trace drained: {} events, {} nodes, {} matchers",
            summary.event_count, summary.node_count, summary.matcher_count
        );

        let plan = ArchivePlan {
            target: self.config.archive_path.clone(),
            archive_dir: self.config.archive_dir(),
            compression: self.config.compression,
            input,
            matchers: capture.catalog.snapshot(),
            staged,
            summary,
        };
        let archive_path = runtime
            .spawn_blocking(move || plan.publish())
            .await
            .map_err(|err| TraceError::Runtime(format!("archive task failed: {err}")))??;

        Ok(TraceReport {
            result,
            summary,
            archive_path,
        })
    }
}

/// Tear the writer down and pick the error to report.
///
/// A capture that found the queue closed only saw a symptom; the writer's
/// own failure is the cause.
async fn fail(writer: ArchiveWriter, cause: TraceError) -> TraceError {
    let writer_error = writer.abort().await;
    match (cause, writer_error) {
        (TraceError::WriterClosed, Some(real)) => real,
        (cause, Some(other)) => {
            warn!("trace writer also failed: {other}");
            cause
        }
        (cause, None) => cause,
    }
}

//! # Rule Trace
//!
//! Records every rule invocation of a parse run and publishes the trace as a
//! self-contained zip archive for offline viewing.
//!
//! ## Pipeline
//!
//! ```text
//! EventRunner (parse thread)
//!     │
//!     ├──> TraceCapture
//!     │    ├─> classify rule class      (MatcherClassifier)
//!     │    ├─> assign matcher id        (MatcherCatalog)
//!     │    └─> open/close depth slots   → TraceEvent
//!     │
//!     ├──> unbounded queue ──> ArchiveWriter (blocking task, staging file)
//!     │
//!     └──> after parse: end marker, await writer + line index
//!          └─> archive: input.txt, matchers.csv, nodes.csv | events.json, info.csv
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use rule_trace::{ParseTracer, TracerConfig};
//! use rule_trace_engine::matchers::{ch, sequence};
//! use rule_trace_engine::TextBuffer;
//!
//! # async fn run() -> rule_trace::Result<()> {
//! let tracer = ParseTracer::new(TracerConfig::new("trace.zip"))?;
//! let report = tracer
//!     .trace(sequence([ch('a'), ch('b')]), TextBuffer::new("ab"))
//!     .await?;
//! println!("{} nodes traced", report.summary.node_count);
//! # Ok(())
//! # }
//! ```

mod archive;
mod capture;
mod catalog;
mod classifier;
mod config;
mod error;
mod event;
mod format;
mod summary;
mod tracer;
mod writer;

pub use archive::{TraceArchive, TraceTable, INFO_ENTRY, INPUT_ENTRY, MATCHERS_ENTRY};
pub use capture::{CaptureOutcome, TraceCapture};
pub use catalog::{MatcherCatalog, MatcherDescriptor, MatcherId};
pub use classifier::{ClassifierBuilder, MatcherCategory, MatcherClassifier};
pub use config::{ArchiveCompression, TraceFormat, TracerConfig};
pub use error::{ArchiveFailure, Result, TraceError};
pub use event::{EventKind, EventRecord, NodeRecord, TraceEvent, ROOT_PARENT};
pub use format::{escape_field, split_row, unescape_field, RowError};
pub use summary::{text_counts, RunSummary};
pub use tracer::{spawn_line_index, ExtraListeners, ParseTracer, TraceReport};
pub use writer::{ArchiveWriter, EventSender, StagedTrace};

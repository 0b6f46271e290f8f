//! # Rule Trace Engine
//!
//! A small recursive-descent rule matcher that exposes its call discipline
//! to observers.
//!
//! ## Lifecycle
//!
//! ```text
//! EventRunner::run(input)
//!     │
//!     ├──> before_parse(root)
//!     │
//!     ├──> for every rule invocation, strictly nested:
//!     │      before_match ──> [children] ──> match_success | match_failure
//!     │
//!     └──> after_parse(result)
//! ```
//!
//! Listeners run on the parsing thread. A failing hook aborts the run with
//! [`EngineError::Listener`] once the current event has reached every
//! listener.
//!
//! ## Example
//!
//! ```rust
//! use rule_trace_engine::matchers::{ch, one_or_more, sequence};
//! use rule_trace_engine::{EventRunner, TextBuffer};
//!
//! let grammar = sequence([one_or_more(ch('a')), ch('b')]);
//! let input = TextBuffer::new("aab");
//! let result = EventRunner::new(grammar).run(&input).unwrap();
//! assert!(result.matched);
//! assert_eq!(result.end_index, 3);
//! ```

mod buffer;
pub mod class;
mod context;
mod error;
mod lines;
mod listener;
mod matcher;
pub mod matchers;
mod runner;

pub use buffer::TextBuffer;
pub use class::{ClassKey, MatcherClass};
pub use context::{MatchContext, MatchEvent};
pub use error::{EngineError, Result};
pub use lines::{LineIndex, LineRange, Position};
pub use listener::ParseListener;
pub use matcher::{Matcher, MatcherKey, Rule};
pub use matchers::ProxyMatcher;
pub use runner::{EventRunner, ParsingResult};

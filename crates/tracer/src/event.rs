use crate::catalog::{MatcherDescriptor, MatcherId};
use crate::classifier::MatcherCategory;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parent id recorded for the root invocation
pub const ROOT_PARENT: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Enter,
    Success,
    Failure,
}

impl EventKind {
    #[must_use]
    pub const fn is_exit(self) -> bool {
        !matches!(self, Self::Enter)
    }
}

/// One lifecycle point of one rule invocation
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: EventKind,
    /// Invocation id, shared by the ENTER and its exit
    pub node_id: u64,
    /// Invocation id of the enclosing rule, [`ROOT_PARENT`] for the root
    pub parent_id: i64,
    pub level: usize,
    pub matcher: Arc<MatcherDescriptor>,
    /// Where the invocation started
    pub start_offset: usize,
    /// Offset at this event: the start on ENTER, the end on exits
    pub offset: usize,
    /// Nanoseconds since the run started
    pub timestamp_nanos: u64,
    /// Only present on SUCCESS / FAILURE
    pub elapsed_nanos: Option<u64>,
}

impl TraceEvent {
    /// The node row this exit closes; `None` for ENTER
    #[must_use]
    pub fn node_record(&self) -> Option<NodeRecord> {
        let elapsed_nanos = self.elapsed_nanos?;
        if !self.kind.is_exit() {
            return None;
        }
        Some(NodeRecord {
            parent_id: self.parent_id,
            id: self.node_id,
            level: self.level,
            success: self.kind == EventKind::Success,
            matcher_id: self.matcher.id,
            start_offset: self.start_offset,
            end_offset: self.offset,
            elapsed_nanos,
        })
    }

    #[must_use]
    pub fn event_record(&self) -> EventRecord {
        EventRecord {
            kind: self.kind,
            timestamp: self.timestamp_nanos,
            offset: self.offset,
            matcher_id: self.matcher.id,
            matcher_class: self.matcher.class_name.clone(),
            category: self.matcher.category,
            level: self.level,
            node_id: self.node_id,
            parent_id: self.parent_id,
            elapsed_nanos: self.elapsed_nanos,
        }
    }
}

/// One completed invocation, as stored in `nodes.csv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub parent_id: i64,
    pub id: u64,
    pub level: usize,
    pub success: bool,
    pub matcher_id: MatcherId,
    pub start_offset: usize,
    pub end_offset: usize,
    pub elapsed_nanos: u64,
}

/// One event, as stored in `events.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: u64,
    pub offset: usize,
    pub matcher_id: MatcherId,
    pub matcher_class: String,
    pub category: MatcherCategory,
    pub level: usize,
    pub node_id: u64,
    pub parent_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_nanos: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor() -> Arc<MatcherDescriptor> {
        Arc::new(MatcherDescriptor {
            id: MatcherId(3),
            class_name: "CharMatcher".to_string(),
            category: MatcherCategory::Terminal,
            label: "'a'".to_string(),
        })
    }

    fn event(kind: EventKind, elapsed_nanos: Option<u64>) -> TraceEvent {
        TraceEvent {
            kind,
            node_id: 7,
            parent_id: 2,
            level: 1,
            matcher: descriptor(),
            start_offset: 4,
            offset: 5,
            timestamp_nanos: 1_000,
            elapsed_nanos,
        }
    }

    #[test]
    fn enter_has_no_node_row() {
        assert_eq!(event(EventKind::Enter, None).node_record(), None);
    }

    #[test]
    fn exit_becomes_node_row() {
        let row = event(EventKind::Failure, Some(250)).node_record().unwrap();
        assert_eq!(
            row,
            NodeRecord {
                parent_id: 2,
                id: 7,
                level: 1,
                success: false,
                matcher_id: MatcherId(3),
                start_offset: 4,
                end_offset: 5,
                elapsed_nanos: 250,
            }
        );
    }

    #[test]
    fn event_record_json_shape() {
        let json = serde_json::to_value(event(EventKind::Success, Some(9)).event_record()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "SUCCESS",
                "timestamp": 1000,
                "offset": 5,
                "matcherId": 3,
                "matcherClass": "CharMatcher",
                "category": "TERMINAL",
                "level": 1,
                "nodeId": 7,
                "parentId": 2,
                "elapsedNanos": 9
            })
        );

        let enter = serde_json::to_value(event(EventKind::Enter, None).event_record()).unwrap();
        assert!(enter.get("elapsedNanos").is_none());
    }
}

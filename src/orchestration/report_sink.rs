//! # Report Sink
//!
//! Live, shared report tree of one job. Workers write into it while the job
//! runs so `Orchestrator::get_reports` shows progress mid-run.
//!
//! Top-level items are appended in arrival order. Items recorded per object are
//! upserted: the `Running` item a plugin writes before risky work is replaced by
//! its terminal item, and a terminal item is never replaced again.

use crate::models::{PluginState, Report, ReportItem};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

/// Where an upserted item lives: top level, or nested under a section item
type SlotKey = (Option<usize>, String);

#[derive(Debug, Default)]
struct SinkState {
    report: Report,
    positions: HashMap<SlotKey, usize>,
}

#[derive(Debug, Default)]
pub struct ReportSink {
    state: Mutex<SinkState>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a top-level item, returning its position for use as a section
    pub fn push(&self, item: ReportItem) -> usize {
        let mut state = self.state.lock();
        state.report.add_item(item);
        state.report.len() - 1
    }

    /// Insert or replace the item recorded for `key` inside `section`.
    ///
    /// Returns false when an item with a terminal outcome is already recorded.
    pub fn upsert(&self, section: Option<usize>, key: &str, item: ReportItem) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let slot: SlotKey = (section, key.to_string());

        let items = match section {
            None => &mut state.report.items,
            Some(index) => match state.report.items.get_mut(index) {
                Some(parent) => &mut parent.items,
                None => {
                    warn!(section = index, object_id = key, "Report section does not exist");
                    return false;
                }
            },
        };

        match state.positions.get(&slot) {
            Some(&position) => match items.get_mut(position) {
                Some(existing) if existing.is_terminal() => false,
                Some(existing) => {
                    *existing = item;
                    true
                }
                None => false,
            },
            None => {
                items.push(item);
                state.positions.insert(slot, items.len() - 1);
                true
            }
        }
    }

    /// Set the outcome of a section item, returning a copy for persistence.
    ///
    /// A section that is already settled keeps its outcome and details.
    pub fn settle(
        &self,
        section: usize,
        outcome: PluginState,
        details: Option<&str>,
    ) -> Option<ReportItem> {
        let mut state = self.state.lock();
        let item = state.report.items.get_mut(section)?;
        if let Err(error) = item.set_outcome(outcome) {
            warn!(section, error = %error, "Report section already settled");
            return Some(item.clone());
        }
        if let Some(details) = details {
            item.add_details(details);
        }
        Some(item.clone())
    }

    pub fn snapshot(&self) -> Report {
        self.state.lock().report.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().report.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LiteReference, ObjectType};

    fn item(id: &str, state: PluginState) -> ReportItem {
        let mut item = ReportItem::new("p", "P", "1")
            .for_object(&LiteReference::new(ObjectType::AIP, id));
        if state.is_terminal() {
            item.set_outcome(state).unwrap();
        }
        item
    }

    #[test]
    fn test_running_item_is_replaced_by_terminal_item() {
        let sink = ReportSink::new();
        assert!(sink.upsert(None, "a", item("a", PluginState::Running)));
        assert!(sink.upsert(None, "a", item("a", PluginState::Success)));
        assert!(!sink.upsert(None, "a", item("a", PluginState::Failure)));

        let report = sink.snapshot();
        assert_eq!(report.len(), 1);
        assert_eq!(report.items[0].state(), PluginState::Success);
    }

    #[test]
    fn test_sections_nest_items() {
        let sink = ReportSink::new();
        let first = sink.push(ReportItem::new("step.a", "A", "1").at_step(0));
        let second = sink.push(ReportItem::new("step.b", "B", "1").at_step(1));
        assert!(sink.upsert(Some(first), "a", item("a", PluginState::Success)));
        assert!(sink.upsert(Some(second), "a", item("a", PluginState::Failure)));
        assert!(!sink.upsert(Some(7), "a", item("a", PluginState::Failure)));

        let settled = sink.settle(second, PluginState::Failure, Some("1 of 1 failed")).unwrap();
        assert_eq!(settled.details, "1 of 1 failed");

        let report = sink.snapshot();
        assert_eq!(report.items[0].items.len(), 1);
        assert_eq!(report.items[1].items[0].state(), PluginState::Failure);
        assert_eq!(report.items[1].state(), PluginState::Failure);
    }

    #[test]
    fn test_settled_section_keeps_its_outcome_and_details() {
        let sink = ReportSink::new();
        let section = sink.push(ReportItem::new("step.a", "A", "1").at_step(0));
        sink.settle(section, PluginState::Success, Some("2 of 2 succeeded"));

        let again = sink
            .settle(section, PluginState::Failure, Some("late failure"))
            .unwrap();
        assert_eq!(again.state(), PluginState::Success);
        assert_eq!(again.details, "2 of 2 succeeded");
        assert_eq!(sink.snapshot().items[0].details, "2 of 2 succeeded");
    }
}

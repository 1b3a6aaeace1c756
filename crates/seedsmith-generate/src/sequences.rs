use std::collections::BTreeMap;

use seedsmith_core::SchemaGraph;
use tracing::debug;

use crate::errors::{GenerationError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SequenceState {
    increment: i64,
    /// Next value to hand out.
    current: i64,
    start: i64,
}

/// Per-session view of every sequence the engine draws identifiers from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    sequences: BTreeMap<String, SequenceState>,
}

/// Opaque copy of the tracker used for rollback.
#[derive(Debug, Clone)]
pub struct SequenceSnapshot(BTreeMap<String, SequenceState>);

impl SequenceTracker {
    pub fn from_schema(schema: &SchemaGraph) -> Self {
        let mut tracker = Self::default();
        for (_, sequence) in schema.sequences() {
            tracker.sequences.insert(
                sequence.identifier.clone(),
                SequenceState {
                    increment: if sequence.increment == 0 {
                        1
                    } else {
                        sequence.increment
                    },
                    current: sequence.current,
                    start: sequence.restart_value(),
                },
            );
        }
        tracker
    }

    /// Hand out the current value and advance.
    pub fn next_value(&mut self, identifier: &str) -> Result<i64> {
        let state = self.sequences.get_mut(identifier).ok_or_else(|| {
            GenerationError::Configuration(format!("unknown sequence '{identifier}'"))
        })?;
        let value = state.current;
        state.current = state.current.checked_add(state.increment).ok_or_else(|| {
            GenerationError::Configuration(format!("sequence '{identifier}' overflowed"))
        })?;
        Ok(value)
    }

    /// Raise the sequence to at least `observed`; never lowers it.
    pub fn resync(&mut self, identifier: &str, observed: i64) {
        let state = self
            .sequences
            .entry(identifier.to_string())
            .or_insert(SequenceState {
                increment: 1,
                current: observed,
                start: 1,
            });
        if observed > state.current {
            debug!(sequence = %identifier, from = state.current, to = observed, "sequence raised");
            state.current = observed;
        }
    }

    /// Rewind to `restart`. Only valid together with a destructive reset of the store.
    pub fn reset(&mut self, identifier: &str, restart: i64) {
        if let Some(state) = self.sequences.get_mut(identifier) {
            state.current = restart;
        }
    }

    /// Value a destructive reset rewinds `identifier` to.
    pub fn restart_value(&self, identifier: &str) -> Option<i64> {
        self.sequences.get(identifier).map(|state| state.start)
    }

    pub fn current(&self, identifier: &str) -> Option<i64> {
        self.sequences.get(identifier).map(|state| state.current)
    }

    /// Identifier to next value, for every tracked sequence.
    pub fn values(&self) -> BTreeMap<String, i64> {
        self.sequences
            .iter()
            .map(|(identifier, state)| (identifier.clone(), state.current))
            .collect()
    }

    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot(self.sequences.clone())
    }

    pub fn restore(&mut self, snapshot: SequenceSnapshot) {
        self.sequences = snapshot.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedsmith_core::{Field, FieldType, Sequence, Table};

    fn schema() -> SchemaGraph {
        let mut sequence = Sequence::new("public.users_id_seq", 5);
        sequence.increment = 2;
        SchemaGraph {
            tables: vec![Table {
                schema: "public".to_string(),
                name: "users".to_string(),
                fields: vec![Field::new("id", FieldType::new("int4"))
                    .id()
                    .with_sequence(sequence)],
                primary_key: None,
                unique_constraints: Vec::new(),
            }],
            relationships: Vec::new(),
            enums: Vec::new(),
        }
    }

    #[test]
    fn hands_out_current_then_advances() {
        let mut tracker = SequenceTracker::from_schema(&schema());
        assert_eq!(tracker.next_value("public.users_id_seq").expect("next"), 5);
        assert_eq!(tracker.next_value("public.users_id_seq").expect("next"), 7);
        assert_eq!(tracker.current("public.users_id_seq"), Some(9));
        assert!(tracker.next_value("public.missing_seq").is_err());
    }

    #[test]
    fn resync_never_lowers() {
        let mut tracker = SequenceTracker::from_schema(&schema());
        tracker.resync("public.users_id_seq", 3);
        assert_eq!(tracker.current("public.users_id_seq"), Some(5));
        tracker.resync("public.users_id_seq", 40);
        assert_eq!(tracker.current("public.users_id_seq"), Some(40));

        tracker.resync("public.other_seq", 12);
        assert_eq!(tracker.next_value("public.other_seq").expect("next"), 12);
        assert_eq!(tracker.current("public.other_seq"), Some(13));
    }

    #[test]
    fn snapshot_restores_exactly() {
        let mut tracker = SequenceTracker::from_schema(&schema());
        let snapshot = tracker.snapshot();
        tracker.next_value("public.users_id_seq").expect("next");
        tracker.resync("public.other_seq", 3);
        tracker.restore(snapshot);
        assert_eq!(tracker, SequenceTracker::from_schema(&schema()));
    }

    #[test]
    fn reset_rewinds_to_start() {
        let mut tracker = SequenceTracker::from_schema(&schema());
        tracker.next_value("public.users_id_seq").expect("next");
        let restart = tracker.restart_value("public.users_id_seq").expect("restart");
        tracker.reset("public.users_id_seq", restart);
        assert_eq!(tracker.current("public.users_id_seq"), Some(1));
    }
}

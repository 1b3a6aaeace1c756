//! Generation planner.
//!
//! Turns a nested [`TableRequest`] into an ordered [`PersistBatch`]. Rows are
//! created depth-first: required parents before the row, nested children
//! after it, and deferred references (nullable edges inside a relationship
//! cycle) are filled by update operations once both rows exist. Inserts are
//! finally ordered by dependency rank so every parent precedes its children.

use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use rand::Rng;
use seedsmith_core::{DependencyReport, Relationship, SchemaGraph, Table};
use seedsmith_plan::{
    Count, EngineOptions, FieldHints, ParentRequest, TableRequest, validate_request,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::{PersistBatch, PersistOp};
use crate::errors::{GenerationError, Result, UniquenessViolation};
use crate::generators::{FieldInput, Seed, generate};
use crate::model::PlanReport;
use crate::sequences::SequenceTracker;
use crate::store::{GeneratedRow, KeyConflict, RowStore, key_for};
use crate::value::{GeneratedValue, RowValues, row_to_json};

/// Stateless planner bound to one session's schema and settings.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    schema: &'a SchemaGraph,
    dependencies: &'a DependencyReport,
    hints: &'a FieldHints,
    options: &'a EngineOptions,
    base_seed: &'a str,
}

impl<'a> Planner<'a> {
    pub fn new(
        schema: &'a SchemaGraph,
        dependencies: &'a DependencyReport,
        hints: &'a FieldHints,
        options: &'a EngineOptions,
        base_seed: &'a str,
    ) -> Self {
        Self {
            schema,
            dependencies,
            hints,
            options,
            base_seed,
        }
    }

    /// Generate every row of `request`.
    ///
    /// Rows are registered in `store` and identifiers drawn from `tracker` as
    /// the plan proceeds. On error both are left partially mutated: callers
    /// wrap the call in a store transaction and a tracker snapshot.
    pub fn plan(
        &self,
        plan_index: u64,
        request: &TableRequest,
        store: &mut RowStore,
        tracker: &mut SequenceTracker,
    ) -> Result<(PersistBatch, PlanReport)> {
        let start = Instant::now();

        let validation = validate_request(self.schema, request);
        for issue in &validation.warnings {
            warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
        }
        if !validation.is_ok() {
            return Err(GenerationError::InvalidRequest(validation));
        }
        self.check_satisfiable(request)?;

        let root_seed = Seed::derive(format!("{}/{plan_index}/{}", self.base_seed, request.table));
        let rows = resolve_count(request.count, &root_seed.child("count"));
        info!(plan_index, table = %request.table, rows, "plan started");

        let mut run = PlanRun {
            planner: *self,
            store,
            tracker,
            plan_index,
            inserts: Vec::new(),
            updates: Vec::new(),
            touched_sequences: BTreeSet::new(),
            report: PlanReport::new(plan_index),
        };
        for _ in 0..rows {
            run.create_row(request, None)?;
        }

        let (batch, mut report) = run.finish();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            plan_index,
            ops = batch.ops.len(),
            rows = report.rows_total,
            retries = report.retries_total,
            duration_ms = report.duration_ms,
            "plan completed"
        );
        Ok((batch, report))
    }

    /// Reject requests that would need rows of a table on a required cycle.
    fn check_satisfiable(&self, request: &TableRequest) -> Result<()> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = request.tables().into_iter().collect();

        while let Some(table) = queue.pop_front() {
            if !seen.insert(table.clone()) {
                continue;
            }
            for relationship in self.schema.parents_of(&table) {
                if !relationship.is_nullable && !self.dependencies.is_deferred(&relationship.name)
                {
                    queue.push_back(relationship.parent.clone());
                }
            }
        }

        let blocked: Vec<String> = seen
            .into_iter()
            .filter(|table| !self.dependencies.is_satisfiable(table))
            .collect();
        if blocked.is_empty() {
            Ok(())
        } else {
            Err(GenerationError::Core(
                seedsmith_core::Error::UnsatisfiableCycle(blocked),
            ))
        }
    }
}

/// Foreign key values handed down from an enclosing request.
struct Inherited<'a> {
    relationship: &'a Relationship,
    parent: RowValues,
}

/// What to do with a deferred relationship once the row is registered.
enum Deferred<'r> {
    Values(RowValues),
    Create(&'r TableRequest),
    Connect { explicit: bool },
    Skip,
}

struct PlanRun<'p, 'a> {
    planner: Planner<'a>,
    store: &'p mut RowStore,
    tracker: &'p mut SequenceTracker,
    plan_index: u64,
    inserts: Vec<(usize, PersistOp)>,
    updates: Vec<PersistOp>,
    touched_sequences: BTreeSet<String>,
    report: PlanReport,
}

impl<'a> PlanRun<'_, 'a> {
    fn create_row(
        &mut self,
        request: &TableRequest,
        inherited: Option<Inherited<'a>>,
    ) -> Result<RowValues> {
        let schema: &'a SchemaGraph = self.planner.schema;
        let table = schema.table(&request.table).ok_or_else(|| {
            GenerationError::Configuration(format!("table '{}' not found", request.table))
        })?;
        let table_id = table.id();
        let ordinal = self.store.reserve(&table_id)?;
        let row_path = format!("{}/{table_id}/{ordinal}", self.plan_index);
        let row_seed = Seed::derive(format!("{}/{row_path}", self.planner.base_seed));
        let connect_default = request.connect.unwrap_or(self.planner.options.connect);

        let mut fixed = RowValues::new();
        let mut connected: Vec<&'a Relationship> = Vec::new();
        let mut deferred: Vec<(&'a Relationship, Deferred<'_>)> = Vec::new();

        for relationship in schema.parents_of(&table_id) {
            let explicit = relationship
                .from_fields
                .iter()
                .all(|field| request.fields.contains_key(field));
            let inherited_values = inherited
                .as_ref()
                .filter(|inherited| inherited.relationship.name == relationship.name)
                .map(|inherited| project(relationship, &inherited.parent));

            if self.planner.dependencies.is_deferred(&relationship.name) {
                let action = match (inherited_values, request.parents.get(&relationship.name)) {
                    (Some(values), _) => Deferred::Values(values),
                    _ if explicit => continue,
                    (None, Some(ParentRequest::Create(parent))) => Deferred::Create(parent),
                    (None, Some(ParentRequest::Connect)) => Deferred::Connect { explicit: true },
                    (None, Some(ParentRequest::Null)) => Deferred::Skip,
                    (None, None) if connect_default => Deferred::Connect { explicit: false },
                    (None, None) => Deferred::Skip,
                };
                set_null(&mut fixed, relationship);
                deferred.push((relationship, action));
                continue;
            }

            if let Some(values) = inherited_values {
                fixed.extend(values);
                continue;
            }
            if explicit {
                continue;
            }

            match request.parents.get(&relationship.name) {
                Some(ParentRequest::Create(parent)) => {
                    let parent = self.create_row(parent, None)?;
                    fixed.extend(project(relationship, &parent));
                }
                Some(ParentRequest::Connect) => {
                    if self.store.candidates(&relationship.parent).is_empty() {
                        return Err(nothing_to_connect(relationship, &table_id));
                    }
                    connected.push(relationship);
                }
                Some(ParentRequest::Null) => set_null(&mut fixed, relationship),
                None => {
                    let available = !self.store.candidates(&relationship.parent).is_empty();
                    if connect_default && available {
                        connected.push(relationship);
                    } else if relationship.is_nullable {
                        set_null(&mut fixed, relationship);
                    } else {
                        let parent = self.create_row(&TableRequest::new(&relationship.parent), None)?;
                        fixed.extend(project(relationship, &parent));
                    }
                }
            }
        }

        let mut values = self.generate_unique(
            table,
            request,
            &row_seed,
            &row_path,
            &fixed,
            &connected,
        )?;
        self.draw_sequences(table, &row_path, &mut values)?;

        self.store.register(GeneratedRow {
            table: table_id.clone(),
            ordinal,
            seed_path: row_path.clone(),
            values: values.clone(),
            external: false,
        })?;
        let rank = self
            .planner
            .dependencies
            .rank(&table_id)
            .unwrap_or(usize::MAX);
        self.inserts.push((
            rank,
            PersistOp::Insert {
                table: table_id.clone(),
                ordinal,
                values,
            },
        ));
        self.report.record_row(&table_id);
        if !connected.is_empty() {
            self.report.record_connect(&table_id);
        }
        debug!(table = %table_id, ordinal, seed = %row_path, "row registered");

        for (relationship, action) in deferred {
            let patch = match action {
                Deferred::Values(values) => Some(values),
                Deferred::Create(parent) => {
                    let parent = self.create_row(parent, None)?;
                    Some(project(relationship, &parent))
                }
                Deferred::Connect { explicit } => {
                    let pool: Vec<&GeneratedRow> = self
                        .store
                        .candidates(&relationship.parent)
                        .iter()
                        .filter(|row| {
                            explicit
                                || !(relationship.is_self_reference() && row.ordinal == ordinal)
                        })
                        .collect();
                    if pool.is_empty() {
                        if explicit {
                            return Err(nothing_to_connect(relationship, &table_id));
                        }
                        None
                    } else {
                        let pick = row_seed
                            .child(&relationship.name)
                            .rng()
                            .random_range(0..pool.len());
                        Some(project(relationship, &pool[pick].values))
                    }
                }
                Deferred::Skip => None,
            };

            if let Some(patch) = patch {
                self.patch_row(&table_id, ordinal, patch)?;
            }
        }

        for (name, child) in &request.children {
            let relationship = schema.relationship(name).ok_or_else(|| {
                GenerationError::Configuration(format!("relationship '{name}' not found"))
            })?;
            let parent = self.current_values(&table_id, ordinal)?;
            let count = resolve_count(child.count, &row_seed.child(&format!("children/{name}")));
            for _ in 0..count {
                self.create_row(
                    child,
                    Some(Inherited {
                        relationship,
                        parent: parent.clone(),
                    }),
                )?;
            }
        }

        self.current_values(&table_id, ordinal)
    }

    /// Assign scalar fields, re-rolling salted seeds until every unique key is free.
    fn generate_unique(
        &mut self,
        table: &Table,
        request: &TableRequest,
        row_seed: &Seed,
        row_path: &str,
        fixed: &RowValues,
        connected: &[&Relationship],
    ) -> Result<RowValues> {
        let table_id = table.id();
        let max_retries = self.planner.options.max_unique_retries;
        let mut attempt = 0_u32;

        loop {
            let mut values = fixed.clone();

            for relationship in connected {
                let candidates = self.store.candidates(&relationship.parent);
                if candidates.is_empty() {
                    return Err(nothing_to_connect(relationship, &table_id));
                }
                let pick = row_seed
                    .child(&relationship.name)
                    .salted(attempt)
                    .rng()
                    .random_range(0..candidates.len());
                values.extend(project(relationship, &candidates[pick].values));
            }

            for field in &table.fields {
                if values.contains_key(&field.name) || !field.should_generate() {
                    continue;
                }
                if field.always_null {
                    values.insert(field.name.clone(), GeneratedValue::Null);
                    continue;
                }

                let seed = row_seed.child(&field.name).salted(attempt);
                let input = FieldInput {
                    schema: self.planner.schema,
                    table,
                    field,
                    hint: self.planner.hints.get(&table_id, &field.name),
                    row: &values,
                };
                let value = generate(&seed, request.fields.get(&field.name), &input)?;
                values.insert(field.name.clone(), value);
            }

            let Some(conflict) = self.store.find_conflict(&table_id, &values, None) else {
                return Ok(values);
            };
            if attempt >= max_retries {
                warn!(
                    table = %table_id,
                    constraint = %conflict.constraint.name,
                    attempts = attempt + 1,
                    "unique values exhausted"
                );
                return Err(violation(&table_id, conflict, row_path, attempt + 1, &values));
            }

            debug!(
                table = %table_id,
                constraint = %conflict.constraint.name,
                attempt,
                "unique collision; retrying with salted seed"
            );
            self.report.record_retry(&table_id);
            attempt += 1;
        }
    }

    /// Resolve sequence-backed identifiers, skipping values already taken.
    fn draw_sequences(&mut self, table: &Table, row_path: &str, values: &mut RowValues) -> Result<()> {
        let table_id = table.id();
        let max_skips = self.planner.options.max_unique_retries;

        for field in table.fields.iter().filter(|field| field.is_sequence_backed()) {
            let Some(sequence) = field.sequence.as_ref() else {
                continue;
            };
            self.touched_sequences.insert(sequence.identifier.clone());

            let mut skips = 0_u32;
            loop {
                let next = self.tracker.next_value(&sequence.identifier)?;
                values.insert(field.name.clone(), GeneratedValue::Int(next));

                let Some(conflict) = self.store.find_conflict(&table_id, values, None) else {
                    break;
                };
                if skips >= max_skips {
                    return Err(violation(&table_id, conflict, row_path, skips + 1, values));
                }
                warn!(
                    table = %table_id,
                    sequence = %sequence.identifier,
                    value = next,
                    constraint = %conflict.constraint.name,
                    "sequence value already taken; skipping"
                );
                self.report.record_sequence_skip(&table_id);
                skips += 1;
            }
        }

        Ok(())
    }

    fn patch_row(&mut self, table_id: &str, ordinal: usize, patch: RowValues) -> Result<()> {
        for (field, value) in &patch {
            self.store.patch(table_id, ordinal, field, value.clone())?;
        }

        let current = self.current_values(table_id, ordinal)?;
        let key: RowValues = self
            .store
            .unique_keys(table_id)
            .iter()
            .find(|unique| {
                key_for(unique, &current).is_some()
                    && unique.fields.iter().all(|field| !patch.contains_key(field))
            })
            .map(|unique| {
                unique
                    .fields
                    .iter()
                    .filter_map(|field| {
                        current
                            .get(field)
                            .map(|value| (field.clone(), value.clone()))
                    })
                    .collect()
            })
            .unwrap_or_else(|| {
                current
                    .iter()
                    .filter(|(field, _)| !patch.contains_key(*field))
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            });

        self.updates.push(PersistOp::Update {
            table: table_id.to_string(),
            ordinal,
            key,
            values: patch,
        });
        self.report.record_patch(table_id);
        Ok(())
    }

    fn current_values(&self, table_id: &str, ordinal: usize) -> Result<RowValues> {
        self.store
            .row(table_id, ordinal)
            .map(|row| row.values.clone())
            .ok_or_else(|| {
                GenerationError::Configuration(format!(
                    "row {ordinal} of '{table_id}' is not registered"
                ))
            })
    }

    fn finish(mut self) -> (PersistBatch, PlanReport) {
        self.inserts.sort_by_key(|(rank, _)| *rank);
        let mut ops: Vec<PersistOp> = self.inserts.into_iter().map(|(_, op)| op).collect();
        ops.extend(self.updates);

        let sequences = self
            .touched_sequences
            .iter()
            .filter_map(|identifier| {
                self.tracker
                    .current(identifier)
                    .map(|current| (identifier.clone(), current))
            })
            .collect();

        (
            PersistBatch {
                plan_index: self.plan_index,
                ops,
                sequences,
            },
            self.report,
        )
    }
}

/// Child-side values a relationship copies from a parent row.
fn project(relationship: &Relationship, parent: &RowValues) -> RowValues {
    relationship
        .field_pairs()
        .map(|(child_field, parent_field)| {
            (
                child_field.to_string(),
                parent.get(parent_field).cloned().unwrap_or(GeneratedValue::Null),
            )
        })
        .collect()
}

fn set_null(values: &mut RowValues, relationship: &Relationship) {
    for field in &relationship.from_fields {
        values.insert(field.clone(), GeneratedValue::Null);
    }
}

fn resolve_count(count: Count, seed: &Seed) -> u64 {
    match count {
        Count::Exact(rows) => rows,
        Count::Range { min, max } if max <= min => min,
        Count::Range { min, max } => seed.rng().random_range(min..=max),
    }
}

fn nothing_to_connect(relationship: &Relationship, table_id: &str) -> GenerationError {
    GenerationError::Configuration(format!(
        "no rows of '{}' to connect through '{}' for '{table_id}'",
        relationship.parent, relationship.name
    ))
}

fn violation(
    table_id: &str,
    conflict: KeyConflict,
    row_path: &str,
    attempts: u32,
    values: &RowValues,
) -> GenerationError {
    GenerationError::UniquenessExhausted(Box::new(UniquenessViolation {
        constraint: conflict.constraint.name,
        table: table_id.to_string(),
        fields: conflict.constraint.fields,
        values: conflict.values.iter().map(ToString::to_string).collect(),
        seed_path: row_path.to_string(),
        attempts,
        row: Value::Object(row_to_json(values).into_iter().collect()),
    }))
}

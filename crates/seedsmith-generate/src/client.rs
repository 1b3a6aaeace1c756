//! Seed session: the public entry point of the engine.

use seedsmith_core::{
    DependencyReport, SchemaGraph, Selection, analyze_dependencies, compute_included_tables,
    filter_schema, validate_schema,
};
use seedsmith_plan::{FieldHints, SeedConfig, TableRequest};
use serde_json::Value;
use tracing::{info, warn};

use crate::adapter::{PersistBatch, PersistOp, PersistenceSink, ResetRequest, StateSource};
use crate::engine::Planner;
use crate::errors::{GenerationError, PersistenceFailure, Result};
use crate::model::{PlanReport, SeedOutcome};
use crate::sequences::{SequenceSnapshot, SequenceTracker};
use crate::sinks::MemorySink;
use crate::store::RowStore;
use crate::value::{GeneratedValue, RowValues, row_to_json};

/// One seeding session.
///
/// The client owns the row store, the sequence tracker and the plan counter
/// for its lifetime. Every `plan` or `seed` call either completes or leaves
/// that state exactly as it was before the call.
pub struct SeedClient {
    schema: SchemaGraph,
    dependencies: DependencyReport,
    config: SeedConfig,
    hints: FieldHints,
    store: RowStore,
    tracker: SequenceTracker,
    plan_counter: u64,
    sink: Box<dyn PersistenceSink>,
    source: Option<Box<dyn StateSource>>,
    blocked: bool,
}

impl SeedClient {
    /// Build a session over `schema` restricted by `config.select`.
    ///
    /// Batches go to a [`MemorySink`] until another sink is attached.
    pub fn new(schema: SchemaGraph, config: SeedConfig) -> Result<Self> {
        validate_schema(&schema)?;
        let selection = Selection::parse(config.select.as_slice())?;
        let schema = filter_schema(&schema, &selection)?;
        let dependencies = analyze_dependencies(&schema);
        if !dependencies.unsatisfiable.is_empty() {
            warn!(
                tables = ?dependencies.unsatisfiable,
                "tables on required relationship cycles cannot be seeded"
            );
        }

        let store = RowStore::new(&schema);
        let tracker = SequenceTracker::from_schema(&schema);
        let hints = config.hints();
        info!(
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            deferred = dependencies.deferred.len(),
            seed = %config.seed,
            "seed session created"
        );

        Ok(Self {
            schema,
            dependencies,
            config,
            hints,
            store,
            tracker,
            plan_counter: 0,
            sink: Box::new(MemorySink::new()),
            source: None,
            blocked: false,
        })
    }

    pub fn with_sink(mut self, sink: impl PersistenceSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_state_source(mut self, source: impl StateSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Generate rows for `request` without persisting them.
    ///
    /// The rows are still registered, so later requests see them as
    /// existing parents and taken unique keys.
    pub fn plan(&mut self, request: &TableRequest) -> Result<SeedOutcome> {
        let (batch, report, _) = self.prepare(request)?;
        self.finish(batch, report, false)
    }

    /// Generate rows for `request` and hand the batch to the sink.
    ///
    /// A sink failure rolls the session back as if the request never ran.
    /// With `options.dry_run` set this behaves like [`SeedClient::plan`].
    pub async fn seed(&mut self, request: &TableRequest) -> Result<SeedOutcome> {
        let (batch, report, snapshot) = self.prepare(request)?;
        if self.config.options.dry_run {
            return self.finish(batch, report, false);
        }

        if let Err(err) = self.sink.persist(&batch).await {
            let failing = err.op_index.and_then(|index| batch.ops.get(index));
            let err = GenerationError::Persistence(Box::new(PersistenceFailure {
                op_index: err.op_index,
                table: failing.map(|op| op.table().to_string()),
                ordinal: failing.map(PersistOp::ordinal),
                row: failing.map(|op| {
                    Value::Object(row_to_json(op.values()).into_iter().collect())
                }),
                message: err.message,
            }));
            self.abort(snapshot, &err);
            return Err(err);
        }

        self.finish(batch, report, true)
    }

    /// Pull sequence positions and existing rows from the state source.
    ///
    /// Rows inserted behind the session's back are invisible to the engine
    /// until this runs: calling it after out-of-band writes is the caller's
    /// job. A failure blocks `plan` and `seed` until a later sync succeeds.
    pub async fn sync(&mut self) -> Result<()> {
        let Some(source) = self.source.as_deref() else {
            return Err(GenerationError::Configuration(
                "no state source attached to the session".to_string(),
            ));
        };

        match pull_state(source, &self.schema, &mut self.store, &mut self.tracker).await {
            Ok((sequences, rows)) => {
                self.blocked = false;
                info!(sequences, rows, "session state synced");
                Ok(())
            }
            Err(err) => {
                self.blocked = true;
                warn!(error = %err, "sync failed; session blocked");
                Err(err)
            }
        }
    }

    /// Empty the tables matched by `patterns` (every table when empty) and
    /// restart the sequences they own. Returns the affected table ids.
    pub async fn reset<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<Vec<String>> {
        let table_ids = self.schema.table_ids();
        let tables = if patterns.is_empty() {
            table_ids
        } else {
            compute_included_tables(table_ids.as_slice(), patterns)?
        };

        let sequences = self
            .schema
            .sequences()
            .filter(|(table, _)| tables.contains(table))
            .map(|(_, sequence)| {
                let restart = self
                    .tracker
                    .restart_value(&sequence.identifier)
                    .unwrap_or_else(|| sequence.restart_value());
                (sequence.identifier.clone(), restart)
            })
            .collect();
        let request = ResetRequest {
            tables: tables.clone(),
            sequences,
        };

        if let Err(err) = self.sink.reset(&request).await {
            self.blocked = true;
            warn!(error = %err, "reset failed; session blocked");
            return Err(GenerationError::Persistence(Box::new(PersistenceFailure {
                op_index: None,
                table: None,
                ordinal: None,
                row: None,
                message: err.message,
            })));
        }

        self.store.reset_tables(&tables);
        for (identifier, restart) in &request.sequences {
            self.tracker.reset(identifier, *restart);
        }
        info!(tables = tables.len(), sequences = request.sequences.len(), "tables reset");

        if self.source.is_some() {
            self.sync().await?;
        }
        Ok(tables)
    }

    /// Filtered schema the session generates against.
    pub fn schema(&self) -> &SchemaGraph {
        &self.schema
    }

    pub fn dependencies(&self) -> &DependencyReport {
        &self.dependencies
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Number of plans completed so far.
    pub fn plan_count(&self) -> u64 {
        self.plan_counter
    }

    /// Run the planner inside a store transaction, rolling back on failure.
    ///
    /// On success the transaction is left open for `finish` or `abort`.
    fn prepare(
        &mut self,
        request: &TableRequest,
    ) -> Result<(PersistBatch, PlanReport, SequenceSnapshot)> {
        if self.blocked {
            return Err(GenerationError::ResyncRequired);
        }

        let snapshot = self.tracker.snapshot();
        self.store.begin();
        let planner = Planner::new(
            &self.schema,
            &self.dependencies,
            &self.hints,
            &self.config.options,
            &self.config.seed,
        );

        match planner.plan(self.plan_counter, request, &mut self.store, &mut self.tracker) {
            Ok((batch, report)) => Ok((batch, report, snapshot)),
            Err(err) => {
                self.abort(snapshot, &err);
                Err(err)
            }
        }
    }

    fn finish(
        &mut self,
        batch: PersistBatch,
        report: PlanReport,
        persisted: bool,
    ) -> Result<SeedOutcome> {
        self.store.commit();
        self.plan_counter += 1;
        info!(
            plan_index = batch.plan_index,
            ops = batch.ops.len(),
            persisted,
            "plan committed"
        );
        Ok(SeedOutcome {
            batch,
            report,
            persisted,
        })
    }

    fn abort(&mut self, snapshot: SequenceSnapshot, err: &GenerationError) {
        self.store.rollback();
        self.tracker.restore(snapshot);
        warn!(plan_index = self.plan_counter, error = %err, "plan rolled back");
    }
}

/// Returns the number of sequences reported and rows absorbed.
async fn pull_state(
    source: &dyn StateSource,
    schema: &SchemaGraph,
    store: &mut RowStore,
    tracker: &mut SequenceTracker,
) -> Result<(usize, usize)> {
    let sequences = source
        .current_sequences()
        .await
        .map_err(|err| GenerationError::Resync(err.to_string()))?;
    for (identifier, next) in &sequences {
        tracker.resync(identifier, *next);
    }

    let mut absorbed = 0;
    for table in &schema.tables {
        let table_id = table.id();
        let rows = source
            .existing_rows(table)
            .await
            .map_err(|err| GenerationError::Resync(format!("{table_id}: {err}")))?;

        for raw in rows {
            let mut values = RowValues::new();
            for (name, value) in raw {
                let Some(field) = table.field(&name) else {
                    continue;
                };
                let value = GeneratedValue::from_json(&value, &field.field_type).map_err(|err| {
                    GenerationError::Resync(format!("{table_id}.{name}: {err}"))
                })?;
                values.insert(name, value);
            }

            for field in table.fields.iter().filter(|field| field.is_sequence_backed()) {
                if let Some(sequence) = field.sequence.as_ref()
                    && sequence.increment > 0
                    && let Some(id) = values.get(&field.name).and_then(GeneratedValue::as_i64)
                {
                    tracker.resync(&sequence.identifier, id.saturating_add(sequence.increment));
                }
            }

            if store.absorb_external(&table_id, values)? {
                absorbed += 1;
            }
        }
    }

    Ok((sequences.len(), absorbed))
}

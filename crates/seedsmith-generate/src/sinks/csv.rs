use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use seedsmith_core::{SchemaGraph, Table};
use serde_json::Value;
use tracing::debug;

use crate::adapter::{PersistBatch, PersistOp, PersistenceSink, ResetRequest, SinkError};
use crate::value::{RowValues, row_to_json};

/// Appends rows to one `<table>.csv` per table in an output directory.
///
/// Columns follow the schema's field order. Deferred references are folded
/// into their insert when both sit in the same batch; anything else lands in
/// `<table>.patches.csv` as `key,field,value` records.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
    schema: SchemaGraph,
    bytes_written: u64,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>, schema: &SchemaGraph) -> Self {
        Self {
            dir: dir.into(),
            schema: schema.clone(),
            bytes_written: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    pub fn patches_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.patches.csv"))
    }

    /// Total bytes appended across all files.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_table(&self, table: &Table, rows: &[RowValues]) -> Result<u64, csv::Error> {
        let path = self.table_path(&table.id());
        let header: Vec<&str> = table.fields.iter().map(|field| field.name.as_str()).collect();
        let records = rows.iter().map(|row| {
            table
                .fields
                .iter()
                .map(|field| {
                    row.get(&field.name)
                        .map(|value| value.to_csv())
                        .unwrap_or_default()
                })
                .collect::<Vec<String>>()
        });
        append_records(&path, &header, records)
    }

    fn write_patches(&self, table: &str, patches: &[(String, String, String)]) -> Result<u64, csv::Error> {
        let records = patches
            .iter()
            .map(|(key, field, value)| vec![key.clone(), field.clone(), value.clone()]);
        append_records(&self.patches_path(table), &["key", "field", "value"], records)
    }
}

#[async_trait]
impl PersistenceSink for CsvSink {
    async fn persist(&mut self, batch: &PersistBatch) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).map_err(|err| SinkError::new(err.to_string()))?;

        let mut inserts: BTreeMap<&str, Vec<(usize, RowValues)>> = BTreeMap::new();
        let mut patches: BTreeMap<&str, Vec<(String, String, String)>> = BTreeMap::new();

        for (index, op) in batch.ops.iter().enumerate() {
            match op {
                PersistOp::Insert {
                    table,
                    ordinal,
                    values,
                } => {
                    if self.schema.table(table).is_none() {
                        return Err(SinkError::at(index, format!("unknown table '{table}'")));
                    }
                    inserts
                        .entry(table)
                        .or_default()
                        .push((*ordinal, values.clone()));
                }
                PersistOp::Update {
                    table,
                    ordinal,
                    key,
                    values,
                } => {
                    let pending = inserts
                        .get_mut(table.as_str())
                        .and_then(|rows| rows.iter_mut().find(|(row, _)| row == ordinal));
                    match pending {
                        Some((_, row)) => row.extend(values.clone()),
                        None => {
                            let key = Value::Object(row_to_json(key).into_iter().collect()).to_string();
                            patches.entry(table).or_default().extend(
                                values
                                    .iter()
                                    .map(|(field, value)| (key.clone(), field.clone(), value.to_csv())),
                            );
                        }
                    }
                }
            }
        }

        let mut written = 0;
        for (table_id, rows) in &inserts {
            let Some(table) = self.schema.table(table_id) else {
                continue;
            };
            let rows: Vec<RowValues> = rows.iter().map(|(_, values)| values.clone()).collect();
            written += self
                .write_table(table, &rows)
                .map_err(|err| SinkError::new(format!("{table_id}: {err}")))?;
        }
        for (table_id, records) in &patches {
            written += self
                .write_patches(table_id, records)
                .map_err(|err| SinkError::new(format!("{table_id}: {err}")))?;
        }

        self.bytes_written = self.bytes_written.saturating_add(written);
        debug!(
            plan_index = batch.plan_index,
            tables = inserts.len(),
            bytes = written,
            "csv batch written"
        );
        Ok(())
    }

    async fn reset(&mut self, request: &ResetRequest) -> Result<(), SinkError> {
        for table in &request.tables {
            for path in [self.table_path(table), self.patches_path(table)] {
                if path.exists() {
                    fs::remove_file(&path).map_err(|err| {
                        SinkError::new(format!("{}: {err}", path.display()))
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Append records to `path`, writing `header` first when the file is new.
fn append_records<I>(path: &Path, header: &[&str], records: I) -> Result<u64, csv::Error>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(csv::Error::from)?;
    let counting = CountingWriter::new(BufWriter::new(file));
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    if is_new {
        writer.write_record(header)?;
    }
    for record in records {
        writer.write_record(&record)?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

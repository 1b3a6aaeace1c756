//! Bundled persistence sinks.

pub mod csv;
pub mod memory;

pub use csv::CsvSink;
pub use memory::MemorySink;

/// `public.users` rendered as `"public"."users"`.
pub(crate) fn quote_table(table_id: &str) -> String {
    table_id
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

use std::fs;
use std::path::Path;

use seedsmith_core::SchemaGraph;
use seedsmith_generate::{LogFormat, MemorySink, SeedClient, init_logging};
use seedsmith_plan::{SeedConfig, TableRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Plain)?;

    let schema_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../seedsmith-core/tests/fixtures/blog.schema.json");
    let request_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../seedsmith-plan/tests/fixtures/users_with_posts.request.json");
    let schema: SchemaGraph = serde_json::from_str(&fs::read_to_string(schema_path)?)?;
    let request: TableRequest = serde_json::from_str(&fs::read_to_string(request_path)?)?;

    let sink = MemorySink::new();
    let mut session = SeedClient::new(schema, SeedConfig::default())?.with_sink(sink.clone());
    let outcome = session.seed(&request).await?;

    for statement in sink.statements() {
        println!("{statement}");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    Ok(())
}

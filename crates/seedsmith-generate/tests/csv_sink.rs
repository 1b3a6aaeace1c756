use std::fs;
use std::path::{Path, PathBuf};

use seedsmith_core::SchemaGraph;
use seedsmith_generate::{CsvSink, SeedClient};
use seedsmith_plan::{SeedConfig, TableRequest};
use uuid::Uuid;

fn load_blog() -> SchemaGraph {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../seedsmith-core/tests/fixtures/blog.schema.json");
    let contents =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing json at {}", path.display()));
    serde_json::from_str(&contents).expect("parse schema graph")
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("seedsmith-csv-{}", Uuid::new_v4()))
}

fn read_records(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .expect("open csv");
    reader
        .records()
        .map(|record| {
            record
                .expect("csv record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn appends_rows_per_table_with_one_header() {
    let dir = temp_dir();
    let schema = load_blog();
    let sink = CsvSink::new(&dir, &schema);
    let mut session = SeedClient::new(schema, SeedConfig::default())
        .expect("session")
        .with_sink(sink);

    session
        .seed(&TableRequest::new("public.users").with_count(2))
        .await
        .expect("first seed");
    session
        .seed(&TableRequest::new("public.users").with_count(3))
        .await
        .expect("second seed");

    let records = read_records(&dir.join("public.users.csv"));
    assert_eq!(
        records[0],
        vec!["id", "email", "full_name", "mood", "created_at"]
    );
    assert_eq!(records.len(), 6);
    let ids: Vec<&str> = records[1..].iter().map(|record| record[0].as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[tokio::test]
async fn folds_same_batch_patches_into_inserts() {
    let dir = temp_dir();
    let schema = load_blog();
    let mut session = SeedClient::new(schema.clone(), SeedConfig::default())
        .expect("session")
        .with_sink(CsvSink::new(&dir, &schema));

    let request = TableRequest::new("public.employees").with_child(
        "employees_manager_id_fkey",
        TableRequest::new("public.employees").with_count(2),
    );
    session.seed(&request).await.expect("seed");

    let records = read_records(&dir.join("public.employees.csv"));
    assert_eq!(records[0], vec!["id", "manager_id", "first_name"]);
    let managers: Vec<&str> = records[1..].iter().map(|record| record[1].as_str()).collect();
    assert_eq!(managers, vec!["", "1", "1"]);
    assert!(!dir.join("public.employees.patches.csv").exists());

    session.reset(&["public.employees"]).await.expect("reset");
    assert!(!dir.join("public.employees.csv").exists());

    fs::remove_dir_all(&dir).expect("cleanup");
}

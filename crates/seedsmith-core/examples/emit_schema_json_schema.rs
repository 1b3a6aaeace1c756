use schemars::schema_for;
use seedsmith_core::SchemaGraph;

fn main() {
    let schema = schema_for!(SchemaGraph);
    let json = serde_json::to_string_pretty(&schema).expect("serialize schema graph json schema");
    println!("{json}");
}

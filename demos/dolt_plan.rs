//! Renders the statements an apply would send to Dolt, without running them.
//!
//! Loads a YAML manifest, pairs it with an (empty) state file and prints
//! every plan in the MySQL grammar, version commits included.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rowsync-demos --example dolt_plan
//! ```

use rowsync_core::{Change, Dialect, ReconcileOptions, diff_resources, plan_change};
use rowsync_state::{Manifest, StateFile};

const MANIFEST: &str = r#"
commit:
  message: "sync reference data"
  author_name: "Ops Bot"
  author_email: "ops@example.com"
resources:
  countries:
    kind: table
    database: geo
    name: countries
    query: "CREATE TABLE countries (code CHAR(2) PRIMARY KEY, name VARCHAR(64))"
  countries_rows:
    kind: row_set
    database: geo
    table: countries
    unique_column: code
    columns: [code, name]
    rows:
      "FI": ["FI", "Finland"]
      "IE": ["IE", "Ireland"]
      "CI": ["CI", "Côte d'Ivoire"]
  europe:
    kind: view
    database: geo
    name: europe
    query: "SELECT * FROM countries WHERE code IN ('FI', 'IE')"
"#;

fn main() {
    let manifest = Manifest::from_yaml(MANIFEST).unwrap();
    let problems = manifest.validate();
    assert!(problems.is_empty(), "invalid manifest: {problems:?}");

    let mut options = ReconcileOptions::default();
    options.commit = manifest.commit.clone();

    let state = StateFile::new();
    let applied = state.applied();
    for (name, change) in diff_resources(&manifest.resources, &applied) {
        let verb = match change {
            Change::Create(_) => "create",
            Change::Update { .. } => "update",
            Change::Delete(_) => "delete",
        };
        println!("# {verb} {name}");
        for plan in plan_change(Dialect::MySql, &options, change).unwrap() {
            for statement in &plan.statements {
                println!("{statement};");
            }
        }
        println!();
    }
}

//! Row-set lifecycle against an in-memory SQLite database.
//!
//! Walks one row set through create, update (with a prune) and delete, then
//! shows a failed update leaving the table untouched.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rowsync-demos --example sqlite_reconcile
//! ```

use rowsync_core::{Dialect, Reconciler, RowSet};
use rowsync_sqlite::SqliteConduit;

fn main() {
    let conduit = SqliteConduit::open_in_memory().unwrap();
    conduit
        .connection()
        .execute_batch(
            "CREATE TABLE colors (
                name TEXT PRIMARY KEY,
                hex TEXT NOT NULL CHECK (length(hex) = 7)
            );
            INSERT INTO colors VALUES ('white', '#ffffff');",
        )
        .unwrap();
    let mut reconciler = Reconciler::new(conduit, Dialect::Sqlite);

    // === Create ===
    let v1 = RowSet::new("main", "colors", "name", ["name", "hex"])
        .with_row("red", ["red", "#ff0000"])
        .with_row("green", ["green", "#00ff00"]);
    let outcome = reconciler.create(&v1).unwrap();
    println!("create: {} managed rows", outcome.row_count);
    dump(&reconciler);

    // === Update: drop green, add blue ===
    let v2 = RowSet::new("main", "colors", "name", ["name", "hex"])
        .with_row("red", ["red", "#ee0000"])
        .with_row("blue", ["blue", "#0000ff"]);
    let plan = rowsync_core::plan_update(reconciler.dialect(), reconciler.options(), &v2, &v1)
        .unwrap();
    println!("\nupdate plan:");
    for statement in &plan.statements {
        println!("  [{}] {statement}", statement.kind());
    }
    reconciler.update(&v2, &v1).unwrap();
    dump(&reconciler);

    // === Failed update: bad hex violates the CHECK constraint ===
    let bad = v2.clone().with_row("pink", ["pink", "#f0c"]);
    match reconciler.update(&bad, &v2) {
        Ok(_) => println!("\nunexpected success"),
        Err(err) => println!("\nrejected: {err}"),
    }
    dump(&reconciler);

    // === Delete: only managed rows go, 'white' stays ===
    reconciler.delete(&v2).unwrap();
    println!("\nafter delete:");
    dump(&reconciler);
}

fn dump(reconciler: &Reconciler<SqliteConduit>) {
    let conn = reconciler.conduit().connection();
    let mut stmt = conn
        .prepare("SELECT name, hex FROM colors ORDER BY name")
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .unwrap();
    for row in rows {
        let (name, hex) = row.unwrap();
        println!("  {name:<6} {hex}");
    }
}

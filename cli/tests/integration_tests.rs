use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const MANIFEST: &str = r#"
version: "1"
resources:
  people:
    kind: table
    database: main
    name: people
    query: "CREATE TABLE people (id TEXT PRIMARY KEY, name TEXT NOT NULL)"
  people_rows:
    kind: row_set
    database: main
    table: people
    unique_column: id
    columns: [id, name]
    rows:
      "1": ["1", "Alice"]
      "2": ["2", "Bob"]
"#;

fn rowsync(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rowsync"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run rowsync")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("failed to write file");
    path
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn people(db: &Path) -> Vec<(String, String)> {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut stmt = conn.prepare("SELECT id, name FROM people ORDER BY id").unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

// ---------------------------------------------------------------------------
// validate / plan
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = write(&dir, "rowsync.yaml", MANIFEST);

    let output = rowsync(&["validate", "-m", s(&manifest)]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("is valid: 2 resource(s)"));
}

#[test]
fn validate_reports_bad_rows() {
    let dir = TempDir::new().unwrap();
    let manifest = write(
        &dir,
        "rowsync.yaml",
        &MANIFEST.replace(r#""2": ["2", "Bob"]"#, r#""2": ["2"]"#),
    );

    let output = rowsync(&["validate", "-m", s(&manifest)]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("error: 1 invalid resource(s)"), "{err}");
    assert!(err.contains("people_rows:"), "{err}");
}

#[test]
fn plan_prints_mysql_statements_without_state() {
    let dir = TempDir::new().unwrap();
    let manifest = write(&dir, "rowsync.yaml", MANIFEST);
    let state = dir.path().join("state.json");

    let output = rowsync(&[
        "plan",
        "-m",
        s(&manifest),
        "-s",
        s(&state),
        "--commit-message",
        "seed",
        "--author-name",
        "Ops",
        "--author-email",
        "ops@example.com",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("+ people (table)"));
    assert!(out.contains("+ people_rows (row set)"));
    assert!(out.contains("    USE main;"));
    assert!(out.contains("INSERT INTO people (id, name) VALUES ('1', 'Alice'), ('2', 'Bob')"));
    assert!(out.contains("CALL DOLT_COMMIT('-A', '--skip-empty', '-m', 'seed', '--author', 'Ops <ops@example.com>');"));
    assert!(out.contains("Plan: 2 created, 0 updated, 0 deleted."));
    assert!(!state.exists());
}

#[test]
fn plan_sqlite_ignores_manifest_commit() {
    let dir = TempDir::new().unwrap();
    let manifest = write(
        &dir,
        "rowsync.yaml",
        &format!(
            "commit:\n  message: seed\n  author_name: Ops\n  author_email: ops@example.com\n{MANIFEST}"
        ),
    );
    let state = dir.path().join("state.json");

    let output = rowsync(&[
        "plan", "-m", s(&manifest), "-s", s(&state), "--dialect", "sqlite",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("INSERT INTO main.people (id, name) VALUES"), "{out}");
    assert!(!out.contains("DOLT_COMMIT"), "{out}");
    assert!(stderr(&output).contains("ignoring commit settings"));
}

// ---------------------------------------------------------------------------
// apply / status / destroy
// ---------------------------------------------------------------------------

#[test]
fn apply_update_and_destroy_sqlite() {
    let dir = TempDir::new().unwrap();
    let manifest = write(&dir, "rowsync.yaml", MANIFEST);
    let state = dir.path().join("state.json");
    let db = dir.path().join("store.db");

    let output = rowsync(&[
        "apply", "-m", s(&manifest), "-s", s(&state), "--sqlite", s(&db),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Apply complete: 2 created, 0 updated, 0 deleted."));
    assert_eq!(
        people(&db),
        vec![("1".into(), "Alice".into()), ("2".into(), "Bob".into())]
    );

    let recorded: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state).unwrap()).unwrap();
    assert_eq!(recorded["resources"]["people_rows"]["row_count"], 2);
    assert_eq!(recorded["resources"]["people"]["resource"]["kind"], "table");

    // Rename Bob, drop Alice, add Carol.
    let changed = MANIFEST.replace(
        r#""1": ["1", "Alice"]
      "2": ["2", "Bob"]"#,
        r#""2": ["2", "Robert"]
      "3": ["3", "Carol"]"#,
    );
    fs::write(&manifest, changed).unwrap();
    let output = rowsync(&[
        "apply", "-m", s(&manifest), "-s", s(&state), "--sqlite", s(&db),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("0 created, 2 updated, 0 deleted"));
    assert_eq!(
        people(&db),
        vec![("2".into(), "Robert".into()), ("3".into(), "Carol".into())]
    );

    let output = rowsync(&["status", "-s", s(&state)]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("people_rows"));
    assert!(out.contains("row_set"));

    let output = rowsync(&["destroy", "-s", s(&state), "--sqlite", s(&db)]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("0 created, 0 updated, 2 deleted"));

    let conn = rusqlite::Connection::open(&db).unwrap();
    let tables: i64 = conn
        .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
        .unwrap();
    assert_eq!(tables, 0);

    let output = rowsync(&["status", "-s", s(&state)]);
    assert!(stdout(&output).contains("No resources recorded"));
}

#[test]
fn apply_failure_keeps_earlier_changes_recorded() {
    let dir = TempDir::new().unwrap();
    // The row set names a table that is never created.
    let manifest = write(
        &dir,
        "rowsync.yaml",
        &MANIFEST.replace("table: people", "table: missing"),
    );
    let state = dir.path().join("state.json");
    let db = dir.path().join("store.db");

    let output = rowsync(&[
        "apply", "-m", s(&manifest), "-s", s(&state), "--sqlite", s(&db),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(
        err.contains("error: people_rows: unable to create row set: upsert statement failed"),
        "{err}"
    );

    let output = rowsync(&["status", "-s", s(&state), "--json"]);
    let recorded: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(recorded["resources"]["people"].is_object());
    assert!(recorded["resources"]["people_rows"].is_null());
}

#[test]
fn apply_requires_backend() {
    let dir = TempDir::new().unwrap();
    let manifest = write(&dir, "rowsync.yaml", MANIFEST);
    let output = rowsync(&["apply", "-m", s(&manifest), "-s", "state.json"]);
    assert!(!output.status.success());
}

#[test]
fn tampered_state_is_rejected() {
    let dir = TempDir::new().unwrap();
    let manifest = write(&dir, "rowsync.yaml", MANIFEST);
    let state = dir.path().join("state.json");
    let db = dir.path().join("store.db");

    let output = rowsync(&[
        "apply", "-m", s(&manifest), "-s", s(&state), "--sqlite", s(&db),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let text = fs::read_to_string(&state).unwrap();
    fs::write(&state, text.replace("Alice", "Mallory")).unwrap();

    let output = rowsync(&["status", "-s", s(&state)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid checksum for resource 'people_rows'"));
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_reports_and_refreshes_dropped_table() {
    let dir = TempDir::new().unwrap();
    let manifest = write(&dir, "rowsync.yaml", MANIFEST);
    let state = dir.path().join("state.json");
    let db = dir.path().join("store.db");

    let output = rowsync(&[
        "apply", "-m", s(&manifest), "-s", s(&state), "--sqlite", s(&db),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = rowsync(&["check", "-s", s(&state), "--sqlite", s(&db)]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Check complete: 2 resource(s) present."));

    rusqlite::Connection::open(&db)
        .unwrap()
        .execute_batch("DROP TABLE people")
        .unwrap();

    let output = rowsync(&["check", "-s", s(&state), "--sqlite", s(&db)]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("missing people: table 'main.people' not found"), "{out}");
    assert!(out.contains("missing people_rows: table 'main.people' not found"), "{out}");
    assert!(stderr(&output).contains("2 resource(s) missing from the store"));

    let output = rowsync(&["check", "-s", s(&state), "--sqlite", s(&db), "--refresh"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("forgot 2 missing resource(s)"));

    let output = rowsync(&[
        "apply", "-m", s(&manifest), "-s", s(&state), "--sqlite", s(&db),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("2 created, 0 updated, 0 deleted"));
    assert_eq!(people(&db).len(), 2);
}

// ---------------------------------------------------------------------------
// Dolt backend (fake binary)
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn apply_with_dolt_backend_passes_database_and_commit() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let bin = write(
        &dir,
        "fake-dolt",
        "#!/bin/sh\nprintf '%s\\n' \"$*\" >> calls.log\nexit 0\n",
    );
    fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
    let manifest = write(
        &dir,
        "rowsync.yaml",
        r#"
commit:
  message: "seed people"
  author_name: "Ops"
  author_email: "ops@example.com"
resources:
  people:
    kind: row_set
    database: app
    table: people
    unique_column: id
    columns: [id]
    rows:
      "1": ["1"]
"#,
    );
    let state = dir.path().join("state.json");

    let output = rowsync(&[
        "apply",
        "-m",
        s(&manifest),
        "-s",
        s(&state),
        "--dolt-dir",
        dir.path().to_str().unwrap(),
        "--dolt-bin",
        s(&bin),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let calls = fs::read_to_string(dir.path().join("calls.log")).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls[0], "version");
    assert_eq!(
        calls[1],
        "--use-db app sql -q INSERT INTO people (id) VALUES ('1') ON DUPLICATE KEY UPDATE id = VALUES(id)"
    );
    assert_eq!(
        calls[2],
        "--use-db app sql -q CALL DOLT_COMMIT('-A', '--skip-empty', '-m', 'seed people', '--author', 'Ops <ops@example.com>')"
    );
}

#[cfg(unix)]
fn fake_dolt(dir: &TempDir, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = write(dir, "fake-dolt", script);
    fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
    bin
}

#[cfg(unix)]
#[test]
fn reapply_with_commit_skips_empty_commit() {
    let dir = TempDir::new().unwrap();
    // Dolt refuses an empty commit unless told to skip it.
    let bin = fake_dolt(
        &dir,
        r#"#!/bin/sh
case "$*" in
  *DOLT_COMMIT*--skip-empty*) ;;
  *DOLT_COMMIT*) echo "error: nothing to commit" >&2; exit 1 ;;
esac
exit 0
"#,
    );
    let manifest = write(
        &dir,
        "rowsync.yaml",
        r#"
commit:
  message: "seed people"
  author_name: "Ops"
  author_email: "ops@example.com"
resources:
  people:
    kind: row_set
    database: app
    table: people
    unique_column: id
    columns: [id]
    rows:
      "1": ["1"]
"#,
    );
    let state = dir.path().join("state.json");
    let args = [
        "apply",
        "-m",
        s(&manifest),
        "-s",
        s(&state),
        "--dolt-dir",
        dir.path().to_str().unwrap(),
        "--dolt-bin",
        s(&bin),
    ];

    let output = rowsync(&args);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("1 created, 0 updated, 0 deleted"));

    let output = rowsync(&args);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("0 created, 1 updated, 0 deleted"));
}

#[cfg(unix)]
#[test]
fn repository_is_initialized_first_and_removed_last() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("calls.log");
    let bin = fake_dolt(
        &dir,
        &format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{}'
case "$*" in
  init*) mkdir .dolt ;;
  *COLUMNS*) echo '{{"rows": [{{"COLUMN_NAME": "id", "COLUMN_TYPE": "int", "COLUMN_KEY": "PRI"}}]}}' ;;
esac
exit 0
"#,
            log.display()
        ),
    );
    let repo = dir.path().join("repos").join("app");
    let manifest = write(
        &dir,
        "rowsync.yaml",
        &format!(
            r#"
resources:
  app_repo:
    kind: repository
    path: "{}"
    name: Ops
    email: ops@example.com
  people:
    kind: row_set
    database: app
    table: people
    unique_column: id
    columns: [id]
    rows:
      "1": ["1"]
"#,
            repo.display()
        ),
    );
    let state = dir.path().join("state.json");
    let backend = ["--dolt-dir", s(&repo), "--dolt-bin", s(&bin)];

    let output = rowsync(&["plan", "-m", s(&manifest), "-s", s(&state)]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("+ app_repo (repository)"), "{out}");
    assert!(out.contains("dolt init --name 'Ops' --email 'ops@example.com'"), "{out}");

    let mut args = vec!["apply", "-m", s(&manifest), "-s", s(&state)];
    args.extend(backend);
    let output = rowsync(&args);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(repo.join(".dolt").is_dir());

    let calls = fs::read_to_string(&log).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls[0], "init --name Ops --email ops@example.com");
    assert_eq!(calls[1], "version");
    assert!(calls[2].starts_with("--use-db app sql -q INSERT INTO people"));

    let mut args = vec!["check", "-s", s(&state)];
    args.extend(backend);
    let output = rowsync(&args);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("ok      app_repo (repository)"), "{out}");
    assert!(out.contains("ok      people (row set)"), "{out}");

    let mut args = vec!["destroy", "-s", s(&state)];
    args.extend(backend);
    let output = rowsync(&args);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("0 created, 0 updated, 2 deleted"));
    assert!(!repo.exists());

    let calls = fs::read_to_string(&log).unwrap();
    let last = calls.lines().last().unwrap();
    assert!(last.starts_with("--use-db app sql -q DELETE FROM people"), "{last}");
}

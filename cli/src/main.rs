use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use rowsync_core::{
    Change, CommitInfo, ConduitError, Dialect, Operation, Outcome, Plan, Presence, ReconcileError,
    ReconcileOptions, Reconciler, Resource, diff_resources, plan_change,
};
use rowsync_dolt::DoltCli;
use rowsync_mysql::MysqlConduit;
use rowsync_sqlite::SqliteConduit;
use rowsync_state::{Manifest, StateFile};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI-specific dialect enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliDialect {
    Mysql,
    Sqlite,
}

impl From<CliDialect> for Dialect {
    fn from(dialect: CliDialect) -> Self {
        match dialect {
            CliDialect::Mysql => Self::MySql,
            CliDialect::Sqlite => Self::Sqlite,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "rowsync", version)]
#[command(about = "Reconcile declared table rows against a SQL store")]
struct Cli {
    /// Log every statement (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a manifest and check every resource can be rendered.
    Validate(ValidateArgs),
    /// Print the statements an apply would execute, without connecting.
    Plan(PlanArgs),
    /// Reconcile the store with the manifest and update the state file.
    Apply(ApplyArgs),
    /// Delete every resource recorded in the state file.
    Destroy(DestroyArgs),
    /// List resources recorded in the state file.
    Status(StatusArgs),
    /// Verify that recorded resources still exist in the store.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Manifest file (.yaml, .yml or .json).
    #[arg(short, long)]
    manifest: PathBuf,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Manifest file (.yaml, .yml or .json).
    #[arg(short, long)]
    manifest: PathBuf,
    /// State file from previous applies (may not exist yet).
    #[arg(short, long)]
    state: PathBuf,
    /// SQL dialect to render.
    #[arg(long, default_value = "mysql")]
    dialect: CliDialect,
    #[command(flatten)]
    commit: CommitArgs,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    /// Manifest file (.yaml, .yml or .json).
    #[arg(short, long)]
    manifest: PathBuf,
    /// State file, created on first apply.
    #[arg(short, long)]
    state: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
    #[command(flatten)]
    commit: CommitArgs,
}

#[derive(Debug, Args)]
struct DestroyArgs {
    /// State file listing what to delete.
    #[arg(short, long)]
    state: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
    #[command(flatten)]
    commit: CommitArgs,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// State file to read.
    #[arg(short, long)]
    state: PathBuf,
    /// Print the state file as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// State file listing what to look for.
    #[arg(short, long)]
    state: PathBuf,
    /// Forget missing resources so the next apply recreates them.
    #[arg(long)]
    refresh: bool,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// SQLite database file; every change runs in one transaction.
    #[arg(
        long,
        value_name = "PATH",
        required_unless_present_any = ["dolt_dir", "mysql_url"],
        conflicts_with_all = ["dolt_dir", "mysql_url"]
    )]
    sqlite: Option<PathBuf>,
    /// Attach another SQLite file under a schema name (repeatable).
    #[arg(long, value_name = "SCHEMA=PATH", requires = "sqlite")]
    attach: Vec<String>,
    /// Dolt repository directory; statements run one `dolt sql` at a time.
    #[arg(long, value_name = "DIR", conflicts_with = "mysql_url")]
    dolt_dir: Option<PathBuf>,
    /// MySQL or `dolt sql-server` URL; every change runs in one transaction.
    #[arg(long, value_name = "URL")]
    mysql_url: Option<String>,
    /// Dolt binary to invoke (also used for repository resources).
    #[arg(long, default_value = "dolt")]
    dolt_bin: PathBuf,
    /// Timeout for each Dolt invocation.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Stop between statements once this many seconds have passed.
    #[arg(long)]
    deadline_secs: Option<u64>,
}

impl BackendArgs {
    /// Dialect the selected backend speaks.
    fn dialect(&self) -> Dialect {
        if self.sqlite.is_some() {
            Dialect::Sqlite
        } else {
            Dialect::MySql
        }
    }

    /// `dolt` invocations rooted at `dir`.
    fn dolt(&self, dir: impl Into<PathBuf>) -> DoltCli {
        DoltCli::new(dir)
            .with_binary(&self.dolt_bin)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Args)]
struct CommitArgs {
    /// Version commit message (overrides the manifest).
    #[arg(long)]
    commit_message: Option<String>,
    /// Commit author name (overrides the manifest).
    #[arg(long)]
    author_name: Option<String>,
    /// Commit author email (overrides the manifest).
    #[arg(long)]
    author_email: Option<String>,
}

impl CommitArgs {
    /// Merges the flags over the manifest's commit settings.
    fn resolve(&self, base: Option<CommitInfo>) -> Result<Option<CommitInfo>, String> {
        let mut info = match (base, &self.commit_message) {
            (Some(info), _) => info,
            (None, Some(message)) => CommitInfo::new(message.clone(), "", ""),
            (None, None) => {
                if self.author_name.is_some() || self.author_email.is_some() {
                    return Err("--author-name and --author-email require a commit message".into());
                }
                return Ok(None);
            }
        };
        if let Some(message) = &self.commit_message {
            info.message = message.clone();
        }
        if let Some(name) = &self.author_name {
            info.author_name = name.clone();
        }
        if let Some(email) = &self.author_email {
            info.author_email = email.clone();
        }
        if info.author_name.trim().is_empty() || info.author_email.trim().is_empty() {
            return Err("a version commit needs both --author-name and --author-email".into());
        }
        Ok(Some(info))
    }
}

/// Drops commit settings the dialect cannot express.
fn commit_for(dialect: Dialect, commit: Option<CommitInfo>) -> Option<CommitInfo> {
    match (dialect, commit) {
        (Dialect::Sqlite, Some(_)) => {
            warn!("version commits are only recorded on Dolt; ignoring commit settings");
            None
        }
        (_, commit) => commit,
    }
}

/// Reconciler bound to the backend chosen on the command line.
enum Target {
    Sqlite(Reconciler<SqliteConduit>),
    Mysql(Reconciler<MysqlConduit>),
    Dolt(Reconciler<DoltCli>),
}

impl Target {
    fn open(args: &BackendArgs, mut options: ReconcileOptions) -> Result<Self, String> {
        if let Some(secs) = args.deadline_secs {
            options = options.with_deadline(Instant::now() + Duration::from_secs(secs));
        }
        let dialect = args.dialect();

        if let Some(path) = &args.sqlite {
            let conduit = SqliteConduit::open(path)
                .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?;
            for entry in &args.attach {
                let (schema, file) = entry
                    .split_once('=')
                    .ok_or_else(|| format!("--attach expects SCHEMA=PATH, got '{entry}'"))?;
                conduit
                    .attach(file, schema)
                    .map_err(|e| format!("Failed to attach '{file}' as '{schema}': {e}"))?;
            }
            return Ok(Self::Sqlite(
                Reconciler::new(conduit, dialect).with_options(options),
            ));
        }

        if let Some(url) = &args.mysql_url {
            let mut conduit = MysqlConduit::connect(url)
                .map_err(|e| format!("Failed to connect to MySQL server: {e}"))?;
            let version = conduit
                .server_version()
                .map_err(|e| format!("MySQL server is not usable: {e}"))?;
            info!(version = %version, "using mysql server");
            return Ok(Self::Mysql(
                Reconciler::new(conduit, dialect).with_options(options),
            ));
        }

        let Some(dir) = &args.dolt_dir else {
            return Err("Specify a backend: --sqlite, --mysql-url or --dolt-dir".to_string());
        };
        let cli = args.dolt(dir);
        let version = cli
            .version()
            .map_err(|e| format!("dolt is not usable: {e}"))?;
        info!(version = version.trim(), dir = %dir.display(), "using dolt");
        Ok(Self::Dolt(Reconciler::new(cli, dialect).with_options(options)))
    }

    fn is_atomic(&self) -> bool {
        match self {
            Self::Sqlite(_) | Self::Mysql(_) => true,
            Self::Dolt(_) => false,
        }
    }

    fn execute(&mut self, plan: &Plan) -> Result<Outcome, ReconcileError> {
        match self {
            Self::Sqlite(r) => r.execute(plan),
            Self::Mysql(r) => r.execute(plan),
            Self::Dolt(r) => r.execute(plan),
        }
    }

    fn inspect(&mut self, resource: &Resource) -> Result<Presence, ConduitError> {
        match self {
            Self::Sqlite(r) => r.inspect(resource),
            Self::Mysql(r) => r.inspect(resource),
            Self::Dolt(r) => r.inspect(resource),
        }
    }
}

/// Runs plans, connecting to the store only once a plan needs it.
///
/// Repository resources never reach the store: they are provisioned on the
/// host with `dolt init`, so a manifest can create the repository its own
/// tables live in.
struct Executor<'a> {
    backend: &'a BackendArgs,
    options: Option<ReconcileOptions>,
    target: Option<Target>,
}

impl<'a> Executor<'a> {
    fn new(backend: &'a BackendArgs, options: ReconcileOptions) -> Self {
        Self {
            backend,
            options: Some(options),
            target: None,
        }
    }

    fn target(&mut self) -> Result<&mut Target, String> {
        let target = match self.target.take() {
            Some(target) => target,
            None => Target::open(self.backend, self.options.take().unwrap_or_default())?,
        };
        Ok(self.target.insert(target))
    }

    /// Applies one plan and returns the rows it leaves managed.
    fn execute(&mut self, name: &str, plan: &Plan, resource: &Resource) -> Result<usize, String> {
        if resource.is_host_side() {
            provision(self.backend, plan.operation, resource).map_err(|e| format!("{name}: {e}"))?;
            return Ok(0);
        }
        let target = self.target()?;
        let atomic = target.is_atomic();
        let outcome = target
            .execute(plan)
            .map_err(|e| failure_message(name, &e, atomic))?;
        Ok(outcome.row_count)
    }
}

/// Creates or removes a repository on the host.
fn provision(backend: &BackendArgs, operation: Operation, resource: &Resource) -> Result<(), String> {
    let Resource::Repository { path, name, email } = resource else {
        return Ok(());
    };
    let cli = backend.dolt(path);
    match operation {
        Operation::Create if cli.is_repository() => {
            info!(path = %path, "repository already initialized");
            Ok(())
        }
        Operation::Create => cli
            .init(name, email)
            .map_err(|e| format!("unable to create repository '{path}': {e}")),
        Operation::Update => Ok(()),
        Operation::Delete if !cli.is_repository() => {
            warn!(path = %path, "repository already gone");
            Ok(())
        }
        Operation::Delete => cli
            .remove_repository()
            .map_err(|e| format!("unable to delete repository '{path}': {e}")),
    }
}

/// Moves repository creates ahead of every other change and repository
/// deletes behind them, keeping the relative order within each group.
fn order_changes<'a>(changes: Vec<(&'a str, Change<'a>)>) -> Vec<(&'a str, Change<'a>)> {
    let (mut ordered, rest): (Vec<_>, Vec<_>) = changes.into_iter().partition(|(_, change)| {
        matches!(change, Change::Create(r) | Change::Update { desired: r, .. } if r.is_host_side())
    });
    let (last, store): (Vec<_>, Vec<_>) = rest
        .into_iter()
        .partition(|(_, change)| matches!(change, Change::Delete(r) if r.is_host_side()));
    ordered.extend(store);
    ordered.extend(last);
    ordered
}

/// Counts of applied changes.
#[derive(Debug, Default)]
struct Summary {
    created: usize,
    updated: usize,
    deleted: usize,
}

impl Summary {
    fn count(&mut self, change: &Change<'_>) {
        match change {
            Change::Create(_) => self.created += 1,
            Change::Update { .. } => self.updated += 1,
            Change::Delete(_) => self.deleted += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        )
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Plan(args) => run_plan(args),
        Command::Apply(args) => run_apply(args),
        Command::Destroy(args) => run_destroy(args),
        Command::Status(args) => run_status(args),
        Command::Check(args) => run_check(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let manifest = load_manifest(&args.manifest)?;
    println!(
        "Manifest '{}' is valid: {} resource(s).",
        args.manifest.display(),
        manifest.len()
    );
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<(), String> {
    let manifest = load_manifest(&args.manifest)?;
    let state = load_state(&args.state)?;
    let dialect = Dialect::from(args.dialect);
    let options = ReconcileOptions {
        commit: commit_for(dialect, args.commit.resolve(manifest.commit.clone())?),
        ..ReconcileOptions::default()
    };

    let applied = state.applied();
    let changes = order_changes(diff_resources(&manifest.resources, &applied));
    let mut summary = Summary::default();
    for (name, change) in &changes {
        let plans =
            plan_change(dialect, &options, *change).map_err(|e| format!("{name}: {e}"))?;
        println!("{} {name} ({})", marker(change), subject(change));
        for plan in &plans {
            for line in host_actions(plan, plan_resource(change, plan)) {
                println!("    {line}");
            }
            for statement in &plan.statements {
                println!("    {statement};");
            }
        }
        summary.count(change);
    }
    println!("Plan: {summary}.");
    Ok(())
}

fn run_apply(args: ApplyArgs) -> Result<(), String> {
    let manifest = load_manifest(&args.manifest)?;
    let mut state = load_state(&args.state)?;
    let options = ReconcileOptions {
        commit: args.commit.resolve(manifest.commit.clone())?,
        ..ReconcileOptions::default()
    };

    let applied = state.applied();
    let changes = diff_resources(&manifest.resources, &applied);
    let summary = reconcile(&args.backend, options, changes, &mut state, &args.state)?;
    println!("Apply complete: {summary}.");
    Ok(())
}

fn run_destroy(args: DestroyArgs) -> Result<(), String> {
    let mut state = load_state(&args.state)?;
    let options = ReconcileOptions {
        commit: args.commit.resolve(None)?,
        ..ReconcileOptions::default()
    };

    let applied = state.applied();
    let declared = BTreeMap::new();
    let changes = diff_resources(&declared, &applied);
    let summary = reconcile(&args.backend, options, changes, &mut state, &args.state)?;
    println!("Destroy complete: {summary}.");
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let state = load_state(&args.state)?;
    if args.json {
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| format!("Failed to serialize state: {e}"))?;
        println!("{json}");
        return Ok(());
    }
    if state.is_empty() {
        println!("No resources recorded in '{}'.", args.state.display());
        return Ok(());
    }
    for (name, entry) in &state.resources {
        let rows = match entry.resource {
            Resource::RowSet(_) => entry.row_count.to_string(),
            _ => "-".to_string(),
        };
        println!(
            "{name:<24} {:<9} {rows:>6}  {}",
            entry.resource.kind_name(),
            entry.applied_at
        );
    }
    println!("Last updated: {}", state.updated_at);
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let mut state = load_state(&args.state)?;
    let mut executor = Executor::new(&args.backend, ReconcileOptions::default());

    let mut missing = Vec::new();
    for (name, resource) in state.applied() {
        let presence = if let Resource::Repository { path, .. } = &resource {
            if args.backend.dolt(path).is_repository() {
                Presence::Present
            } else {
                Presence::Missing(format!("repository '{path}' not found"))
            }
        } else {
            executor
                .target()?
                .inspect(&resource)
                .map_err(|e| format!("{name}: unable to read {}: {e}", resource.subject()))?
        };
        match presence {
            Presence::Missing(reason) => {
                println!("missing {name}: {reason}");
                missing.push(name);
            }
            _ => println!("ok      {name} ({})", resource.subject()),
        }
    }

    if missing.is_empty() {
        println!("Check complete: {} resource(s) present.", state.len());
        return Ok(());
    }
    if args.refresh {
        for name in &missing {
            state.remove(name);
        }
        state
            .save(&args.state)
            .map_err(|e| format!("Failed to write state '{}': {e}", args.state.display()))?;
        println!(
            "Refreshed: forgot {} missing resource(s); apply will recreate them.",
            missing.len()
        );
        return Ok(());
    }
    Err(format!(
        "{} resource(s) missing from the store; run check --refresh, then apply",
        missing.len()
    ))
}

/// Executes each change plan by plan, saving state after every plan.
///
/// Repository creates run first and repository deletes last. Stops at the
/// first failure; everything applied before it stays recorded.
fn reconcile(
    backend: &BackendArgs,
    options: ReconcileOptions,
    changes: Vec<(&str, Change<'_>)>,
    state: &mut StateFile,
    state_path: &Path,
) -> Result<Summary, String> {
    let dialect = backend.dialect();
    let options = ReconcileOptions {
        commit: commit_for(dialect, options.commit),
        ..options
    };
    let mut summary = Summary::default();
    let changes = order_changes(changes);
    let mut executor = Executor::new(backend, options.clone());
    for (name, change) in changes {
        let plans =
            plan_change(dialect, &options, change).map_err(|e| format!("{name}: {e}"))?;
        for plan in &plans {
            let resource = plan_resource(&change, plan);
            let row_count = executor.execute(name, plan, resource)?;
            match plan.operation {
                Operation::Create | Operation::Update => state
                    .record(name, resource, row_count)
                    .map_err(|e| format!("Failed to record '{name}': {e}"))?,
                Operation::Delete => {
                    state.remove(name);
                }
            }
            state.save(state_path).map_err(|e| {
                format!("Failed to write state '{}': {e}", state_path.display())
            })?;
        }
        println!("{} {name} ({})", marker(&change), subject(&change));
        summary.count(&change);
    }
    Ok(summary)
}

fn failure_message(name: &str, err: &ReconcileError, atomic: bool) -> String {
    let partial = match err {
        ReconcileError::Build(_) | ReconcileError::Connection { .. } => false,
        _ => err.is_ambiguous() || !atomic,
    };
    if partial {
        format!("{name}: {err}\nthe store may not match the state file; re-run apply to converge")
    } else {
        format!("{name}: {err}")
    }
}

/// The resource a plan acts on: the previous one for the delete half of a
/// replacement, the declared one otherwise.
fn plan_resource<'a>(change: &Change<'a>, plan: &Plan) -> &'a Resource {
    match (*change, plan.operation) {
        (Change::Update { previous, .. }, Operation::Delete) => previous,
        (Change::Create(resource), _)
        | (Change::Update { desired: resource, .. }, _)
        | (Change::Delete(resource), _) => resource,
    }
}

/// Host commands a plan stands for, for display.
fn host_actions(plan: &Plan, resource: &Resource) -> Vec<String> {
    let Resource::Repository { path, name, email } = resource else {
        return Vec::new();
    };
    match plan.operation {
        Operation::Create => vec![format!("dolt init --name '{name}' --email '{email}' (in {path})")],
        Operation::Update => Vec::new(),
        Operation::Delete => vec![format!("remove repository {path}")],
    }
}

fn marker(change: &Change<'_>) -> char {
    match change {
        Change::Create(_) => '+',
        Change::Update { .. } => '~',
        Change::Delete(_) => '-',
    }
}

fn subject(change: &Change<'_>) -> &'static str {
    match *change {
        Change::Create(resource) | Change::Update { desired: resource, .. } => resource.subject(),
        Change::Delete(resource) => resource.subject(),
    }
}

fn load_manifest(path: &Path) -> Result<Manifest, String> {
    let manifest = Manifest::load(path)
        .map_err(|e| format!("Failed to load manifest '{}': {e}", path.display()))?;
    let errors = manifest.validate();
    if errors.is_empty() {
        return Ok(manifest);
    }
    let details: Vec<String> = errors
        .iter()
        .map(|(name, err)| format!("  {name}: {err}"))
        .collect();
    Err(format!(
        "{} invalid resource(s) in '{}':\n{}",
        errors.len(),
        path.display(),
        details.join("\n")
    ))
}

fn load_state(path: &Path) -> Result<StateFile, String> {
    StateFile::load_or_default(path)
        .map_err(|e| format!("Failed to load state '{}': {e}", path.display()))
}

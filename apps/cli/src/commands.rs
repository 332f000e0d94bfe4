//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use devize_core::{QuoteSession, SessionInputs, reprice, standards};
use devize_shared::{
    AggregateLine, AppConfig, LineKind, ProjectId, QuoteSummary, RateKind, SourceConfig,
    StandardParameters, init_config, load_config, resolve_database_path,
};
use devize_sources::{ApiClient, FetchProgress, load_request, recipes_from_request};
use devize_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Devize: price construction quotes from operation recipes.
#[derive(Parser)]
#[command(
    name = "devize",
    version,
    about = "Aggregate operation recipes into priced material and labor quote lines.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides `defaults.database_path`).
    #[arg(long, global = true, env = "DEVIZE_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Quote output format.
#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
pub(crate) enum KindArg {
    Material,
    Labor,
}

impl From<KindArg> for LineKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Material => LineKind::Material,
            KindArg::Labor => LineKind::Labor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
pub(crate) enum RateArg {
    Markup,
    Discount,
}

impl From<RateArg> for RateKind {
    fn from(rate: RateArg) -> Self {
        match rate {
            RateArg::Markup => RateKind::Markup,
            RateArg::Discount => RateKind::Discount,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Price a quote from a request file.
    Quote {
        /// Request file (selections, recipes, catalog, standards, manual lines).
        #[arg(short, long)]
        input: PathBuf,

        /// Project whose standards and saved overrides apply.
        #[arg(long)]
        project: Option<String>,

        /// Quote group inside the project.
        #[arg(long, requires = "project")]
        group: Option<String>,

        /// Fetch recipes and the catalog from the configured API instead of
        /// the request file.
        #[arg(long)]
        remote: bool,

        /// Store the computed lines and totals under `--project`/`--group`.
        #[arg(long, requires_all = ["project", "group"])]
        save: bool,

        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Project management.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Project standard parameters.
    Standards {
        #[command(subcommand)]
        action: StandardsAction,
    },

    /// Per-line overrides on a saved quote.
    Line {
        #[command(subcommand)]
        action: LineAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ProjectAction {
    /// Create a project.
    Create {
        #[arg(long)]
        name: String,
    },
    /// List projects.
    List,
}

#[derive(Subcommand)]
pub(crate) enum StandardsAction {
    /// Show a project's standards.
    Show {
        #[arg(long)]
        project: String,
    },
    /// Change a project's standards and re-price its saved quotes.
    Set {
        #[arg(long)]
        project: String,
        #[arg(long, allow_negative_numbers = true)]
        markup: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        discount: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        indirect: Option<f64>,
    },
}

/// Identifies one line of a saved quote.
#[derive(clap::Args, Debug)]
pub(crate) struct LineTarget {
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub group: String,
    #[arg(long)]
    pub kind: KindArg,
    /// Merge key as shown by `devize quote` (e.g. `code:CEM-42`).
    #[arg(long)]
    pub key: String,
    #[arg(long)]
    pub rate: RateArg,
}

#[derive(Subcommand)]
pub(crate) enum LineAction {
    /// Type a percent into a line. The current standard re-attaches it.
    Set {
        #[command(flatten)]
        target: LineTarget,
        #[arg(long, allow_negative_numbers = true)]
        percent: f64,
    },
    /// Switch a line's "use standard" control.
    UseStandard {
        #[command(flatten)]
        target: LineTarget,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "devize=info",
        1 => "devize=debug",
        _ => "devize=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Must work even when the existing config file is broken.
    if let Command::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        return cmd_config_init();
    }

    let config = load_config()?;
    let db_path = match cli.db {
        Some(path) => path,
        None => resolve_database_path(&config)?,
    };

    match cli.command {
        Command::Quote {
            input,
            project,
            group,
            remote,
            save,
            format,
        } => {
            let opts = QuoteOptions {
                input,
                project,
                group,
                remote,
                save,
                format,
            };
            cmd_quote(&config, &db_path, opts).await
        }
        Command::Project { action } => match action {
            ProjectAction::Create { name } => cmd_project_create(&db_path, &name).await,
            ProjectAction::List => cmd_project_list(&db_path).await,
        },
        Command::Standards { action } => match action {
            StandardsAction::Show { project } => {
                cmd_standards_show(&config, &db_path, &project).await
            }
            StandardsAction::Set {
                project,
                markup,
                discount,
                indirect,
            } => {
                let changes = StandardsChanges {
                    markup,
                    discount,
                    indirect,
                };
                cmd_standards_set(&config, &db_path, &project, changes).await
            }
        },
        Command::Line { action } => match action {
            LineAction::Set { target, percent } => {
                let rate = target.rate.into();
                standards::validate_percent(rate, percent)?;
                cmd_line_edit(&config, &db_path, &target, |line, current| {
                    standards::set_line_percent(line, rate, percent, current);
                })
                .await
            }
            LineAction::UseStandard { target, enabled } => {
                let rate = target.rate.into();
                cmd_line_edit(&config, &db_path, &target, |line, current| {
                    standards::set_uses_standard(line, rate, enabled, current);
                })
                .await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn parse_project_id(raw: &str) -> Result<ProjectId> {
    raw.trim()
        .parse()
        .map_err(|e| eyre!("invalid project id '{raw}': {e}"))
}

/// Stored project standards, falling back to the configured defaults.
async fn project_standards(
    storage: &Storage,
    project: &ProjectId,
    config: &AppConfig,
) -> Result<StandardParameters> {
    if storage.get_project(project).await?.is_none() {
        return Err(eyre!("project {project} not found"));
    }
    Ok(storage
        .get_standards(project)
        .await?
        .unwrap_or_else(|| StandardParameters::from(config)))
}

// ---------------------------------------------------------------------------
// quote
// ---------------------------------------------------------------------------

struct QuoteOptions {
    input: PathBuf,
    project: Option<String>,
    group: Option<String>,
    remote: bool,
    save: bool,
    format: OutputFormat,
}

async fn cmd_quote(config: &AppConfig, db_path: &Path, opts: QuoteOptions) -> Result<()> {
    let request = load_request(&opts.input)?;
    let project = opts.project.as_deref().map(parse_project_id).transpose()?;

    let storage = match &project {
        Some(_) => Some(Storage::open(db_path).await?),
        None => None,
    };

    // Precedence: stored project standards, then the request file, then config.
    let stored_standards = match (&storage, &project) {
        (Some(storage), Some(project)) => {
            if storage.get_project(project).await?.is_none() {
                return Err(eyre!("project {project} not found"));
            }
            storage.get_standards(project).await?
        }
        _ => None,
    };
    let standards = stored_standards
        .or(request.standards)
        .unwrap_or_else(|| StandardParameters::from(config));

    let previous: Vec<AggregateLine> = match (&storage, &project, &opts.group) {
        (Some(storage), Some(project), Some(group)) => storage.load_lines(project, group).await?,
        _ => Vec::new(),
    };

    let (recipes, catalog) = if opts.remote {
        let client = ApiClient::new(&SourceConfig::from(config))?;
        let progress = CliProgress::new();
        let fetched = client.fetch_inputs(&request.selections, &progress).await;
        (fetched.recipes, fetched.catalog)
    } else {
        (recipes_from_request(&request), request.catalog.clone())
    };

    info!(
        selections = request.selections.len(),
        previous = previous.len(),
        remote = opts.remote,
        "pricing quote"
    );

    let session = QuoteSession::resume(
        SessionInputs {
            standards,
            selections: request.selections,
            recipes,
            catalog,
            manual_lines: request.manual_lines,
        },
        &previous,
    )?;
    let summary = session.into_summary();

    if let (true, Some(storage), Some(project), Some(group)) =
        (opts.save, &storage, &project, &opts.group)
    {
        storage.save_quote(project, group, &summary).await?;
        info!(%project, group = group.as_str(), "quote saved");
    }

    match opts.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Table => print!("{}", render::quote_table(&summary, &standards)),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// project
// ---------------------------------------------------------------------------

async fn cmd_project_create(db_path: &Path, name: &str) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let project = storage.insert_project(name).await?;
    println!("Project created: {} ({})", project.name, project.id);
    Ok(())
}

async fn cmd_project_list(db_path: &Path) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let projects = storage.list_projects().await?;
    if projects.is_empty() {
        println!("No projects yet. Create one with `devize project create --name <name>`.");
        return Ok(());
    }
    for project in projects {
        println!(
            "{}  {}  (updated {})",
            project.id,
            project.name,
            project.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// standards
// ---------------------------------------------------------------------------

/// Flags given to `standards set`; absent ones keep the current value.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StandardsChanges {
    pub markup: Option<f64>,
    pub discount: Option<f64>,
    pub indirect: Option<f64>,
}

impl StandardsChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.markup.is_none() && self.discount.is_none() && self.indirect.is_none()
    }

    pub(crate) fn apply(&self, current: StandardParameters) -> StandardParameters {
        StandardParameters::new(
            self.markup.unwrap_or(current.standard_markup_percent),
            self.discount.unwrap_or(current.standard_discount_percent),
            self.indirect.unwrap_or(current.indirect_costs_percent),
        )
    }
}

async fn cmd_standards_show(config: &AppConfig, db_path: &Path, project: &str) -> Result<()> {
    let project = parse_project_id(project)?;
    let storage = Storage::open_readonly(db_path).await?;
    let standards = project_standards(&storage, &project, config).await?;
    print!("{}", render::standards(&standards));
    Ok(())
}

async fn cmd_standards_set(
    config: &AppConfig,
    db_path: &Path,
    project: &str,
    changes: StandardsChanges,
) -> Result<()> {
    if changes.is_empty() {
        return Err(eyre!("nothing to change: pass --markup, --discount or --indirect"));
    }
    let project = parse_project_id(project)?;
    let storage = Storage::open(db_path).await?;
    let current = project_standards(&storage, &project, config).await?;
    let updated = changes.apply(current);
    storage.set_standards(&project, &updated).await?;

    let groups = storage.list_groups(&project).await?;
    for group in &groups {
        let summary = reprice_group(&storage, &project, group, &updated).await?;
        info!(group = group.as_str(), grand_total = summary.grand_total, "group re-priced");
    }

    print!("{}", render::standards(&updated));
    if !groups.is_empty() {
        println!("Re-priced {} saved quote group(s).", groups.len());
    }
    Ok(())
}

/// Re-price one saved group under `standards` and store it again.
async fn reprice_group(
    storage: &Storage,
    project: &ProjectId,
    group: &str,
    standards: &StandardParameters,
) -> Result<QuoteSummary> {
    let lines = storage.load_lines(project, group).await?;
    let mut summary = reprice(lines, standards);
    if let Some(totals) = storage.get_totals(project, group).await? {
        summary.unavailable_operations = totals.unavailable_operations;
    }
    storage.save_quote(project, group, &summary).await?;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// line
// ---------------------------------------------------------------------------

async fn cmd_line_edit(
    config: &AppConfig,
    db_path: &Path,
    target: &LineTarget,
    edit: impl FnOnce(&mut AggregateLine, &StandardParameters),
) -> Result<()> {
    let project = parse_project_id(&target.project)?;
    let storage = Storage::open(db_path).await?;
    let current = project_standards(&storage, &project, config).await?;

    let mut lines = storage.load_lines(&project, &target.group).await?;
    if lines.is_empty() {
        return Err(eyre!(
            "no saved quote '{}' in project {project}; run `devize quote --save` first",
            target.group
        ));
    }

    let kind = LineKind::from(target.kind);
    let line = lines
        .iter_mut()
        .find(|l| l.kind == kind && l.key == target.key)
        .ok_or_else(|| eyre!("no {kind} line with key '{}'", target.key))?;
    edit(line, &current);

    let rate = RateKind::from(target.rate);
    let (percent, tracking) = (line.percent(rate), line.uses_standard(rate));

    let mut summary = reprice(lines, &current);
    if let Some(totals) = storage.get_totals(&project, &target.group).await? {
        summary.unavailable_operations = totals.unavailable_operations;
    }
    storage.save_quote(&project, &target.group, &summary).await?;

    if tracking {
        println!("{} {rate}: {percent}% (standard)", target.key);
    } else {
        println!("{} {rate}: {percent}% (pinned)", target.key);
    }
    println!("Grand total: {}", render::money(summary.grand_total));
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        match ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            Ok(style) => spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            ),
            Err(e) => warn!(error = %e, "invalid spinner template"),
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl FetchProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn recipe_fetched(&self, operation_id: &str, available: bool, current: usize, total: usize) {
        let status = if available { "ok" } else { "unavailable" };
        self.spinner
            .set_message(format!("Recipes [{current}/{total}] {operation_id}: {status}"));
    }

    fn done(&self, _unavailable: usize) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_quote_flags() {
        let cli = Cli::try_parse_from([
            "devize", "quote", "--input", "req.json", "--format", "json", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Quote {
                input,
                format,
                remote,
                save,
                ..
            } => {
                assert_eq!(input, PathBuf::from("req.json"));
                assert_eq!(format, OutputFormat::Json);
                assert!(!remote);
                assert!(!save);
            }
            _ => panic!("expected quote command"),
        }
    }

    #[test]
    fn save_requires_project_and_group() {
        let result = Cli::try_parse_from(["devize", "quote", "--input", "r.json", "--save"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_line_set_with_negative_percent() {
        let cli = Cli::try_parse_from([
            "devize", "line", "set", "--project", "p", "--group", "g", "--kind", "labor",
            "--key", "labor:Mason", "--rate", "discount", "--percent", "-5",
        ])
        .unwrap();
        match cli.command {
            Command::Line {
                action: LineAction::Set { target, percent },
            } => {
                assert_eq!(target.kind, KindArg::Labor);
                assert_eq!(target.rate, RateArg::Discount);
                assert_eq!(LineKind::from(target.kind), LineKind::Labor);
                assert_eq!(percent, -5.0);
            }
            _ => panic!("expected line set"),
        }
    }

    #[test]
    fn parses_use_standard_toggle() {
        let cli = Cli::try_parse_from([
            "devize", "line", "use-standard", "--project", "p", "--group", "g", "--kind",
            "material", "--key", "code:CEM-42", "--rate", "markup", "--enabled", "false",
        ])
        .unwrap();
        match cli.command {
            Command::Line {
                action: LineAction::UseStandard { enabled, .. },
            } => assert!(!enabled),
            _ => panic!("expected line use-standard"),
        }
    }

    #[tokio::test]
    async fn line_set_rejects_non_finite_percent_before_touching_storage() {
        let db = std::env::temp_dir().join(format!("devize_cli_{}.db", ProjectId::new()));
        let storage = Storage::open(&db).await.unwrap();
        let project = storage.insert_project("Villa").await.unwrap();
        let session = QuoteSession::new(SessionInputs {
            manual_lines: vec![devize_shared::ManualLine {
                id: "skip".into(),
                kind: LineKind::Material,
                description: "Waste skip".into(),
                unit: "pcs".into(),
                quantity: 1.0,
                unit_price: 100.0,
            }],
            ..SessionInputs::default()
        })
        .unwrap();
        storage
            .save_quote(&project.id, "main", session.summary())
            .await
            .unwrap();
        drop(storage);

        for raw in ["NaN", "inf"] {
            let cli = Cli::try_parse_from([
                "devize",
                "--db",
                db.to_str().unwrap(),
                "line",
                "set",
                "--project",
                &project.id.to_string(),
                "--group",
                "main",
                "--kind",
                "material",
                "--key",
                "manual:skip",
                "--rate",
                "markup",
                "--percent",
                raw,
            ])
            .unwrap();
            let err = run(cli).await.unwrap_err();
            assert!(err.to_string().contains("finite"), "{raw}: {err}");
        }

        let storage = Storage::open(&db).await.unwrap();
        let lines = storage.load_lines(&project.id, "main").await.unwrap();
        assert_eq!(lines[0].markup_percent, 0.0);
        assert!(lines[0].markup_uses_standard);
        assert_eq!(lines[0].final_value, 100.0);
        let _ = std::fs::remove_file(&db);
    }

    #[test]
    fn standards_changes_keep_unset_values() {
        let current = StandardParameters::new(10.0, 5.0, 8.0);
        let changes = StandardsChanges {
            markup: Some(15.0),
            ..StandardsChanges::default()
        };
        assert_eq!(changes.apply(current), StandardParameters::new(15.0, 5.0, 8.0));
        assert!(StandardsChanges::default().is_empty());
        assert!(!changes.is_empty());
    }

    #[test]
    fn rejects_malformed_project_id() {
        assert!(parse_project_id("not-a-uuid").is_err());
        let id = ProjectId::new();
        assert_eq!(parse_project_id(&format!(" {id} ")).unwrap(), id);
    }
}

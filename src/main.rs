use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use path_clean::PathClean;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use glsync::catalog;
use glsync::credentials::{self, CredentialResolver, CredentialSource};
use glsync::plan::SyncStrategy;
use glsync::sync::ActionResult;
use glsync::{
    Config, GitClient, GitLabClient, RepositoryCatalog, SyncExecutor, SyncPlan, SyncPlanner,
    SyncReport, VersionControlClient,
};

#[derive(Parser)]
#[command(name = "glsync")]
#[command(about = "Mirror the repositories of a GitLab instance into a local directory tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the GitLab URL and access token
    Config {
        /// GitLab instance URL, e.g. https://gitlab.com
        #[arg(long)]
        url: Option<String>,

        /// Personal access token
        #[arg(long)]
        token: Option<String>,
    },

    /// Verify that the configured token is accepted
    Check,

    /// List every repository visible to the token
    ListRepos,

    /// Clone repositories into a local directory
    Repo {
        #[command(subcommand)]
        repo_command: RepoCommands,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Clone repositories that are not present yet
    Clone(RepoArgs),

    /// Replace every existing directory with a fresh clone
    CloneOverwrite(RepoArgs),

    /// Fast-forward existing clones and clone missing ones
    CloneUpdate(RepoArgs),
}

#[derive(Args)]
struct RepoArgs {
    /// Local root directory
    #[arg(short, long)]
    dir: String,

    /// Maximum parallel repository operations (defaults to sync.max_parallel)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Show what would be done without touching the disk
    #[arg(long)]
    dry_run: bool,
}

impl RepoCommands {
    fn split(self) -> (SyncStrategy, RepoArgs) {
        match self {
            RepoCommands::Clone(args) => (SyncStrategy::CreateOnly, args),
            RepoCommands::CloneOverwrite(args) => (SyncStrategy::ForceOverwrite, args),
            RepoCommands::CloneUpdate(args) => (SyncStrategy::UpdateExisting, args),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    let config = Config::load_or_default_from(&config_path)?;

    init_logging(cli.verbose, &config.logging.level);
    info!("Starting glsync v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config { url, token } => cmd_config(url, token, config, &config_path),
        Commands::Check => cmd_check(&config).await,
        Commands::ListRepos => cmd_list_repos(&config).await,
        Commands::Repo { repo_command } => cmd_repo(repo_command, &config).await,
    }
}

/// Initialize logging on stderr; RUST_LOG wins, then --verbose, then the config level
fn init_logging(verbose: bool, configured_level: &str) {
    let fallback = if verbose { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Resolve the credential from the config store and environment
fn resolve_credential(config: &Config) -> Result<glsync::Credential> {
    let credential = CredentialResolver::layered(None, &config.gitlab).resolve()?;
    Ok(credential)
}

/// Ask for a value on stdin; an empty answer keeps whatever is already known
fn prompt(label: &str, current: Option<&str>) -> Result<Option<String>> {
    match current {
        Some(value) => print!("{} [{}]: ", label, value),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read from stdin")?;

    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

fn cmd_config(
    url: Option<String>,
    token: Option<String>,
    mut config: Config,
    config_path: &Path,
) -> Result<()> {
    let url = match url {
        Some(url) => Some(url),
        None => prompt("GitLab URL", config.gitlab.url.as_deref())?,
    };
    let token = match token {
        Some(token) => Some(token),
        None => {
            let hint = config.gitlab.token.as_ref().map(|_| "keep existing");
            prompt("GitLab access token", hint)?
        }
    };

    let explicit = CredentialSource::explicit(url, token);
    let credential = CredentialResolver::layered(Some(explicit), &config.gitlab).resolve()?;

    config.store_credential(&credential);
    config
        .save(config_path)
        .with_context(|| format!("Failed to save configuration to {:?}", config_path))?;

    println!("✅ Configuration saved");
    println!("   Config: {}", config_path.display());
    println!("   GitLab URL: {}", credential.base_url());
    println!("   Next: run 'glsync check' to verify the token");

    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let credential = resolve_credential(config)?;
    let directory = GitLabClient::new(&config.gitlab)?;

    let identity = credentials::verify(&directory, &credential)
        .await
        .with_context(|| format!("Token check against {} failed", credential.base_url()))?;

    println!("✅ Authentication successful");
    println!("   GitLab URL: {}", credential.base_url());
    match &identity.name {
        Some(name) => println!("   User: {} ({})", identity.username, name),
        None => println!("   User: {}", identity.username),
    }

    Ok(())
}

async fn list_catalog(config: &Config, credential: &glsync::Credential) -> Result<RepositoryCatalog> {
    let directory = GitLabClient::new(&config.gitlab)?;
    let catalog = catalog::list(&directory, credential)
        .await
        .with_context(|| format!("Failed to list repositories from {}", credential.base_url()))?;
    Ok(catalog)
}

async fn cmd_list_repos(config: &Config) -> Result<()> {
    let credential = resolve_credential(config)?;
    let catalog = list_catalog(config, &credential).await?;

    print!("{}", render_table(&catalog));
    println!("\n{} repositories", catalog.len());

    Ok(())
}

fn render_table(catalog: &RepositoryCatalog) -> String {
    let headers = ["ID", "Project Name", "Repo Name", "Repo Path"];

    let rows: Vec<Vec<String>> = catalog
        .iter()
        .map(|record| {
            vec![
                record.id.to_string(),
                record.namespace().to_string(),
                record.repo_name().to_string(),
                record.relative_path().to_string(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render_row = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut table = render_row(&header);
    table.push_str(&render_row(&rule));
    for row in &rows {
        table.push_str(&render_row(row));
    }
    table
}

/// Expand `~` and environment variables, then make the root absolute and clean
fn expand_root(dir: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(dir)
        .with_context(|| format!("Failed to expand directory: {}", dir))?;
    let path = PathBuf::from(expanded.as_ref());
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("Failed to determine current directory")?
            .join(path)
    };
    Ok(absolute.clean())
}

async fn cmd_repo(repo_command: RepoCommands, config: &Config) -> Result<()> {
    let (strategy, args) = repo_command.split();
    let root = expand_root(&args.dir)?;
    let credential = resolve_credential(config)?;

    println!("🔍 Listing repositories from {}...", credential.base_url());
    let catalog = list_catalog(config, &credential).await?;
    println!("   Found {} repositories", catalog.len());

    let vcs: Arc<dyn VersionControlClient> = Arc::new(
        GitClient::new(Duration::from_secs(config.sync.timeout)).with_credential(credential),
    );
    let planner = SyncPlanner::new(vcs.clone(), config.gitlab.clone_protocol);
    let plan = planner
        .plan(&catalog, &root, strategy)
        .await
        .context("Failed to plan synchronization")?;

    if args.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    let jobs = args.jobs.unwrap_or(config.sync.max_parallel);
    let executor = SyncExecutor::new(vcs, jobs);

    let interrupted = executor.interrupt_flag();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight repositories");
            interrupted.store(true, Ordering::SeqCst);
        }
    });

    println!("\n🔄 Syncing into {} ({})", root.display(), strategy);
    let report = executor.execute(plan).await.context("Synchronization aborted")?;
    signal_task.abort();

    print_report(&report);

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_plan(plan: &SyncPlan) {
    println!("\n🔍 Dry run ({}) - no changes made", plan.strategy);
    for action in &plan.actions {
        match action.skip_reason() {
            Some(reason) => println!(
                "   ⏭️  skip       {} ({})",
                action.record().path_with_namespace,
                reason
            ),
            None => println!(
                "   {:<10} {} → {}",
                action.label(),
                action.record().path_with_namespace,
                action.target().display()
            ),
        }
    }
}

fn print_report(report: &SyncReport) {
    for outcome in &report.outcomes {
        let path = &outcome.record().path_with_namespace;
        match (&outcome.result, outcome.skip_reason()) {
            (ActionResult::Success, Some(reason)) => println!("   ⏭️  {}: skipped ({})", path, reason),
            (ActionResult::Success, None) => {
                println!("   ✅ {}: {}", path, outcome.action.label())
            }
            (ActionResult::Failure { kind, message }, _) => {
                println!("   ❌ {}: {} ({})", path, kind, message)
            }
        }
    }

    println!("\n🎉 Synchronization complete");
    println!("   📊 Total repositories: {}", report.total());
    println!("   ✅ Successful: {}", report.succeeded());
    println!("   ⏭️  Skipped: {}", report.skipped());
    println!("   ❌ Failed: {}", report.failed());
    println!("   ⏱️  Duration: {:.2}s", report.duration.as_secs_f64());
    println!(
        "   🕒 Started: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}
